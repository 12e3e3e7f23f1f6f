//! # printhost Control
//!
//! Host-side command scheduling and aggregated state tracking. The
//! `CommandScheduler` assigns device-clock execution slots to queued
//! actuator writes; the `StateTracker` family turns high-rate status
//! reports into debounced change notifications and periodic snapshots
//! consumed by the rest of the host.

pub mod input;
pub mod power;
pub mod schedule;
pub mod service;
pub mod temperature;
pub mod tracker;

pub use input::{InputMonitor, InputState};
pub use power::{PowerMonitor, PowerState};
pub use schedule::{CommandScheduler, SchedulerConfig};
pub use service::{RefreshSource, TrackerService};
pub use temperature::{TemperatureMonitor, TemperatureState};
pub use tracker::{EntryState, StateSnapshot, StateTracker, TrackerConfig};
