//! # printhost Settings
//!
//! TOML host configuration: which MCUs exist, how each one is reached,
//! and the scheduling and aggregation parameters shared by the control
//! layer.

pub mod config;

pub use config::{DeviceEntry, SchedulerSettings, Settings, TrackerSettings, Transport};
