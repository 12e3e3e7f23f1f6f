//! Actuator power monitoring
//!
//! Tracks commanded power levels per actuator (laser, fans, heater
//! drive). High-churn ids such as the laser change on nearly every
//! queued move, so the notify interval is short and the average window
//! matches the low-frequency period.

use std::sync::Arc;
use std::time::Duration;

use printhost_core::{Clock, StateDispatcher, Timestamp};

use crate::tracker::{StateSnapshot, StateTracker, TrackerConfig};

/// Snapshot of all tracked power levels
pub type PowerState = Arc<StateSnapshot>;

/// Default aggregation parameters for power tracking
pub fn default_config() -> TrackerConfig {
    TrackerConfig {
        average_window: Duration::from_secs(5),
        min_notify_interval: Duration::from_millis(200),
        low_freq_period: Duration::from_secs(5),
        target_tolerance: 0.0,
    }
}

/// Power level aggregator over one controller
pub struct PowerMonitor {
    tracker: Arc<StateTracker>,
}

impl PowerMonitor {
    /// Create a monitor with the default power configuration
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_config(clock, default_config())
    }

    /// Create a monitor with explicit parameters
    pub fn with_config(clock: Arc<dyn Clock>, config: TrackerConfig) -> Self {
        Self {
            tracker: Arc::new(StateTracker::new(clock, config)),
        }
    }

    /// Record a reported power level
    pub fn update(&self, id: &str, level: f64, timestamp: Timestamp) {
        self.tracker.update_at(id, level, timestamp);
    }

    /// Whether an actuator is, or very recently was, powered
    ///
    /// Returns `(true, level)` for a live reading and `(false, last
    /// non-zero level)` when the actuator switched off within `window`.
    /// Callers that gate motion on "laser still hot" use the stale
    /// reading rather than trusting an instantaneous zero.
    pub fn was_recently_active(&self, id: &str, now: Timestamp, window: Duration) -> (bool, f64) {
        self.tracker.try_get_recent(id, now, window)
    }

    /// Last published snapshot
    pub fn current_state(&self) -> PowerState {
        self.tracker.current_state()
    }

    /// High-frequency (on-change) stream
    pub fn on_change(&self) -> &StateDispatcher<PowerState> {
        self.tracker.high_frequency()
    }

    /// Low-frequency (periodic) stream
    pub fn periodic(&self) -> &StateDispatcher<PowerState> {
        self.tracker.low_frequency()
    }

    /// The underlying tracker, for wiring into a `TrackerService`
    pub fn tracker(&self) -> Arc<StateTracker> {
        self.tracker.clone()
    }
}
