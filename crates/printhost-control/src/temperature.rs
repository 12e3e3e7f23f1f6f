//! Heater temperature monitoring
//!
//! Temperatures move slowly, so the window is long and the notify
//! interval generous. Heaters are settable: a commanded target is
//! tracked against the measured value within a reach tolerance.

use std::sync::Arc;
use std::time::Duration;

use printhost_core::{Clock, StateDispatcher, Timestamp};

use crate::tracker::{StateSnapshot, StateTracker, TrackerConfig};

/// Snapshot of all tracked temperatures
pub type TemperatureState = Arc<StateSnapshot>;

/// Default aggregation parameters for temperature tracking
pub fn default_config() -> TrackerConfig {
    TrackerConfig {
        average_window: Duration::from_secs(10),
        min_notify_interval: Duration::from_secs(1),
        low_freq_period: Duration::from_secs(1),
        target_tolerance: 2.0,
    }
}

/// Temperature aggregator over one controller
pub struct TemperatureMonitor {
    tracker: Arc<StateTracker>,
}

impl TemperatureMonitor {
    /// Create a monitor with the default temperature configuration
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_config(clock, default_config())
    }

    /// Create a monitor with explicit parameters
    pub fn with_config(clock: Arc<dyn Clock>, config: TrackerConfig) -> Self {
        Self {
            tracker: Arc::new(StateTracker::new(clock, config)),
        }
    }

    /// Record a measured temperature
    pub fn update(&self, id: &str, celsius: f64, timestamp: Timestamp) {
        self.tracker.update_at(id, celsius, timestamp);
    }

    /// Set or clear the commanded target for a heater
    pub fn set_target(&self, id: &str, celsius: Option<f64>) {
        self.tracker.set_target(id, celsius);
    }

    /// Whether a heater has reached its commanded target
    pub fn target_reached(&self, id: &str) -> bool {
        self.tracker
            .snapshot()
            .get(id)
            .map(|e| e.target_reached)
            .unwrap_or(false)
    }

    /// Last published snapshot
    pub fn current_state(&self) -> TemperatureState {
        self.tracker.current_state()
    }

    /// High-frequency (on-change) stream
    pub fn on_change(&self) -> &StateDispatcher<TemperatureState> {
        self.tracker.high_frequency()
    }

    /// Low-frequency (periodic) stream
    pub fn periodic(&self) -> &StateDispatcher<TemperatureState> {
        self.tracker.low_frequency()
    }

    /// The underlying tracker, for wiring into a `TrackerService`
    pub fn tracker(&self) -> Arc<StateTracker> {
        self.tracker.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use printhost_core::ManualClock;

    #[test]
    fn test_target_reached_within_tolerance() {
        let clock = ManualClock::new();
        let monitor = TemperatureMonitor::new(clock.clone());
        monitor.set_target("hotend", Some(210.0));
        monitor.update("hotend", 190.0, clock.now());
        assert!(!monitor.target_reached("hotend"));
        clock.advance(Duration::from_secs(30));
        monitor.update("hotend", 208.5, clock.now());
        assert!(monitor.target_reached("hotend"));
    }

    #[test]
    fn test_cleared_target_is_never_reached() {
        let clock = ManualClock::new();
        let monitor = TemperatureMonitor::new(clock.clone());
        monitor.set_target("bed", Some(60.0));
        monitor.update("bed", 60.0, clock.now());
        assert!(monitor.target_reached("bed"));
        monitor.set_target("bed", None);
        assert!(!monitor.target_reached("bed"));
    }

    #[test]
    fn test_unknown_heater_not_reached() {
        let clock = ManualClock::new();
        let monitor = TemperatureMonitor::new(clock);
        assert!(!monitor.target_reached("chamber"));
    }
}
