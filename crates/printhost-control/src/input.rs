//! Digital input monitoring
//!
//! Endstops, filament sensors and probe triggers. Edges matter, so the
//! notify interval is the shortest of the three monitors and the
//! average window is tight. Inputs are never settable.

use std::sync::Arc;
use std::time::Duration;

use printhost_core::{Clock, StateDispatcher, Timestamp};

use crate::tracker::{StateSnapshot, StateTracker, TrackerConfig};

/// Snapshot of all tracked inputs
pub type InputState = Arc<StateSnapshot>;

/// Default aggregation parameters for input tracking
pub fn default_config() -> TrackerConfig {
    TrackerConfig {
        average_window: Duration::from_secs(1),
        min_notify_interval: Duration::from_millis(50),
        low_freq_period: Duration::from_secs(5),
        target_tolerance: 0.0,
    }
}

/// Input level aggregator over one controller
pub struct InputMonitor {
    tracker: Arc<StateTracker>,
}

impl InputMonitor {
    /// Create a monitor with the default input configuration
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_config(clock, default_config())
    }

    /// Create a monitor with explicit parameters
    pub fn with_config(clock: Arc<dyn Clock>, config: TrackerConfig) -> Self {
        Self {
            tracker: Arc::new(StateTracker::new(clock, config)),
        }
    }

    /// Record a sampled input level (0.0 released, 1.0 triggered)
    pub fn update(&self, id: &str, level: f64, timestamp: Timestamp) {
        self.tracker.update_at(id, level, timestamp);
    }

    /// Whether an input currently reads as triggered
    pub fn is_triggered(&self, id: &str) -> bool {
        self.tracker
            .snapshot()
            .get(id)
            .map(|e| e.value != 0.0)
            .unwrap_or(false)
    }

    /// Last published snapshot
    pub fn current_state(&self) -> InputState {
        self.tracker.current_state()
    }

    /// High-frequency (on-change) stream
    pub fn on_change(&self) -> &StateDispatcher<InputState> {
        self.tracker.high_frequency()
    }

    /// Low-frequency (periodic) stream
    pub fn periodic(&self) -> &StateDispatcher<InputState> {
        self.tracker.low_frequency()
    }

    /// The underlying tracker, for wiring into a `TrackerService`
    pub fn tracker(&self) -> Arc<StateTracker> {
        self.tracker.clone()
    }
}
