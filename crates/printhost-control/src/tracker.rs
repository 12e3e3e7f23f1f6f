//! Aggregated state tracking
//!
//! One generic component behind the power, temperature and input
//! monitors: a lock-protected map from logical id to its last-known
//! value, a time-windowed moving average, a per-id debounce for the
//! high-frequency stream, and immutable id-sorted snapshots for the
//! low-frequency stream. Entries are created lazily on first
//! observation and live for the process lifetime of the tracker.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use printhost_core::{Clock, StateDispatcher, Timestamp};

/// Aggregation parameters
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Sliding window over which the moving average is computed.
    pub average_window: Duration,
    /// Minimum period between high-frequency notifications per id.
    pub min_notify_interval: Duration,
    /// Period of the low-frequency snapshot publication.
    pub low_freq_period: Duration,
    /// Tolerance within which a settable value counts as at target.
    pub target_tolerance: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            average_window: Duration::from_secs(5),
            min_notify_interval: Duration::from_millis(500),
            low_freq_period: Duration::from_secs(5),
            target_tolerance: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Sample {
    value: f64,
    timestamp: Timestamp,
}

/// Mutable per-id record; all access happens under the tracker lock
#[derive(Debug)]
struct TrackedEntry {
    value: f64,
    timestamp: Timestamp,
    prev_nonzero: f64,
    prev_zeroing: Option<Timestamp>,
    target: Option<f64>,
    settable: bool,
    target_reached: bool,
    window: VecDeque<Sample>,
    average: f64,
    last_notified: Option<Timestamp>,
}

impl TrackedEntry {
    fn new() -> Self {
        Self {
            value: 0.0,
            timestamp: Timestamp::ZERO,
            prev_nonzero: 0.0,
            prev_zeroing: None,
            target: None,
            settable: false,
            target_reached: false,
            window: VecDeque::new(),
            average: 0.0,
            last_notified: None,
        }
    }

    /// Drop samples older than the window and recompute the mean
    fn refresh_average(&mut self, now: Timestamp, window: Duration) {
        while self
            .window
            .front()
            .is_some_and(|s| now.since(s.timestamp) > window)
        {
            self.window.pop_front();
        }
        self.average = if self.window.is_empty() {
            self.value
        } else {
            self.window.iter().map(|s| s.value).sum::<f64>() / self.window.len() as f64
        };
    }

    fn refresh_target_reached(&mut self, tolerance: f64) {
        self.target_reached = match self.target {
            Some(target) => (self.value - target).abs() <= tolerance,
            None => false,
        };
    }
}

/// Published projection of one entry
#[derive(Debug, Clone, PartialEq)]
pub struct EntryState {
    /// Logical id of the sensor or actuator.
    pub id: String,
    /// Last observed value.
    pub value: f64,
    /// Device-clock time of the last observation.
    pub timestamp: Timestamp,
    /// Moving average over the configured window.
    pub average: f64,
    /// Commanded target, if the entry is settable.
    pub target: Option<f64>,
    /// Whether this id accepts targets.
    pub settable: bool,
    /// Whether the value is within tolerance of the target.
    pub target_reached: bool,
}

/// Immutable point-in-time view of every tracked entry, sorted by id
#[derive(Debug, Clone, PartialEq)]
pub struct StateSnapshot {
    /// Entry projections, ordered by id.
    pub entries: Vec<EntryState>,
    /// Device-clock time the snapshot was taken.
    pub taken_at: Timestamp,
}

impl StateSnapshot {
    fn empty() -> Self {
        Self {
            entries: Vec::new(),
            taken_at: Timestamp::ZERO,
        }
    }

    /// Find an entry by id
    pub fn get(&self, id: &str) -> Option<&EntryState> {
        self.entries
            .binary_search_by(|e| e.id.as_str().cmp(id))
            .ok()
            .map(|i| &self.entries[i])
    }
}

/// Debounced, averaged, dual-frequency state aggregator
pub struct StateTracker {
    config: TrackerConfig,
    clock: Arc<dyn Clock>,
    // BTreeMap keeps snapshots id-sorted by construction.
    entries: Mutex<BTreeMap<String, TrackedEntry>>,
    current: RwLock<Arc<StateSnapshot>>,
    low_freq: StateDispatcher<Arc<StateSnapshot>>,
    high_freq: StateDispatcher<Arc<StateSnapshot>>,
}

impl StateTracker {
    /// Create a tracker on the given device clock
    pub fn new(clock: Arc<dyn Clock>, config: TrackerConfig) -> Self {
        Self {
            config,
            clock,
            entries: Mutex::new(BTreeMap::new()),
            current: RwLock::new(Arc::new(StateSnapshot::empty())),
            low_freq: StateDispatcher::new(64),
            high_freq: StateDispatcher::new(256),
        }
    }

    /// The aggregation parameters
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Low-frequency (periodic) publication stream
    pub fn low_frequency(&self) -> &StateDispatcher<Arc<StateSnapshot>> {
        &self.low_freq
    }

    /// High-frequency (on-change, debounced) publication stream
    pub fn high_frequency(&self) -> &StateDispatcher<Arc<StateSnapshot>> {
        &self.high_freq
    }

    /// Last published low-frequency snapshot (lock-free once obtained)
    pub fn current_state(&self) -> Arc<StateSnapshot> {
        self.current.read().clone()
    }

    /// Record an observation for `id` at the current clock time
    pub fn update(&self, id: &str, value: f64) {
        self.update_at(id, value, self.clock.now());
    }

    /// Record an observation for `id` at an explicit time
    ///
    /// Recomputes the entry tuple under the state lock, maintains the
    /// moving-average window, and publishes on the high-frequency
    /// stream if the tuple changed and the id's notify period has
    /// elapsed. The low-frequency stream is untouched; the periodic
    /// loop owns it.
    pub fn update_at(&self, id: &str, value: f64, timestamp: Timestamp) {
        let notify = {
            let mut entries = self.entries.lock();
            let entry = entries
                .entry(id.to_string())
                .or_insert_with(TrackedEntry::new);

            let changed = entry.value != value || entry.timestamp != timestamp;

            if value == 0.0 && entry.value != 0.0 {
                entry.prev_nonzero = entry.value;
                entry.prev_zeroing = Some(timestamp);
            }
            entry.value = value;
            entry.timestamp = timestamp;
            entry.window.push_back(Sample { value, timestamp });
            entry.refresh_average(timestamp, self.config.average_window);
            entry.refresh_target_reached(self.config.target_tolerance);

            // Debounce: suppress the high-frequency publication when
            // the notify period has not elapsed for this id, even
            // though the value did change.
            if changed {
                let due = entry.last_notified.map_or(true, |last| {
                    timestamp.since(last) >= self.config.min_notify_interval
                });
                if due {
                    entry.last_notified = Some(timestamp);
                }
                due
            } else {
                false
            }
        };

        if notify {
            let snapshot = self.snapshot();
            self.high_freq.publish(snapshot);
        }
    }

    /// Set or clear the target for a settable id
    pub fn set_target(&self, id: &str, target: Option<f64>) {
        let mut entries = self.entries.lock();
        let entry = entries
            .entry(id.to_string())
            .or_insert_with(TrackedEntry::new);
        entry.target = target;
        entry.settable = true;
        entry.refresh_target_reached(self.config.target_tolerance);
    }

    /// Query whether an id's value is current or only recently active
    ///
    /// Returns `(true, value)` when the value is live and non-zero,
    /// `(false, previous non-zero value)` when it zeroed within
    /// `duration` of `now`, and `(true, 0.0)` otherwise.
    pub fn try_get_recent(&self, id: &str, now: Timestamp, duration: Duration) -> (bool, f64) {
        let entries = self.entries.lock();
        let Some(entry) = entries.get(id) else {
            return (true, 0.0);
        };
        if entry.value != 0.0 {
            return (true, entry.value);
        }
        if let Some(zeroed) = entry.prev_zeroing {
            if now.since(zeroed) <= duration {
                return (false, entry.prev_nonzero);
            }
        }
        (true, 0.0)
    }

    /// Build an immutable snapshot of every entry
    ///
    /// All entries reflect the same lock-held instant. Average windows
    /// are aged against the snapshot time, so an id that stops
    /// reporting decays to its last value.
    pub fn snapshot(&self) -> Arc<StateSnapshot> {
        let taken_at = self.clock.now();
        let mut entries = self.entries.lock();
        let projected = entries
            .iter_mut()
            .map(|(id, entry)| {
                entry.refresh_average(taken_at, self.config.average_window);
                EntryState {
                    id: id.clone(),
                    value: entry.value,
                    timestamp: entry.timestamp,
                    average: entry.average,
                    target: entry.target,
                    settable: entry.settable,
                    target_reached: entry.target_reached,
                }
            })
            .collect();
        Arc::new(StateSnapshot {
            entries: projected,
            taken_at,
        })
    }

    /// Take a snapshot, store it as current, publish it low-frequency
    pub fn publish_low_frequency(&self) {
        let snapshot = self.snapshot();
        *self.current.write() = snapshot.clone();
        self.low_freq.publish(snapshot);
    }
}
