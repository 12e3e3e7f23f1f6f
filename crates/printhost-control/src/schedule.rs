//! Command scheduling discipline
//!
//! Outgoing actuator writes are ordered by a device-clock timestamp.
//! The master queue is one ledger of the next-available slot per
//! actuator, protected by a single lock shared by all actuators on a
//! controller. The lock is held only for the O(1) slot read-modify-
//! write and the enqueue of the tagged write, never across device I/O.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use printhost_core::{Clock, Result, Timestamp};

/// Scheduling parameters
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Minimum spacing between consecutive slots of one actuator.
    pub min_spacing: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            min_spacing: Duration::from_millis(100),
        }
    }
}

/// Timestamp-ordered command scheduler over one master queue
pub struct CommandScheduler {
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
    // The master queue: next-available slot per actuator.
    slots: Mutex<HashMap<String, Timestamp>>,
}

impl CommandScheduler {
    /// Create a scheduler on the given device clock
    pub fn new(clock: Arc<dyn Clock>, config: SchedulerConfig) -> Self {
        Self {
            clock,
            config,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Issue a queued write for `actuator`
    ///
    /// Under the master-queue lock, computes the next slot as
    /// `max(now, last_slot) + min_spacing`, invokes `issue` with it
    /// (the enqueue of the tagged write; it must not perform device
    /// I/O), and records the slot back before the lock is released.
    /// The slot is only recorded if `issue` succeeds, so a rejected
    /// command does not consume schedule time.
    ///
    /// For a given actuator the assigned slots are strictly
    /// non-decreasing across concurrent callers, with at least
    /// `min_spacing` between consecutive slots.
    pub fn queue_command<T, F>(&self, actuator: &str, issue: F) -> Result<T>
    where
        F: FnOnce(Timestamp) -> Result<T>,
    {
        let mut slots = self.slots.lock();
        let now = self.clock.now();
        let last = slots.get(actuator).copied().unwrap_or(Timestamp::ZERO);
        let slot = last.max(now) + self.config.min_spacing;
        let value = issue(slot)?;
        slots.insert(actuator.to_string(), slot);
        Ok(value)
    }

    /// Issue an immediate write, bypassing the queue
    ///
    /// Applied at maximum priority with no ordering guarantee relative
    /// to pending queued writes.
    pub fn send_immediate<T, F>(&self, issue: F) -> Result<T>
    where
        F: FnOnce(Timestamp) -> Result<T>,
    {
        issue(self.clock.now())
    }

    /// Last slot recorded for an actuator
    pub fn last_slot(&self, actuator: &str) -> Option<Timestamp> {
        self.slots.lock().get(actuator).copied()
    }

    /// Forget all recorded slots (e.g. after a firmware restart)
    pub fn reset(&self) {
        self.slots.lock().clear();
    }

    /// The configured minimum spacing
    pub fn min_spacing(&self) -> Duration {
        self.config.min_spacing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use printhost_core::ManualClock;

    fn scheduler(clock: Arc<ManualClock>, spacing_ms: u64) -> CommandScheduler {
        CommandScheduler::new(
            clock,
            SchedulerConfig {
                min_spacing: Duration::from_millis(spacing_ms),
            },
        )
    }

    #[test]
    fn test_first_slot_after_now() {
        let clock = ManualClock::new();
        clock.set(Timestamp::from_secs(10.0));
        let sched = scheduler(clock, 100);
        let slot = sched.queue_command("laser", Ok).unwrap();
        assert!((slot.as_secs() - 10.1).abs() < 1e-9);
    }

    #[test]
    fn test_back_to_back_slots_are_spaced() {
        let clock = ManualClock::new();
        let sched = scheduler(clock, 100);
        let a = sched.queue_command("laser", Ok).unwrap();
        let b = sched.queue_command("laser", Ok).unwrap();
        let c = sched.queue_command("laser", Ok).unwrap();
        assert!((b - a) >= Duration::from_millis(100));
        assert!((c - b) >= Duration::from_millis(100));
    }

    #[test]
    fn test_actuators_are_independent() {
        let clock = ManualClock::new();
        let sched = scheduler(clock, 100);
        let a = sched.queue_command("laser", Ok).unwrap();
        let b = sched.queue_command("fan", Ok).unwrap();
        // Same wall time, same first slot: no cross-actuator ordering.
        assert_eq!(a, b);
    }

    #[test]
    fn test_failed_issue_does_not_consume_slot() {
        let clock = ManualClock::new();
        let sched = scheduler(clock, 100);
        let err: Result<()> = sched.queue_command("laser", |_| {
            Err(printhost_core::Error::other("queue full"))
        });
        assert!(err.is_err());
        assert!(sched.last_slot("laser").is_none());
    }

    #[test]
    fn test_slot_catches_up_to_clock() {
        let clock = ManualClock::new();
        let sched = scheduler(clock.clone(), 100);
        let a = sched.queue_command("laser", Ok).unwrap();
        // Long idle period: the next slot follows the clock, not the
        // stale last slot.
        clock.set(Timestamp::from_secs(50.0));
        let b = sched.queue_command("laser", Ok).unwrap();
        assert!(b > a);
        assert!((b.as_secs() - 50.1).abs() < 1e-9);
    }

    #[test]
    fn test_reset_forgets_slots() {
        let clock = ManualClock::new();
        let sched = scheduler(clock, 100);
        sched.queue_command("laser", Ok).unwrap();
        assert!(sched.last_slot("laser").is_some());
        sched.reset();
        assert!(sched.last_slot("laser").is_none());
    }

    #[test]
    fn test_concurrent_slots_monotonic_and_spaced() {
        // Property 3: N concurrent queued writes to one actuator get
        // non-decreasing slots separated by at least min_spacing.
        let clock = ManualClock::new();
        let sched = Arc::new(scheduler(clock, 10));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let sched = sched.clone();
            handles.push(std::thread::spawn(move || {
                let mut slots = Vec::new();
                for _ in 0..50 {
                    slots.push(sched.queue_command("laser", Ok).unwrap());
                }
                slots
            }));
        }
        let mut all: Vec<Timestamp> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_by(|a, b| a.partial_cmp(b).unwrap());
        for pair in all.windows(2) {
            let gap = pair[1].as_secs() - pair[0].as_secs();
            // Small tolerance for f64 accumulation across 400 slots.
            assert!(
                gap >= 0.010 - 1e-9,
                "slots {} and {} too close",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_immediate_bypasses_queue() {
        let clock = ManualClock::new();
        clock.set(Timestamp::from_secs(5.0));
        let sched = scheduler(clock, 100);
        sched.queue_command("laser", Ok).unwrap();
        let ts = sched.send_immediate(Ok).unwrap();
        assert_eq!(ts, Timestamp::from_secs(5.0));
        // The immediate path leaves the master queue untouched.
        let slot = sched.last_slot("laser").unwrap();
        assert!((slot.as_secs() - 5.1).abs() < 1e-9);
    }
}
