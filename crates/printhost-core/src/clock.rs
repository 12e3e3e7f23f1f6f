//! Shared device clock and timestamps
//!
//! All command scheduling and state aggregation is expressed against a
//! single monotonic clock measured in seconds. The `Clock` trait is the
//! seam that lets tests drive time by hand.

use std::ops::{Add, Sub};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// A point on the shared monotonic device clock, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct Timestamp(f64);

impl Timestamp {
    /// The clock origin.
    pub const ZERO: Timestamp = Timestamp(0.0);

    /// Create a timestamp from seconds since the clock origin
    pub fn from_secs(secs: f64) -> Self {
        Timestamp(secs)
    }

    /// Seconds since the clock origin
    pub fn as_secs(&self) -> f64 {
        self.0
    }

    /// The later of two timestamps
    pub fn max(self, other: Timestamp) -> Timestamp {
        if other.0 > self.0 {
            other
        } else {
            self
        }
    }

    /// Duration elapsed since `earlier`, zero if `earlier` is in the future
    pub fn since(&self, earlier: Timestamp) -> Duration {
        if self.0 <= earlier.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(self.0 - earlier.0)
        }
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, rhs: Duration) -> Timestamp {
        Timestamp(self.0 + rhs.as_secs_f64())
    }
}

impl Sub<Timestamp> for Timestamp {
    type Output = Duration;

    fn sub(self, rhs: Timestamp) -> Duration {
        self.since(rhs)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.6}s", self.0)
    }
}

/// Source of the shared monotonic clock
pub trait Clock: Send + Sync {
    /// Current time on the device clock
    fn now(&self) -> Timestamp;
}

/// Wall clock anchored at construction time
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Create a clock whose origin is now
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.origin.elapsed().as_secs_f64())
    }
}

/// Hand-driven clock for tests
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<f64>,
}

impl ManualClock {
    /// Create a manual clock starting at the origin
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Advance the clock by `delta`
    pub fn advance(&self, delta: Duration) {
        *self.now.lock() += delta.as_secs_f64();
    }

    /// Set the clock to an absolute time
    pub fn set(&self, to: Timestamp) {
        *self.now.lock() = to.as_secs();
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp(*self.now.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_ordering() {
        let a = Timestamp::from_secs(1.0);
        let b = Timestamp::from_secs(2.5);
        assert!(a < b);
        assert_eq!(a.max(b), b);
        assert_eq!(b.max(a), b);
    }

    #[test]
    fn test_since_saturates() {
        let a = Timestamp::from_secs(1.0);
        let b = Timestamp::from_secs(2.0);
        assert_eq!(b.since(a), Duration::from_secs(1));
        assert_eq!(a.since(b), Duration::ZERO);
    }

    #[test]
    fn test_add_duration() {
        let a = Timestamp::from_secs(1.0) + Duration::from_millis(500);
        assert!((a.as_secs() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new();
        assert_eq!(clock.now(), Timestamp::ZERO);
        clock.advance(Duration::from_secs(3));
        assert_eq!(clock.now(), Timestamp::from_secs(3.0));
        clock.set(Timestamp::from_secs(1.0));
        assert_eq!(clock.now(), Timestamp::from_secs(1.0));
    }

    #[test]
    fn test_system_clock_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
