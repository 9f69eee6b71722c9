//! Time sources for admission decisions.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Create a timestamp from milliseconds since the Unix epoch.
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Milliseconds since the Unix epoch.
    pub const fn as_millis(&self) -> u64 {
        self.0
    }

    /// Milliseconds elapsed since `earlier`, or zero if `earlier` is later.
    pub fn saturating_sub(&self, earlier: Timestamp) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// A source of non-decreasing timestamps.
pub trait Clock: Send + Sync {
    /// Current time. Never smaller than a value previously returned.
    fn now(&self) -> Timestamp;
}

/// Wall clock backed by `chrono::Utc`.
///
/// A wall clock can step backwards (NTP adjustments); readings are clamped
/// to the largest value handed out so far.
#[derive(Debug, Default)]
pub struct SystemClock {
    last: AtomicU64,
}

impl SystemClock {
    /// Create a new system clock.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let wall = chrono::Utc::now().timestamp_millis().max(0) as u64;
        let previous = self.last.fetch_max(wall, Ordering::AcqRel);
        Timestamp(previous.max(wall))
    }
}

/// Deterministic clock driven by hand, for tests and simulations.
#[derive(Debug, Default)]
pub struct ManualClock {
    current: AtomicU64,
}

impl ManualClock {
    /// Create a manual clock starting at `start`.
    pub fn new(start: Timestamp) -> Self {
        Self {
            current: AtomicU64::new(start.as_millis()),
        }
    }

    /// Move the clock to `ts`. Attempts to move backwards are ignored.
    pub fn set(&self, ts: Timestamp) {
        self.current.fetch_max(ts.as_millis(), Ordering::AcqRel);
    }

    /// Move the clock forward by `millis`.
    pub fn advance(&self, millis: u64) {
        self.current.fetch_add(millis, Ordering::AcqRel);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp(self.current.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_saturating_sub() {
        let a = Timestamp::from_millis(100);
        let b = Timestamp::from_millis(250);
        assert_eq!(b.saturating_sub(a), 150);
        assert_eq!(a.saturating_sub(b), 0);
    }

    #[test]
    fn test_system_clock_is_non_decreasing() {
        let clock = SystemClock::new();
        let mut previous = clock.now();
        for _ in 0..1000 {
            let next = clock.now();
            assert!(next >= previous);
            previous = next;
        }
    }

    #[test]
    fn test_system_clock_clamps_backwards_steps() {
        let clock = SystemClock::new();
        // Pretend an earlier reading came from far in the future.
        clock.last.store(u64::MAX / 2, Ordering::SeqCst);
        assert_eq!(clock.now().as_millis(), u64::MAX / 2);
    }

    #[test]
    fn test_manual_clock_set_and_advance() {
        let clock = ManualClock::new(Timestamp::from_millis(10));
        assert_eq!(clock.now(), Timestamp::from_millis(10));

        clock.advance(5);
        assert_eq!(clock.now(), Timestamp::from_millis(15));

        clock.set(Timestamp::from_millis(100));
        assert_eq!(clock.now(), Timestamp::from_millis(100));
    }

    #[test]
    fn test_manual_clock_never_moves_backwards() {
        let clock = ManualClock::new(Timestamp::from_millis(500));
        clock.set(Timestamp::from_millis(100));
        assert_eq!(clock.now(), Timestamp::from_millis(500));
    }
}
