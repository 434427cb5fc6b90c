//! Time sources.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of wall-clock timestamps in Unix milliseconds.
///
/// Enqueue order, backoff deadlines and cache staleness all read time
/// through this trait so tests can drive it by hand.
pub trait Clock: Send + Sync {
    /// Returns the current time in Unix milliseconds.
    fn now_millis(&self) -> u64;
}

/// The system wall clock. Readings never decrease, even if the wall clock
/// is stepped back.
#[derive(Debug, Default)]
pub struct SystemClock {
    last: AtomicU64,
}

impl SystemClock {
    /// Creates a clock starting at the current wall time.
    pub fn new() -> Self {
        Self::default()
    }

    fn clamp(&self, wall: u64) -> u64 {
        let previous = self.last.fetch_max(wall, Ordering::SeqCst);
        previous.max(wall)
    }
}

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        self.clamp(wall)
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// Creates a clock reading `start`.
    pub fn new(start: u64) -> Self {
        Self {
            now: AtomicU64::new(start),
        }
    }

    /// Sets the current time.
    pub fn set(&self, now: u64) {
        self.now.store(now, Ordering::SeqCst);
    }

    /// Moves the clock forward by `millis`.
    pub fn advance(&self, millis: u64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock() {
        let clock = ManualClock::new(10);
        assert_eq!(clock.now_millis(), 10);
        clock.advance(5);
        assert_eq!(clock.now_millis(), 15);
        clock.set(0);
        assert_eq!(clock.now_millis(), 0);
    }

    #[test]
    fn system_clock_is_after_2020() {
        assert!(SystemClock::new().now_millis() > 1_577_836_800_000);
    }

    #[test]
    fn system_clock_never_goes_backwards() {
        let clock = SystemClock::new();
        assert_eq!(clock.clamp(5_000), 5_000);
        assert_eq!(clock.clamp(4_000), 5_000);
        assert_eq!(clock.clamp(6_000), 6_000);

        let a = clock.now_millis();
        let b = clock.now_millis();
        assert!(b >= a);
    }
}
