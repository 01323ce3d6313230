//! Time source abstraction.
//!
//! All record timestamps are unix seconds. Engines read "now" through a
//! [`Clock`] so staleness cutoffs and vote edit windows can be tested
//! deterministically with [`FixedClock`].

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

/// Unix timestamp in seconds.
pub type Timestamp = i64;

/// Seconds in one day.
pub const SECS_PER_DAY: i64 = 86_400;

pub trait Clock: Send + Sync + fmt::Debug {
    /// Current wall-clock time in unix seconds.
    fn now(&self) -> Timestamp;
}

/// Production clock backed by `chrono::Utc`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        chrono::Utc::now().timestamp()
    }
}

/// Settable clock for tests and replay jobs.
#[derive(Debug, Default)]
pub struct FixedClock {
    now: AtomicI64,
}

impl FixedClock {
    pub fn new(now: Timestamp) -> Self {
        Self {
            now: AtomicI64::new(now),
        }
    }

    pub fn set(&self, now: Timestamp) {
        self.now.store(now, Ordering::SeqCst);
    }

    /// Move the clock forward by `secs` and return the new time.
    pub fn advance(&self, secs: i64) -> Timestamp {
        self.now.fetch_add(secs, Ordering::SeqCst) + secs
    }
}

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_advances() {
        let clock = FixedClock::new(1_000);
        assert_eq!(clock.now(), 1_000);
        assert_eq!(clock.advance(SECS_PER_DAY), 1_000 + SECS_PER_DAY);
        clock.set(5);
        assert_eq!(clock.now(), 5);
    }

    #[test]
    fn system_clock_is_after_2020() {
        assert!(SystemClock.now() > 1_577_836_800);
    }
}
