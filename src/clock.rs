//! Time source.
//!
//! The scheduler never reads the wall clock directly; every "now" flows
//! through a `Clock` so tests can pin or fast-forward time deterministically.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

/// Returns the current instant. Implementations must be cheap and infallible.
pub trait Clock: Send + Sync {
    /// The current instant, in UTC.
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock: reads the real wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that always returns a fixed instant until explicitly advanced.
///
/// Used by tests to exercise ticks at precise, reproducible timestamps
/// without sleeping.
pub struct FixedClock {
    now: RwLock<DateTime<Utc>>,
}

impl FixedClock {
    /// Create a clock pinned at `at`.
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(at),
        }
    }

    /// Move the clock forward (or backward) by `delta`.
    pub fn advance(&self, delta: chrono::Duration) {
        let mut now = self.now.write();
        *now += delta;
    }

    /// Pin the clock to an explicit instant.
    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.write() = at;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn system_clock_moves_forward() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }

    #[test]
    fn fixed_clock_holds_until_advanced() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 30).unwrap();
        let clock = FixedClock::new(at);
        assert_eq!(clock.now(), at);
        clock.advance(chrono::Duration::seconds(30));
        assert_eq!(clock.now(), at + chrono::Duration::seconds(30));
    }
}
