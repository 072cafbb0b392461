//! Time source for issuing and verifying tokens.
//!
//! Every `now` the codec reads goes through a [`Clock`], so the expiry
//! check and the issue timestamps always agree with each other, and tests
//! can move time forward without sleeping.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A source of wall-clock time.
pub trait Clock: Send + Sync + 'static {
    /// The current time.
    fn now(&self) -> SystemTime;
}

/// Reads the operating system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// A clock that only moves when told to.
///
/// Stored as milliseconds since the Unix epoch in an atomic, so reading it
/// never takes a lock.
#[derive(Debug)]
pub struct ManualClock {
    millis: AtomicU64,
}

impl ManualClock {
    /// Starts the clock at `start`.
    pub fn new(start: SystemTime) -> Self {
        Self {
            millis: AtomicU64::new(to_millis(start)),
        }
    }

    /// Starts the clock at the current system time.
    pub fn starting_now() -> Self {
        Self::new(SystemTime::now())
    }

    /// Moves the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        self.millis
            .fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    /// Jumps to an absolute point in time (may go backwards).
    pub fn set(&self, to: SystemTime) {
        self.millis.store(to_millis(to), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(self.millis.load(Ordering::SeqCst))
    }
}

// Shared clocks: lets a test keep a handle while the codec owns another.
impl<C: Clock> Clock for std::sync::Arc<C> {
    fn now(&self) -> SystemTime {
        (**self).now()
    }
}

/// Milliseconds since the Unix epoch; times before the epoch clamp to zero.
pub(crate) fn to_millis(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_stays_put_until_advanced() {
        let start = UNIX_EPOCH + Duration::from_secs(1_000);
        let clock = ManualClock::new(start);

        assert_eq!(clock.now(), start);
        assert_eq!(clock.now(), start);

        clock.advance(Duration::from_secs(61));
        assert_eq!(clock.now(), start + Duration::from_secs(61));
    }

    #[test]
    fn test_manual_clock_set_can_go_backwards() {
        let clock = ManualClock::new(UNIX_EPOCH + Duration::from_secs(500));
        clock.set(UNIX_EPOCH + Duration::from_secs(10));
        assert_eq!(clock.now(), UNIX_EPOCH + Duration::from_secs(10));
    }

    #[test]
    fn test_arc_clock_sees_shared_updates() {
        let clock = std::sync::Arc::new(ManualClock::new(UNIX_EPOCH));
        let shared = std::sync::Arc::clone(&clock);

        clock.advance(Duration::from_millis(1_500));

        assert_eq!(shared.now(), UNIX_EPOCH + Duration::from_millis(1_500));
    }

    #[test]
    fn test_to_millis_clamps_pre_epoch() {
        let before = UNIX_EPOCH - Duration::from_secs(5);
        assert_eq!(to_millis(before), 0);
    }
}
