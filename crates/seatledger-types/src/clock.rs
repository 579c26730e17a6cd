//! Injectable time source.
//!
//! Every time-dependent decision (hold expiry, reopen due-ness, cooling-off
//! windows) reads the clock through this trait so that scenarios spanning
//! minutes or days can be driven deterministically in tests.

use chrono::{DateTime, Utc};

/// Source of the current wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn now_epoch_secs(&self) -> i64 {
        self.now().timestamp()
    }
}

/// Real wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(any(test, feature = "test-helpers"))]
pub use manual::ManualClock;

#[cfg(any(test, feature = "test-helpers"))]
mod manual {
    use std::sync::atomic::{AtomicI64, Ordering};

    use chrono::{DateTime, Duration, TimeZone, Utc};

    use super::Clock;

    /// A clock that only moves when told to.
    #[derive(Debug)]
    pub struct ManualClock {
        millis: AtomicI64,
    }

    impl ManualClock {
        #[must_use]
        pub fn new(start: DateTime<Utc>) -> Self {
            Self {
                millis: AtomicI64::new(start.timestamp_millis()),
            }
        }

        /// Start at a fixed, round instant (2030-01-01T00:00:00Z).
        #[must_use]
        pub fn at_epoch() -> Self {
            Self::new(
                Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0)
                    .single()
                    .unwrap_or_else(Utc::now),
            )
        }

        pub fn advance(&self, by: Duration) {
            self.millis.fetch_add(by.num_milliseconds(), Ordering::SeqCst);
        }

        pub fn advance_secs(&self, secs: i64) {
            self.advance(Duration::seconds(secs));
        }

        pub fn set(&self, to: DateTime<Utc>) {
            self.millis.store(to.timestamp_millis(), Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            let millis = self.millis.load(Ordering::SeqCst);
            DateTime::from_timestamp_millis(millis).unwrap_or_default()
        }
    }
}
