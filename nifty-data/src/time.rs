//! Wall-clock access and India Standard Time helpers.
//!
//! Every component reads "now" through a [`Clock`] so that minute buckets, market phases and
//! expiry dates can be pinned in tests.

use chrono::{DateTime, Timelike, Utc};
use chrono_tz::{Asia::Kolkata, Tz};
use parking_lot::Mutex;
use std::sync::Arc;

/// Exchange timezone used for minute buckets, market phases and expiry dates.
pub const IST: Tz = Kolkata;

/// Source of the current wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Current time in India Standard Time.
    fn now_ist(&self) -> DateTime<Tz> {
        self.now().with_timezone(&IST)
    }
}

/// [`Clock`] backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// [`Clock`] that only moves when told to. Cloned handles share the same instant.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

impl<C> Clock for Arc<C>
where
    C: Clock + ?Sized,
{
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

/// Truncate a timestamp to the start of its minute.
pub fn truncate_to_minute(time: DateTime<Tz>) -> DateTime<Tz> {
    time.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(time)
}

/// Format a timestamp as `HH:MM:SS IST`.
pub fn format_time_ist(time: DateTime<Utc>) -> String {
    time.with_timezone(&IST).format("%H:%M:%S IST").to_string()
}
