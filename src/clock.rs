//! Injected wall-clock time.
//!
//! "Open now" is a local-clock concept, so every evaluator works on a
//! [`Moment`]: the civil time in the reference timezone plus the epoch
//! timestamp used for snapshot bookkeeping. Nothing below `reconcile` reads the
//! system clock directly.

use chrono::{DateTime, Datelike, Duration, Local, NaiveDateTime, Timelike};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// English weekday names, Monday first, as used by working-hours maps.
pub const WEEKDAYS: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

/// A point in time as seen by the tracker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Moment {
    /// Wall-clock time in the reference timezone.
    pub local: NaiveDateTime,
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
}

impl Moment {
    pub fn new(local: NaiveDateTime, timestamp: i64) -> Self {
        Moment { local, timestamp }
    }

    /// Build a moment whose reference timezone is UTC.
    pub fn from_utc(local: NaiveDateTime) -> Self {
        Moment {
            local,
            timestamp: local.and_utc().timestamp(),
        }
    }

    /// Local hour, 0-23.
    pub fn hour(&self) -> u32 {
        self.local.hour()
    }

    /// ISO weekday, 1 = Monday .. 7 = Sunday.
    pub fn iso_weekday(&self) -> u32 {
        self.local.weekday().number_from_monday()
    }

    /// English name of the local weekday.
    pub fn weekday_name(&self) -> &'static str {
        WEEKDAYS[self.local.weekday().num_days_from_monday() as usize]
    }
}

/// Source of the current [`Moment`].
pub trait Clock: Send + Sync {
    fn now(&self) -> Moment;
}

/// Clock backed by the operating system, in the system's civil timezone.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Moment {
        let now = Local::now();
        Moment::new(now.naive_local(), now.timestamp())
    }
}

/// Settable clock for deterministic tests. Its reference timezone is UTC.
///
/// Clones share the same instant, so a test can keep a handle and move time
/// forward after handing the clock to a reconciler.
#[derive(Clone, Debug)]
pub struct FixedClock {
    secs: Arc<AtomicI64>,
}

impl FixedClock {
    pub fn new(local: NaiveDateTime) -> Self {
        FixedClock {
            secs: Arc::new(AtomicI64::new(local.and_utc().timestamp())),
        }
    }

    pub fn set(&self, local: NaiveDateTime) {
        self.secs
            .store(local.and_utc().timestamp(), Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.secs.fetch_add(by.num_seconds(), Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> Moment {
        let secs = self.secs.load(Ordering::SeqCst);
        let local = DateTime::from_timestamp(secs, 0)
            .map(|dt| dt.naive_utc())
            .unwrap_or_default();
        Moment::new(local, secs)
    }
}
