//! Clock abstraction so date-sensitive bookkeeping is testable.

use chrono::{Days, NaiveDate, TimeZone, Utc};
use std::sync::atomic::{AtomicI64, Ordering};

/// Source of the current time, in Unix seconds (UTC).
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;

    /// Calendar date of [`Clock::now`].
    fn today(&self) -> NaiveDate {
        date_of(self.now())
    }

    fn yesterday(&self) -> NaiveDate {
        let today = self.today();
        today.checked_sub_days(Days::new(1)).unwrap_or(today)
    }
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        Utc::now().timestamp()
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(now: i64) -> Self {
        Self {
            now: AtomicI64::new(now),
        }
    }

    /// Starts at midnight UTC of the given date.
    pub fn at_date(date: NaiveDate) -> Self {
        Self::new(midnight(date))
    }

    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, seconds: i64) {
        self.now.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// UTC calendar date of a Unix timestamp.
pub fn date_of(timestamp: i64) -> NaiveDate {
    Utc.timestamp_opt(timestamp, 0)
        .single()
        .map(|dt| dt.date_naive())
        .unwrap_or_default()
}

/// Unix timestamp of midnight UTC on `date`.
pub fn midnight(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or_default()
}

/// `[year, month, day]` as stored in settings blobs.
pub fn date_triplet(date: NaiveDate) -> [i64; 3] {
    use chrono::Datelike;
    [i64::from(date.year()), i64::from(date.month()), i64::from(date.day())]
}
