//! World clock abstraction.
//!
//! The lock manager never reads the host clock directly: "now" and
//! broken-down local time come from a [`WorldClock`] supplied at
//! construction. Reset times are computed in the host's local zone and then
//! converted back to an instant through the same clock, so a simulated clock
//! sees a fully consistent timeline.

use chrono::{DateTime, Local, LocalResult, NaiveDateTime, TimeZone, Utc};
use std::sync::Mutex;

/// Source of the current time for the lock system.
pub trait WorldClock: Send + Sync {
    /// Current instant.
    fn now(&self) -> DateTime<Utc>;

    /// Current broken-down local wall-clock time.
    fn local_now(&self) -> NaiveDateTime;

    /// Converts a local wall-clock time into an instant.
    fn from_local(&self, local: NaiveDateTime) -> DateTime<Utc>;
}

/// Host system clock in the server's local zone.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl WorldClock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn local_now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }

    fn from_local(&self, local: NaiveDateTime) -> DateTime<Utc> {
        match Local.from_local_datetime(&local) {
            LocalResult::Single(instant) => instant.with_timezone(&Utc),
            // A fall-back DST transition; the earlier occurrence wins.
            LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
            // Skipped by a spring-forward transition. Resets landing inside
            // the gap are accepted as-is, 23 or 25 hour periods included.
            LocalResult::None => Utc.from_utc_datetime(&local),
        }
    }
}

/// Settable clock where local time equals UTC.
///
/// Used by deterministic test worlds; [`ManualClock::advance`] moves the
/// whole timeline forward without touching the host clock.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<NaiveDateTime>,
}

impl ManualClock {
    pub fn new(now: NaiveDateTime) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn set(&self, now: NaiveDateTime) {
        *self.now.lock().unwrap() = now;
    }

    pub fn advance(&self, delta: chrono::Duration) {
        let mut now = self.now.lock().unwrap();
        *now += delta;
    }
}

impl WorldClock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        Utc.from_utc_datetime(&self.now.lock().unwrap())
    }

    fn local_now(&self) -> NaiveDateTime {
        *self.now.lock().unwrap()
    }

    fn from_local(&self, local: NaiveDateTime) -> DateTime<Utc> {
        Utc.from_utc_datetime(&local)
    }
}
