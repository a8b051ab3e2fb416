//! Timestamp policy: the injectable "current time" source, snapshot stamps,
//! and the daily cutoff used to anchor calendar dates to instants.
//!
//! Snapshot stamps are fixed-width `YYYYMMDDHHMMSS` strings in UTC, so
//! lexicographic order on stamps equals chronological order.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::sync::Mutex;

/// Civil timezone whose 17:00 wall-clock marks the end of a trading day.
pub const REFERENCE_TZ: Tz = chrono_tz::America::Los_Angeles;

/// Hour of day (in [`REFERENCE_TZ`]) a daily record is anchored to.
pub const DAILY_CUTOFF_HOUR: i64 = 17;

/// strftime pattern of a snapshot stamp.
pub const STAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Number of digits in a snapshot stamp.
pub const STAMP_LEN: usize = 14;

/// Source of the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Format an instant as a 14-digit snapshot stamp (second precision).
pub fn format_stamp(at: DateTime<Utc>) -> String {
    at.format(STAMP_FORMAT).to_string()
}

/// True if `s` is exactly 14 ASCII digits.
pub fn is_stamp_shaped(s: &str) -> bool {
    s.len() == STAMP_LEN && s.bytes().all(|b| b.is_ascii_digit())
}

/// Parse a snapshot stamp as a UTC instant.
///
/// Returns `None` for anything that is not 14 digits or not a real calendar
/// instant (e.g. month 13).
pub fn parse_stamp(s: &str) -> Option<DateTime<Utc>> {
    if !is_stamp_shaped(s) {
        return None;
    }
    NaiveDateTime::parse_from_str(s, STAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Anchor a calendar date to 17:00 in [`REFERENCE_TZ`], expressed in UTC.
///
/// 17:00 never falls into a DST gap or fold in the reference zone, so the
/// local time always maps to exactly one instant.
pub fn daily_cutoff(date: NaiveDate) -> Option<DateTime<Utc>> {
    let local = date.and_hms_opt(0, 0, 0)? + Duration::hours(DAILY_CUTOFF_HOUR);
    REFERENCE_TZ
        .from_local_datetime(&local)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}
