//! Facility-local calendar arithmetic.
//!
//! All wall-clock reasoning (dates, weekdays, "HH:MM") happens in one fixed
//! UTC offset configured per deployment.

use chrono::{Datelike, FixedOffset, NaiveDate};

use crate::model::{DAY_MS, MINUTE_MS, Ms};

/// `NaiveDate::num_days_from_ce` of 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: Ms = 719_163;

fn offset_ms(offset: FixedOffset) -> Ms {
    offset.local_minus_utc() as Ms * 1000
}

/// Local calendar date containing `at`.
pub fn local_date(at: Ms, offset: FixedOffset) -> NaiveDate {
    let days = (at + offset_ms(offset)).div_euclid(DAY_MS);
    i32::try_from(days + UNIX_EPOCH_DAYS_FROM_CE)
        .ok()
        .and_then(NaiveDate::from_num_days_from_ce_opt)
        .unwrap_or(NaiveDate::MIN)
}

/// Instant of local midnight at the start of `date`.
pub fn local_midnight(date: NaiveDate, offset: FixedOffset) -> Ms {
    let days = date.num_days_from_ce() as Ms - UNIX_EPOCH_DAYS_FROM_CE;
    days * DAY_MS - offset_ms(offset)
}

/// Instant of `minutes` past local midnight of `date`.
pub fn local_instant(date: NaiveDate, minutes: u32, offset: FixedOffset) -> Ms {
    local_midnight(date, offset) + minutes as Ms * MINUTE_MS
}

/// Milliseconds elapsed since local midnight of `date`; may be negative or
/// exceed a day when `at` lies on another date.
pub fn ms_since_midnight(date: NaiveDate, at: Ms, offset: FixedOffset) -> Ms {
    at - local_midnight(date, offset)
}

/// Whether two dates share an ISO-8601 week.
pub fn same_iso_week(a: NaiveDate, b: NaiveDate) -> bool {
    a.iso_week() == b.iso_week()
}

/// Parse a strict `YYYY-MM-DD` date.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    if raw.len() != 10 {
        return None;
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}
