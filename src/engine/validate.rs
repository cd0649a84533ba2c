use std::fmt;

use chrono::{FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::calendar;
use crate::model::*;

use super::slots::{check_booking_window, compute_slots, diagnose_end, SLOT_MINUTES};

// ── Booking Validator ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    DateOutOfRange,
    StartUnavailable,
    EndUnavailable,
    DailyLimitExceeded,
    WeeklyLimitExceeded,
}

impl ViolationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ViolationKind::DateOutOfRange => "date_out_of_range",
            ViolationKind::StartUnavailable => "start_unavailable",
            ViolationKind::EndUnavailable => "end_unavailable",
            ViolationKind::DailyLimitExceeded => "daily_limit_exceeded",
            ViolationKind::WeeklyLimitExceeded => "weekly_limit_exceeded",
        }
    }
}

/// A proposed booking that the room's rules do not admit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub kind: ViolationKind,
    /// Why the start or end was refused, when known.
    pub detail: Option<ReasonCode>,
    pub message: String,
}

impl Rejection {
    pub(crate) fn new(
        kind: ViolationKind,
        detail: Option<ReasonCode>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            detail,
            message: message.into(),
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)?;
        if let Some(detail) = self.detail {
            write!(f, " ({detail})")?;
        }
        Ok(())
    }
}

/// Validate a proposed `[start, end)` booking for `user_id`. The booking's
/// date is the facility-local date of `start`. First failure wins:
/// date range, start option, end option, daily cap, weekly cap.
/// An `end` at or before `start` fails as an end option with `MinDuration`.
pub fn validate_booking(
    room: &RoomState,
    user_id: Ulid,
    start: Ms,
    end: Ms,
    now: Ms,
    offset: FixedOffset,
) -> Result<(), Rejection> {
    let rules = &room.availability;
    let date = calendar::local_date(start, offset);
    let today = calendar::local_date(now, offset);

    check_booking_window(rules, date, today)
        .map_err(|msg| Rejection::new(ViolationKind::DateOutOfRange, None, msg))?;

    let slots = compute_slots(room, date, now, offset);
    let step = SLOT_MINUTES as Ms * MINUTE_MS;

    let start_offset = calendar::ms_since_midnight(date, start, offset);
    if start_offset % step != 0 {
        return Err(Rejection::new(
            ViolationKind::StartUnavailable,
            Some(ReasonCode::Granularity),
            format!("bookings start on {SLOT_MINUTES}-minute boundaries"),
        ));
    }
    let start_min = (start_offset / MINUTE_MS) as u32;
    let start_at = ClockTime::from_minutes(start_min).unwrap_or(ClockTime::MIDNIGHT);
    if !slots.end_options_by_start.contains_key(&start_at) {
        let detail = slots
            .unavailable_reasons
            .get(&start_at)
            .copied()
            .flatten()
            .unwrap_or(ReasonCode::OperatingHours);
        let message = slots
            .error
            .unwrap_or_else(|| format!("{start_at} on {date} is not available"));
        return Err(Rejection::new(ViolationKind::StartUnavailable, Some(detail), message));
    }

    let end_offset = calendar::ms_since_midnight(date, end, offset);
    if end_offset % step != 0 {
        return Err(Rejection::new(
            ViolationKind::EndUnavailable,
            Some(ReasonCode::Granularity),
            format!("bookings end on {SLOT_MINUTES}-minute boundaries"),
        ));
    }
    let end_min = end_offset / MINUTE_MS;
    let offered = u32::try_from(end_min)
        .ok()
        .and_then(ClockTime::from_minutes)
        .is_some_and(|end| slots.ends_for(start_at).contains(&end));
    if !offered {
        let detail = diagnose_end(room, date, start_min, end_min, now, offset);
        return Err(Rejection::new(
            ViolationKind::EndUnavailable,
            Some(detail),
            format!("booking from {start_at} cannot end at the requested time"),
        ));
    }

    let (daily, weekly) = count_user_bookings(room, user_id, date, offset);
    if daily >= rules.max_bookings_per_user_per_day {
        return Err(Rejection::new(
            ViolationKind::DailyLimitExceeded,
            None,
            format!(
                "at most {} bookings per day allowed for this room",
                rules.max_bookings_per_user_per_day
            ),
        ));
    }
    if weekly >= rules.max_bookings_per_user_per_week {
        return Err(Rejection::new(
            ViolationKind::WeeklyLimitExceeded,
            None,
            format!(
                "at most {} bookings per week allowed for this room",
                rules.max_bookings_per_user_per_week
            ),
        ));
    }

    Ok(())
}

/// Validate using wall-clock `start`/`end` on `date`.
pub fn validate_slot(
    room: &RoomState,
    user_id: Ulid,
    date: NaiveDate,
    start: ClockTime,
    end: ClockTime,
    now: Ms,
    offset: FixedOffset,
) -> Result<(), Rejection> {
    let start_at = calendar::local_instant(date, start.minutes(), offset);
    let end_at = calendar::local_instant(date, end.minutes(), offset);
    validate_booking(room, user_id, start_at, end_at, now, offset)
}

/// Pending + confirmed bookings held by `user_id` on `date` and in its ISO week.
fn count_user_bookings(
    room: &RoomState,
    user_id: Ulid,
    date: NaiveDate,
    offset: FixedOffset,
) -> (u32, u32) {
    let mut daily = 0;
    let mut weekly = 0;
    for booking in room
        .bookings
        .iter()
        .filter(|b| b.user_id == user_id && b.status.occupies())
    {
        let day = calendar::local_date(booking.start_time, offset);
        if day == date {
            daily += 1;
        }
        if calendar::same_iso_week(day, date) {
            weekly += 1;
        }
    }
    (daily, weekly)
}
