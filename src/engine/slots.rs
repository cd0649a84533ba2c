use std::collections::BTreeMap;

use chrono::{Datelike, Days, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::calendar;
use crate::model::*;

// ── Slot Calculator ───────────────────────────────────────────────

/// Grid step for start and end options, in minutes.
pub const SLOT_MINUTES: u32 = 30;

/// Rule set echoed back with every slot computation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Restrictions {
    pub min_booking_duration: u32,
    pub max_booking_duration: u32,
    pub buffer_time: u32,
    pub advance_booking_days: u32,
    pub same_day_booking_enabled: bool,
    pub max_bookings_per_user_per_day: u32,
    pub max_bookings_per_user_per_week: u32,
}

impl From<&RoomAvailability> for Restrictions {
    fn from(rules: &RoomAvailability) -> Self {
        Self {
            min_booking_duration: rules.min_booking_duration,
            max_booking_duration: rules.max_booking_duration,
            buffer_time: rules.buffer_time,
            advance_booking_days: rules.advance_booking_days,
            same_day_booking_enabled: rules.same_day_booking_enabled,
            max_bookings_per_user_per_day: rules.max_bookings_per_user_per_day,
            max_bookings_per_user_per_week: rules.max_bookings_per_user_per_week,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotAvailabilityResult {
    pub date: String,
    pub operating_hours: Option<DayHours>,
    pub restrictions: Option<Restrictions>,
    pub start_options: Vec<ClockTime>,
    pub end_options_by_start: BTreeMap<ClockTime, Vec<ClockTime>>,
    /// Every grid time: `None` when offered as a start, otherwise why not.
    pub unavailable_reasons: BTreeMap<ClockTime, Option<ReasonCode>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

impl SlotAvailabilityResult {
    fn empty(date: String, restrictions: Option<Restrictions>) -> Self {
        Self {
            date,
            operating_hours: None,
            restrictions,
            start_options: Vec::new(),
            end_options_by_start: BTreeMap::new(),
            unavailable_reasons: BTreeMap::new(),
            error: None,
        }
    }

    /// Request-level failure (malformed date, unknown room): no slots, just the error.
    pub fn failed(date: impl Into<String>, error: impl Into<String>) -> Self {
        let mut result = Self::empty(date.into(), None);
        result.error = Some(error.into());
        result
    }

    pub fn ends_for(&self, start: ClockTime) -> &[ClockTime] {
        self.end_options_by_start
            .get(&start)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Date-level admission: `[today or today+1, today + advance_booking_days]`.
pub fn check_booking_window(
    rules: &RoomAvailability,
    date: NaiveDate,
    today: NaiveDate,
) -> Result<(), String> {
    if date < today {
        return Err(format!("{date} is in the past"));
    }
    if date == today && !rules.same_day_booking_enabled {
        return Err("same-day bookings are not allowed for this room".into());
    }
    let latest = today.checked_add_days(Days::new(rules.advance_booking_days as u64));
    if latest.is_none_or(|latest| date > latest) {
        return Err(format!(
            "{date} is more than {} days in advance",
            rules.advance_booking_days
        ));
    }
    Ok(())
}

/// Compute start options, end options per start and per-time rejection reasons
/// for one room on one date. Pure: `now` stands in for the wall clock.
pub fn compute_slots(
    room: &RoomState,
    date: NaiveDate,
    now: Ms,
    offset: FixedOffset,
) -> SlotAvailabilityResult {
    let rules = &room.availability;
    let mut result =
        SlotAvailabilityResult::empty(date.format("%Y-%m-%d").to_string(), Some(rules.into()));

    let today = calendar::local_date(now, offset);
    if let Err(msg) = check_booking_window(rules, date, today) {
        result.error = Some(msg);
        return result;
    }

    let hours = *rules.operating_hours.for_weekday(date.weekday());
    if !hours.enabled {
        result.error = Some(format!("room is closed on {}", weekday_name(date.weekday())));
        return result;
    }
    result.operating_hours = Some(hours);

    let grid = DayGrid::new(room, date, hours, now, offset);
    for t in grid.times() {
        let Some(at) = ClockTime::from_minutes(t) else { continue };
        match grid.start_verdict(t) {
            Ok(ends) => {
                result.start_options.push(at);
                result.end_options_by_start.insert(at, ends);
                result.unavailable_reasons.insert(at, None);
            }
            Err(reason) => {
                result.unavailable_reasons.insert(at, Some(reason));
            }
        }
    }

    result
}

/// Explain why `span` is not among the end options of its start, assuming the
/// start itself was offered.
pub(crate) fn diagnose_end(
    room: &RoomState,
    date: NaiveDate,
    start_min: u32,
    end_min: i64,
    now: Ms,
    offset: FixedOffset,
) -> ReasonCode {
    let rules = &room.availability;
    let duration = end_min - start_min as i64;
    if duration < rules.min_booking_duration as i64 {
        return ReasonCode::MinDuration;
    }
    if duration > rules.max_booking_duration as i64 {
        return ReasonCode::MaxDuration;
    }
    let hours = *rules.operating_hours.for_weekday(date.weekday());
    if !hours.enabled || end_min > hours.end.minutes() as i64 {
        return ReasonCode::OperatingHours;
    }
    let grid = DayGrid::new(room, date, hours, now, offset);
    let span = Span::new(grid.instant(start_min), grid.instant(end_min as u32));
    grid.obstruction_in(&span)
        .unwrap_or(ReasonCode::ExistingBooking)
}

/// One room's obstacles on one date, resolved to absolute instants.
struct DayGrid {
    midnight: Ms,
    open: u32,
    close: u32,
    min: u32,
    max: u32,
    now: Ms,
    blackouts: Vec<Span>,
    bookings: Vec<Span>,
    /// Bookings grown by the buffer on both sides.
    padded: Vec<Span>,
}

impl DayGrid {
    fn new(room: &RoomState, date: NaiveDate, hours: DayHours, now: Ms, offset: FixedOffset) -> Self {
        let rules = &room.availability;
        let midnight = calendar::local_midnight(date, offset);
        let buffer = rules.buffer_ms();
        let day = Span::new(midnight, midnight + DAY_MS);
        // Bookings on neighbouring days can still reach in through their buffer.
        let reach = day.padded(buffer);

        let blackouts = room.active_blackouts(&day).map(RoomBlackout::span).collect();
        let mut bookings = Vec::new();
        let mut padded = Vec::new();
        for booking in room.occupying_bookings(&reach) {
            bookings.push(booking.span());
            padded.push(booking.span().padded(buffer));
        }

        Self {
            midnight,
            open: hours.start.minutes(),
            close: hours.end.minutes(),
            min: rules.min_booking_duration,
            max: rules.max_booking_duration,
            now,
            blackouts,
            bookings,
            padded,
        }
    }

    fn instant(&self, minutes: u32) -> Ms {
        self.midnight + minutes as Ms * MINUTE_MS
    }

    /// Grid times from the first :00/:30 mark at or after opening, before closing.
    fn times(&self) -> std::iter::StepBy<std::ops::Range<u32>> {
        let first = self.open.div_ceil(SLOT_MINUTES) * SLOT_MINUTES;
        (first..self.close).step_by(SLOT_MINUTES as usize)
    }

    /// Most specific obstacle covering `at`: blackout, then booking, then buffer.
    fn obstruction_at(&self, at: Ms) -> Option<ReasonCode> {
        if self.blackouts.iter().any(|s| s.contains_instant(at)) {
            Some(ReasonCode::Blackout)
        } else if self.bookings.iter().any(|s| s.contains_instant(at)) {
            Some(ReasonCode::ExistingBooking)
        } else if self.padded.iter().any(|s| s.contains_instant(at)) {
            Some(ReasonCode::Buffer)
        } else {
            None
        }
    }

    fn obstruction_in(&self, span: &Span) -> Option<ReasonCode> {
        if self.blackouts.iter().any(|s| s.overlaps(span)) {
            Some(ReasonCode::Blackout)
        } else if self.bookings.iter().any(|s| s.overlaps(span)) {
            Some(ReasonCode::ExistingBooking)
        } else if self.padded.iter().any(|s| s.overlaps(span)) {
            Some(ReasonCode::Buffer)
        } else {
            None
        }
    }

    fn start_verdict(&self, t: u32) -> Result<Vec<ClockTime>, ReasonCode> {
        let at = self.instant(t);
        if at < self.now {
            return Err(ReasonCode::PastTime);
        }
        if let Some(reason) = self.obstruction_at(at) {
            return Err(reason);
        }
        if t + self.min > self.close {
            return Err(ReasonCode::MinDuration);
        }
        let ends = self.end_options(t);
        if ends.is_empty() {
            let shortest = Span::new(at, self.instant(t + self.min));
            return Err(self.obstruction_in(&shortest).unwrap_or(ReasonCode::MinDuration));
        }
        Ok(ends)
    }

    /// Ascending ends `e = s + k·SLOT` with `min <= e - s <= max`, `e <= close`
    /// and `[s, e)` clear of every obstacle. Obstacles only grow with `e`, so
    /// the first hit ends the scan.
    fn end_options(&self, s: u32) -> Vec<ClockTime> {
        let mut ends = Vec::new();
        let mut e = s + SLOT_MINUTES;
        while e <= self.close && e - s <= self.max {
            let window = Span::new(self.instant(s), self.instant(e));
            if self.obstruction_in(&window).is_some() {
                break;
            }
            if e - s >= self.min
                && let Some(end) = ClockTime::from_minutes(e)
            {
                ends.push(end);
            }
            e += SLOT_MINUTES;
        }
        ends
    }
}
