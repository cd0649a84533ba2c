use std::fmt;
use std::str::FromStr;

use chrono::Weekday;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use ulid::Ulid;

/// Unix milliseconds. Every absolute instant uses this.
pub type Ms = i64;

pub const MINUTE_MS: Ms = 60_000;
pub const HOUR_MS: Ms = 60 * MINUTE_MS;
pub const DAY_MS: Ms = 24 * HOUR_MS;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }

    /// Grow the span by `pad` on both sides.
    pub fn padded(&self, pad: Ms) -> Span {
        Span::new(self.start - pad, self.end + pad)
    }
}

// ── Wall-clock time of day ────────────────────────────────────────

/// Minute of the day, serialized as zero-padded `"HH:MM"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClockTime(u16);

impl ClockTime {
    pub const MIDNIGHT: ClockTime = ClockTime(0);

    pub const fn from_hm(hour: u16, minute: u16) -> Self {
        assert!(hour < 24 && minute < 60, "clock time out of range");
        Self(hour * 60 + minute)
    }

    /// `None` unless `minutes` falls within a single day.
    pub fn from_minutes(minutes: u32) -> Option<Self> {
        (minutes < 24 * 60).then_some(Self(minutes as u16))
    }

    pub fn minutes(self) -> u32 {
        self.0 as u32
    }

    pub fn hour(self) -> u16 {
        self.0 / 60
    }

    pub fn minute(self) -> u16 {
        self.0 % 60
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseClockTimeError(String);

impl fmt::Display for ParseClockTimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid time {:?}: expected zero-padded HH:MM", self.0)
    }
}

impl std::error::Error for ParseClockTimeError {}

impl FromStr for ClockTime {
    type Err = ParseClockTimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseClockTimeError(s.to_string());
        let (h, m) = s.split_once(':').ok_or_else(err)?;
        if h.len() != 2 || m.len() != 2 || !h.bytes().chain(m.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(err());
        }
        let hour: u16 = h.parse().map_err(|_| err())?;
        let minute: u16 = m.parse().map_err(|_| err())?;
        if hour >= 24 || minute >= 60 {
            return Err(err());
        }
        Ok(Self(hour * 60 + minute))
    }
}

impl Serialize for ClockTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ClockTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ── Availability rules ────────────────────────────────────────────

/// Opening window for one weekday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DayHours {
    pub enabled: bool,
    pub start: ClockTime,
    pub end: ClockTime,
}

impl DayHours {
    pub const fn open(start: ClockTime, end: ClockTime) -> Self {
        Self { enabled: true, start, end }
    }

    pub const fn closed() -> Self {
        Self {
            enabled: false,
            start: ClockTime::from_hm(9, 0),
            end: ClockTime::from_hm(17, 0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OperatingHours {
    pub monday: DayHours,
    pub tuesday: DayHours,
    pub wednesday: DayHours,
    pub thursday: DayHours,
    pub friday: DayHours,
    pub saturday: DayHours,
    pub sunday: DayHours,
}

impl OperatingHours {
    /// Same hours on every day of the week.
    pub fn every_day(hours: DayHours) -> Self {
        Self {
            monday: hours,
            tuesday: hours,
            wednesday: hours,
            thursday: hours,
            friday: hours,
            saturday: hours,
            sunday: hours,
        }
    }

    pub fn for_weekday(&self, day: Weekday) -> &DayHours {
        match day {
            Weekday::Mon => &self.monday,
            Weekday::Tue => &self.tuesday,
            Weekday::Wed => &self.wednesday,
            Weekday::Thu => &self.thursday,
            Weekday::Fri => &self.friday,
            Weekday::Sat => &self.saturday,
            Weekday::Sun => &self.sunday,
        }
    }

    pub fn days(&self) -> [(Weekday, &DayHours); 7] {
        [
            (Weekday::Mon, &self.monday),
            (Weekday::Tue, &self.tuesday),
            (Weekday::Wed, &self.wednesday),
            (Weekday::Thu, &self.thursday),
            (Weekday::Fri, &self.friday),
            (Weekday::Sat, &self.saturday),
            (Weekday::Sun, &self.sunday),
        ]
    }
}

impl Default for OperatingHours {
    /// Weekdays 08:00–18:00, closed at the weekend.
    fn default() -> Self {
        let weekday = DayHours::open(ClockTime::from_hm(8, 0), ClockTime::from_hm(18, 0));
        Self {
            monday: weekday,
            tuesday: weekday,
            wednesday: weekday,
            thursday: weekday,
            friday: weekday,
            saturday: DayHours::closed(),
            sunday: DayHours::closed(),
        }
    }
}

pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

/// Booking rules for one room. Durations and buffer are in minutes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoomAvailability {
    pub room_id: Ulid,
    pub operating_hours: OperatingHours,
    pub min_booking_duration: u32,
    pub max_booking_duration: u32,
    pub buffer_time: u32,
    pub advance_booking_days: u32,
    pub same_day_booking_enabled: bool,
    pub max_bookings_per_user_per_day: u32,
    pub max_bookings_per_user_per_week: u32,
}

impl RoomAvailability {
    pub fn with_defaults(room_id: Ulid) -> Self {
        Self {
            room_id,
            operating_hours: OperatingHours::default(),
            min_booking_duration: 30,
            max_booking_duration: 480,
            buffer_time: 0,
            advance_booking_days: 30,
            same_day_booking_enabled: true,
            max_bookings_per_user_per_day: 3,
            max_bookings_per_user_per_week: 10,
        }
    }

    pub fn buffer_ms(&self) -> Ms {
        self.buffer_time as Ms * MINUTE_MS
    }
}

// ── Blackouts ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlackoutType {
    Maintenance,
    Cleaning,
    Event,
    Holiday,
    Repair,
    Other,
}

/// Administrator-declared closure of a room. Overlapping blackouts are allowed.
/// `is_recurring` is carried for callers; each record is one concrete interval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomBlackout {
    pub id: Ulid,
    pub room_id: Ulid,
    pub title: String,
    pub description: Option<String>,
    pub start_time: Ms,
    pub end_time: Ms,
    pub blackout_type: BlackoutType,
    pub is_recurring: bool,
    pub is_active: bool,
}

impl RoomBlackout {
    pub fn span(&self) -> Span {
        Span::new(self.start_time, self.end_time)
    }
}

// ── Bookings ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Rejected,
}

impl BookingStatus {
    /// Only pending and confirmed bookings hold the room.
    pub fn occupies(self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }

    pub fn can_transition_to(self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed) | (Pending, Rejected) | (Pending, Cancelled) | (Confirmed, Cancelled)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub room_id: Ulid,
    pub user_id: Ulid,
    pub title: Option<String>,
    pub start_time: Ms,
    pub end_time: Ms,
    pub status: BookingStatus,
    pub created_at: Ms,
}

impl Booking {
    pub fn span(&self) -> Span {
        Span::new(self.start_time, self.end_time)
    }
}

/// A booking as submitted. Status and creation time are assigned on commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BookingRequest {
    pub room_id: Ulid,
    pub user_id: Ulid,
    #[serde(default)]
    pub title: Option<String>,
    pub start_time: Ms,
    pub end_time: Ms,
}

// ── Reason codes ──────────────────────────────────────────────────

/// Why a time cannot be offered. The wire strings are shared with clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReasonCode {
    #[serde(rename = "conflict:existing_booking")]
    ExistingBooking,
    #[serde(rename = "conflict:blackout")]
    Blackout,
    #[serde(rename = "conflict:buffer")]
    Buffer,
    #[serde(rename = "rule:max_duration")]
    MaxDuration,
    #[serde(rename = "rule:min_duration")]
    MinDuration,
    #[serde(rename = "rule:past_time")]
    PastTime,
    #[serde(rename = "rule:operating_hours")]
    OperatingHours,
    #[serde(rename = "rule:granularity")]
    Granularity,
}

impl ReasonCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ReasonCode::ExistingBooking => "conflict:existing_booking",
            ReasonCode::Blackout => "conflict:blackout",
            ReasonCode::Buffer => "conflict:buffer",
            ReasonCode::MaxDuration => "rule:max_duration",
            ReasonCode::MinDuration => "rule:min_duration",
            ReasonCode::PastTime => "rule:past_time",
            ReasonCode::OperatingHours => "rule:operating_hours",
            ReasonCode::Granularity => "rule:granularity",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Per-room state ────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RoomState {
    pub id: Ulid,
    pub name: Option<String>,
    pub availability: RoomAvailability,
    /// Sorted by `start_time`.
    pub blackouts: Vec<RoomBlackout>,
    /// Sorted by `start_time`.
    pub bookings: Vec<Booking>,
}

impl RoomState {
    pub fn new(id: Ulid, name: Option<String>) -> Self {
        Self {
            id,
            name,
            availability: RoomAvailability::with_defaults(id),
            blackouts: Vec::new(),
            bookings: Vec::new(),
        }
    }

    pub fn insert_blackout(&mut self, blackout: RoomBlackout) {
        let pos = self
            .blackouts
            .partition_point(|b| b.start_time <= blackout.start_time);
        self.blackouts.insert(pos, blackout);
    }

    pub fn remove_blackout(&mut self, id: Ulid) -> Option<RoomBlackout> {
        let pos = self.blackouts.iter().position(|b| b.id == id)?;
        Some(self.blackouts.remove(pos))
    }

    pub fn insert_booking(&mut self, booking: Booking) {
        let pos = self
            .bookings
            .partition_point(|b| b.start_time <= booking.start_time);
        self.bookings.insert(pos, booking);
    }

    pub fn remove_booking(&mut self, id: Ulid) -> Option<Booking> {
        let pos = self.bookings.iter().position(|b| b.id == id)?;
        Some(self.bookings.remove(pos))
    }

    pub fn booking(&self, id: Ulid) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == id)
    }

    pub fn booking_mut(&mut self, id: Ulid) -> Option<&mut Booking> {
        self.bookings.iter_mut().find(|b| b.id == id)
    }

    /// Active blackouts overlapping the query window.
    /// Binary search skips blackouts starting at or after `query.end`.
    pub fn active_blackouts(&self, query: &Span) -> impl Iterator<Item = &RoomBlackout> {
        let right_bound = self.blackouts.partition_point(|b| b.start_time < query.end);
        self.blackouts[..right_bound]
            .iter()
            .filter(move |b| b.is_active && b.end_time > query.start)
    }

    /// Pending/confirmed bookings overlapping the query window.
    pub fn occupying_bookings(&self, query: &Span) -> impl Iterator<Item = &Booking> {
        let right_bound = self.bookings.partition_point(|b| b.start_time < query.end);
        self.bookings[..right_bound]
            .iter()
            .filter(move |b| b.status.occupies() && b.end_time > query.start)
    }
}

/// One WAL record. Flat, no nesting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    RoomCreated {
        id: Ulid,
        name: Option<String>,
    },
    RoomUpdated {
        id: Ulid,
        name: Option<String>,
    },
    RoomDeleted {
        id: Ulid,
    },
    AvailabilitySet {
        availability: RoomAvailability,
    },
    BlackoutCreated {
        blackout: RoomBlackout,
    },
    BlackoutUpdated {
        blackout: RoomBlackout,
    },
    BlackoutDeleted {
        id: Ulid,
        room_id: Ulid,
    },
    BookingCreated {
        booking: Booking,
    },
    BookingStatusChanged {
        id: Ulid,
        room_id: Ulid,
        status: BookingStatus,
    },
    BookingDeleted {
        id: Ulid,
        room_id: Ulid,
    },
}

impl Event {
    /// Room an event applies to, for everything but room create/delete.
    pub fn room_id(&self) -> Option<Ulid> {
        match self {
            Event::AvailabilitySet { availability } => Some(availability.room_id),
            Event::BlackoutCreated { blackout } | Event::BlackoutUpdated { blackout } => {
                Some(blackout.room_id)
            }
            Event::BookingCreated { booking } => Some(booking.room_id),
            Event::BlackoutDeleted { room_id, .. }
            | Event::BookingStatusChanged { room_id, .. }
            | Event::BookingDeleted { room_id, .. } => Some(*room_id),
            Event::RoomUpdated { id, .. } => Some(*id),
            Event::RoomCreated { .. } | Event::RoomDeleted { .. } => None,
        }
    }
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomInfo {
    pub id: Ulid,
    pub name: Option<String>,
}
