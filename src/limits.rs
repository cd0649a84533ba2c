use crate::model::{DAY_MS, Ms};

pub const MAX_ROOMS: usize = 10_000;
pub const MAX_BLACKOUTS_PER_ROOM: usize = 10_000;
pub const MAX_BOOKINGS_PER_ROOM: usize = 100_000;

pub const MAX_NAME_LEN: usize = 256;
pub const MAX_TITLE_LEN: usize = 256;
pub const MAX_DESCRIPTION_LEN: usize = 4096;

/// 2000-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
/// 2200-01-01T00:00:00Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 7_258_118_400_000;

/// Longest blackout a room may carry.
pub const MAX_BLACKOUT_DURATION_MS: Ms = 366 * DAY_MS;

pub const MAX_ADVANCE_BOOKING_DAYS: u32 = 730;
pub const MAX_BUFFER_MINUTES: u32 = 24 * 60;
