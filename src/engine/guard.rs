use std::fmt;

use crate::model::{Booking, BookingStatus, HOUR_MS, Ms};

/// Confirmed bookings may be deleted only this far ahead of their start.
pub const DELETE_NOTICE_MS: Ms = 24 * HOUR_MS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteBlocked {
    AlreadyStarted,
    /// Whole hours left before the start, rounded down.
    TooCloseToStart { hours_until_start: i64 },
}

impl fmt::Display for DeleteBlocked {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeleteBlocked::AlreadyStarted => {
                f.write_str("cannot delete a confirmed booking: the meeting has already started")
            }
            DeleteBlocked::TooCloseToStart { hours_until_start } => write!(
                f,
                "cannot delete a confirmed booking less than 24 hours before its start \
                 ({hours_until_start}h left)"
            ),
        }
    }
}

/// Pending, cancelled and rejected bookings are always deletable. Confirmed
/// ones only while `now < start_time - 24h`.
pub fn check_deletable(booking: &Booking, now: Ms) -> Result<(), DeleteBlocked> {
    if booking.status != BookingStatus::Confirmed {
        return Ok(());
    }
    let until_start = booking.start_time - now;
    if until_start <= 0 {
        return Err(DeleteBlocked::AlreadyStarted);
    }
    if until_start <= DELETE_NOTICE_MS {
        return Err(DeleteBlocked::TooCloseToStart {
            hours_until_start: until_start / HOUR_MS,
        });
    }
    Ok(())
}

pub fn can_delete(booking: &Booking, now: Ms) -> bool {
    check_deletable(booking, now).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MINUTE_MS;
    use ulid::Ulid;

    const NOW: Ms = 1_900_000_000_000;

    fn starting_in(delta: Ms, status: BookingStatus) -> Booking {
        Booking {
            id: Ulid::new(),
            room_id: Ulid::new(),
            user_id: Ulid::new(),
            title: Some("Planning".into()),
            start_time: NOW + delta,
            end_time: NOW + delta + HOUR_MS,
            status,
            created_at: NOW - HOUR_MS,
        }
    }

    #[test]
    fn confirmed_far_ahead_is_deletable() {
        assert!(can_delete(&starting_in(30 * HOUR_MS, BookingStatus::Confirmed), NOW));
        assert!(can_delete(&starting_in(DELETE_NOTICE_MS + MINUTE_MS, BookingStatus::Confirmed), NOW));
    }

    #[test]
    fn confirmed_within_a_day_is_blocked() {
        let err = check_deletable(&starting_in(20 * HOUR_MS, BookingStatus::Confirmed), NOW).unwrap_err();
        assert_eq!(err, DeleteBlocked::TooCloseToStart { hours_until_start: 20 });
        assert!(err.to_string().contains("less than 24 hours"));

        // now >= start - 24h is already inside the window.
        assert_eq!(
            check_deletable(&starting_in(DELETE_NOTICE_MS, BookingStatus::Confirmed), NOW),
            Err(DeleteBlocked::TooCloseToStart { hours_until_start: 24 })
        );
        assert_eq!(
            check_deletable(&starting_in(DELETE_NOTICE_MS - MINUTE_MS, BookingStatus::Confirmed), NOW),
            Err(DeleteBlocked::TooCloseToStart { hours_until_start: 23 })
        );
    }

    #[test]
    fn confirmed_already_started_is_blocked() {
        for delta in [0, -HOUR_MS] {
            let err = check_deletable(&starting_in(delta, BookingStatus::Confirmed), NOW).unwrap_err();
            assert_eq!(err, DeleteBlocked::AlreadyStarted);
            assert!(err.to_string().contains("already started"));
        }
    }

    #[test]
    fn unconfirmed_bookings_have_no_time_restriction() {
        for status in [BookingStatus::Pending, BookingStatus::Cancelled, BookingStatus::Rejected] {
            assert!(can_delete(&starting_in(20 * HOUR_MS, status), NOW));
            assert!(can_delete(&starting_in(-HOUR_MS, status), NOW));
        }
    }
}
