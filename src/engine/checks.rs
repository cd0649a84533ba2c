use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::slots::SLOT_MINUTES;
use super::EngineError;

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or(0)
}

pub(crate) fn validate_timestamps(start: Ms, end: Ms) -> Result<(), EngineError> {
    if start < MIN_VALID_TIMESTAMP_MS || end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    Ok(())
}

pub(crate) fn validate_name(name: Option<&str>) -> Result<(), EngineError> {
    if name.is_some_and(|n| n.len() > MAX_NAME_LEN) {
        return Err(EngineError::LimitExceeded("room name too long"));
    }
    Ok(())
}

pub(crate) fn validate_title(title: Option<&str>) -> Result<(), EngineError> {
    if title.is_some_and(|t| t.len() > MAX_TITLE_LEN) {
        return Err(EngineError::LimitExceeded("title too long"));
    }
    Ok(())
}

/// Reject rule sets that break the room invariants. Nothing is clamped.
pub(crate) fn validate_availability(room_id: Ulid, cfg: &RoomAvailability) -> Result<(), EngineError> {
    let invalid = |msg: String| -> Result<(), EngineError> { Err(EngineError::InvalidConfig(msg)) };

    if cfg.room_id != room_id {
        return invalid(format!("room_id {} does not match room {room_id}", cfg.room_id));
    }
    for (day, hours) in cfg.operating_hours.days() {
        if hours.enabled && hours.start >= hours.end {
            return invalid(format!(
                "{}: opening time {} must be before closing time {}",
                weekday_name(day),
                hours.start,
                hours.end
            ));
        }
    }
    let (min, max) = (cfg.min_booking_duration, cfg.max_booking_duration);
    if min == 0 || max == 0 {
        return invalid("booking durations must be positive".into());
    }
    if min > max {
        return invalid(format!(
            "min_booking_duration {min} exceeds max_booking_duration {max}"
        ));
    }
    if min % SLOT_MINUTES != 0 || max % SLOT_MINUTES != 0 {
        return invalid(format!(
            "booking durations must be multiples of {SLOT_MINUTES} minutes"
        ));
    }
    if cfg.buffer_time > MAX_BUFFER_MINUTES {
        return invalid(format!("buffer_time may not exceed {MAX_BUFFER_MINUTES} minutes"));
    }
    if cfg.advance_booking_days > MAX_ADVANCE_BOOKING_DAYS {
        return invalid(format!(
            "advance_booking_days may not exceed {MAX_ADVANCE_BOOKING_DAYS}"
        ));
    }
    if cfg.max_bookings_per_user_per_day == 0 || cfg.max_bookings_per_user_per_week == 0 {
        return invalid("per-user booking caps must be at least 1".into());
    }
    Ok(())
}

pub(crate) fn validate_blackout(blackout: &RoomBlackout) -> Result<(), EngineError> {
    if blackout.start_time >= blackout.end_time {
        return Err(EngineError::InvalidBlackout(
            "start_time must be before end_time".into(),
        ));
    }
    if blackout.title.trim().is_empty() {
        return Err(EngineError::InvalidBlackout("title is required".into()));
    }
    if blackout.title.len() > MAX_TITLE_LEN {
        return Err(EngineError::LimitExceeded("title too long"));
    }
    if blackout
        .description
        .as_ref()
        .is_some_and(|d| d.len() > MAX_DESCRIPTION_LEN)
    {
        return Err(EngineError::LimitExceeded("description too long"));
    }
    let span = blackout.span();
    validate_timestamps(span.start, span.end)?;
    if span.duration_ms() > MAX_BLACKOUT_DURATION_MS {
        return Err(EngineError::LimitExceeded("blackout too long"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> (Ulid, RoomAvailability) {
        let id = Ulid::new();
        (id, RoomAvailability::with_defaults(id))
    }

    fn config_error(room_id: Ulid, cfg: &RoomAvailability) -> String {
        match validate_availability(room_id, cfg) {
            Err(EngineError::InvalidConfig(msg)) => msg,
            other => panic!("expected InvalidConfig, got {other:?}"),
        }
    }

    #[test]
    fn defaults_are_valid() {
        let (id, cfg) = defaults();
        assert!(validate_availability(id, &cfg).is_ok());
    }

    #[test]
    fn inverted_hours_rejected_only_when_enabled() {
        let (id, mut cfg) = defaults();
        cfg.operating_hours.saturday.start = ClockTime::from_hm(18, 0);
        cfg.operating_hours.saturday.end = ClockTime::from_hm(9, 0);
        assert!(validate_availability(id, &cfg).is_ok());

        cfg.operating_hours.saturday.enabled = true;
        assert!(config_error(id, &cfg).starts_with("saturday"));
    }

    #[test]
    fn duration_rules() {
        let (id, mut cfg) = defaults();
        cfg.min_booking_duration = 120;
        cfg.max_booking_duration = 60;
        assert!(config_error(id, &cfg).contains("exceeds"));

        cfg.min_booking_duration = 45;
        cfg.max_booking_duration = 90;
        assert!(config_error(id, &cfg).contains("multiples"));

        cfg.min_booking_duration = 0;
        assert!(config_error(id, &cfg).contains("positive"));
    }

    #[test]
    fn caps_and_room_id() {
        let (id, mut cfg) = defaults();
        cfg.max_bookings_per_user_per_week = 0;
        assert!(config_error(id, &cfg).contains("caps"));

        let (_, cfg) = defaults();
        assert!(config_error(id, &cfg).contains("does not match"));
    }

    #[test]
    fn blackout_checks() {
        let mut b = RoomBlackout {
            id: Ulid::new(),
            room_id: Ulid::new(),
            title: "Annual inspection".into(),
            description: None,
            start_time: MIN_VALID_TIMESTAMP_MS + DAY_MS,
            end_time: MIN_VALID_TIMESTAMP_MS + 2 * DAY_MS,
            blackout_type: BlackoutType::Maintenance,
            is_recurring: false,
            is_active: true,
        };
        assert!(validate_blackout(&b).is_ok());

        b.title = "  ".into();
        assert!(matches!(validate_blackout(&b), Err(EngineError::InvalidBlackout(_))));

        b.title = "Inspection".into();
        b.end_time = b.start_time;
        assert!(matches!(validate_blackout(&b), Err(EngineError::InvalidBlackout(_))));

        b.end_time = b.start_time + 400 * DAY_MS;
        assert!(matches!(validate_blackout(&b), Err(EngineError::LimitExceeded(_))));
    }
}
