use super::*;
use crate::calendar;
use chrono::{Days, NaiveDate};

const H: Ms = HOUR_MS;

fn utc() -> FixedOffset {
    FixedOffset::east_opt(0).unwrap()
}

fn test_wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("roombook_test_engine");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}

/// Monday.
fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2030, 1, 7).unwrap()
}

fn day(n: u64) -> NaiveDate {
    today().checked_add_days(Days::new(n)).unwrap()
}

/// 08:00 on `today()`.
fn now() -> Ms {
    at(0, "08:00")
}

fn at(n: u64, hhmm: &str) -> Ms {
    let t: ClockTime = hhmm.parse().unwrap();
    calendar::local_instant(day(n), t.minutes(), utc())
}

fn t(s: &str) -> ClockTime {
    s.parse().unwrap()
}

fn request(room_id: Ulid, user_id: Ulid, start: Ms, end: Ms) -> BookingRequest {
    BookingRequest {
        room_id,
        user_id,
        title: Some("Sprint review".into()),
        start_time: start,
        end_time: end,
    }
}

fn blackout(room_id: Ulid, start: Ms, end: Ms) -> RoomBlackout {
    RoomBlackout {
        id: Ulid::new(),
        room_id,
        title: "HVAC service".into(),
        description: Some("Vents open, room unusable".into()),
        start_time: start,
        end_time: end,
        blackout_type: BlackoutType::Maintenance,
        is_recurring: false,
        is_active: true,
    }
}

/// Engine with one room open 09:00–17:00 every day.
async fn engine_with_room(wal: &str) -> (Engine, Ulid) {
    let engine = Engine::new(test_wal_path(wal), utc()).unwrap();
    let room = Ulid::new();
    engine.create_room(room, Some("Aurora".into())).await.unwrap();
    let mut cfg = engine.get_availability(room).await.unwrap();
    cfg.operating_hours = OperatingHours::every_day(DayHours::open(t("09:00"), t("17:00")));
    engine.set_availability(room, cfg).await.unwrap();
    (engine, room)
}

// ── Rooms and rules ──────────────────────────────────────

#[tokio::test]
async fn new_room_gets_default_rules() {
    let engine = Engine::new(test_wal_path("defaults.wal"), utc()).unwrap();
    let room = Ulid::new();
    engine.create_room(room, None).await.unwrap();

    let cfg = engine.get_availability(room).await.unwrap();
    assert_eq!(cfg, RoomAvailability::with_defaults(room));
    assert!(cfg.operating_hours.monday.enabled);
    assert!(!cfg.operating_hours.sunday.enabled);

    assert!(matches!(
        engine.create_room(room, None).await,
        Err(EngineError::AlreadyExists(id)) if id == room
    ));
}

#[tokio::test]
async fn rename_and_list_rooms() {
    let engine = Engine::new(test_wal_path("rename.wal"), utc()).unwrap();
    let a = Ulid::new();
    let b = Ulid::new();
    engine.create_room(a, Some("Small".into())).await.unwrap();
    engine.create_room(b, None).await.unwrap();
    engine.update_room(b, Some("Large".into())).await.unwrap();

    let rooms = engine.list_rooms().await;
    assert_eq!(rooms.len(), 2);
    let large = rooms.iter().find(|r| r.id == b).unwrap();
    assert_eq!(large.name.as_deref(), Some("Large"));

    assert!(matches!(
        engine.update_room(Ulid::new(), None).await,
        Err(EngineError::NotFound(_))
    ));
}

#[tokio::test]
async fn invalid_rules_are_rejected_not_clamped() {
    let (engine, room) = engine_with_room("invalid_rules.wal").await;
    let before = engine.get_availability(room).await.unwrap();

    let mut cfg = before.clone();
    cfg.min_booking_duration = 240;
    cfg.max_booking_duration = 60;
    assert!(matches!(
        engine.set_availability(room, cfg).await,
        Err(EngineError::InvalidConfig(_))
    ));

    let mut cfg = before.clone();
    cfg.operating_hours.friday = DayHours::open(t("17:00"), t("09:00"));
    assert!(matches!(
        engine.set_availability(room, cfg).await,
        Err(EngineError::InvalidConfig(_))
    ));

    assert_eq!(engine.get_availability(room).await.unwrap(), before);
}

// ── Slots through the engine ─────────────────────────────

#[tokio::test]
async fn slots_for_unknown_room_report_error() {
    let engine = Engine::new(test_wal_path("slots_unknown.wal"), utc()).unwrap();
    let result = engine.slots(Ulid::new(), day(1), now()).await;
    assert!(result.error.unwrap().contains("not found"));
    assert!(result.start_options.is_empty());
    assert_eq!(result.date, "2030-01-08");
}

#[tokio::test]
async fn booking_shrinks_slots() {
    let (engine, room) = engine_with_room("slots_shrink.wal").await;
    let before = engine.slots(room, day(1), now()).await;
    assert_eq!(before.start_options.len(), 16);

    engine
        .create_booking(Ulid::new(), request(room, Ulid::new(), at(1, "10:00"), at(1, "11:00")), now())
        .await
        .unwrap();

    let after = engine.slots(room, day(1), now()).await;
    assert_eq!(after.start_options.len(), 14);
    assert_eq!(
        after.unavailable_reasons[&t("10:30")],
        Some(ReasonCode::ExistingBooking)
    );
    assert_eq!(after.ends_for(t("09:00")), &[t("09:30"), t("10:00")]);
}

// ── Blackouts ────────────────────────────────────────────

#[tokio::test]
async fn blackout_lifecycle() {
    let (engine, room) = engine_with_room("blackout_lifecycle.wal").await;
    let mut b = blackout(room, at(1, "12:00"), at(1, "14:00"));
    engine.create_blackout(b.clone()).await.unwrap();

    let slots = engine.slots(room, day(1), now()).await;
    assert_eq!(slots.unavailable_reasons[&t("12:00")], Some(ReasonCode::Blackout));
    assert_eq!(slots.unavailable_reasons[&t("13:30")], Some(ReasonCode::Blackout));

    // Soft delete via update.
    b.is_active = false;
    engine.update_blackout(b.clone()).await.unwrap();
    assert!(engine.list_blackouts(room, false).await.unwrap().is_empty());
    assert_eq!(engine.list_blackouts(room, true).await.unwrap().len(), 1);
    assert_eq!(engine.slots(room, day(1), now()).await.start_options.len(), 16);

    assert_eq!(engine.delete_blackout(b.id).await.unwrap(), room);
    assert!(engine.list_blackouts(room, true).await.unwrap().is_empty());
    assert!(matches!(
        engine.delete_blackout(b.id).await,
        Err(EngineError::NotFound(_))
    ));
}

#[tokio::test]
async fn overlapping_blackouts_are_kept() {
    let (engine, room) = engine_with_room("blackout_overlap.wal").await;
    engine.create_blackout(blackout(room, at(1, "09:00"), at(1, "12:00"))).await.unwrap();
    engine.create_blackout(blackout(room, at(1, "11:00"), at(1, "13:00"))).await.unwrap();
    assert_eq!(engine.list_blackouts(room, false).await.unwrap().len(), 2);

    let slots = engine.slots(room, day(1), now()).await;
    assert_eq!(slots.start_options.first(), Some(&t("13:00")));
}

#[tokio::test]
async fn blackout_validation_and_room_binding() {
    let (engine, room) = engine_with_room("blackout_validation.wal").await;
    let inverted = blackout(room, at(1, "14:00"), at(1, "12:00"));
    assert!(matches!(
        engine.create_blackout(inverted).await,
        Err(EngineError::InvalidBlackout(_))
    ));
    assert!(matches!(
        engine.create_blackout(blackout(Ulid::new(), at(1, "12:00"), at(1, "13:00"))).await,
        Err(EngineError::NotFound(_))
    ));

    // Updates keep the blackout in its room.
    let b = blackout(room, at(1, "12:00"), at(1, "13:00"));
    engine.create_blackout(b.clone()).await.unwrap();
    let mut moved = b.clone();
    moved.room_id = Ulid::new();
    moved.title = "Renamed".into();
    let updated = engine.update_blackout(moved).await.unwrap();
    assert_eq!(updated.room_id, room);
    assert_eq!(engine.get_blackout(b.id).await.unwrap().title, "Renamed");

    // A booking id is not a blackout.
    let booking = engine
        .create_booking(Ulid::new(), request(room, Ulid::new(), at(2, "10:00"), at(2, "11:00")), now())
        .await
        .unwrap();
    assert!(matches!(
        engine.delete_blackout(booking.id).await,
        Err(EngineError::NotFound(_))
    ));
}

// ── Bookings ─────────────────────────────────────────────

#[tokio::test]
async fn booking_lifecycle() {
    let (engine, room) = engine_with_room("booking_lifecycle.wal").await;
    let user = Ulid::new();
    let id = Ulid::new();

    let booking = engine
        .create_booking(id, request(room, user, at(1, "10:00"), at(1, "11:30")), now())
        .await
        .unwrap();
    assert_eq!(booking.status, BookingStatus::Pending);
    assert_eq!(booking.created_at, now());
    assert_eq!(engine.get_booking(id).await.unwrap(), booking);
    assert_eq!(engine.list_bookings(room).await.unwrap(), vec![booking]);

    let confirmed = engine.set_booking_status(id, BookingStatus::Confirmed).await.unwrap();
    assert_eq!(confirmed.status, BookingStatus::Confirmed);

    assert!(matches!(
        engine.set_booking_status(id, BookingStatus::Pending).await,
        Err(EngineError::InvalidTransition {
            from: BookingStatus::Confirmed,
            to: BookingStatus::Pending
        })
    ));

    engine.set_booking_status(id, BookingStatus::Cancelled).await.unwrap();
    assert!(matches!(
        engine.set_booking_status(id, BookingStatus::Confirmed).await,
        Err(EngineError::InvalidTransition { .. })
    ));
}

#[tokio::test]
async fn rejection_carries_kind_and_detail() {
    let (engine, room) = engine_with_room("rejections.wal").await;
    let mut cfg = engine.get_availability(room).await.unwrap();
    cfg.max_booking_duration = 120;
    cfg.advance_booking_days = 7;
    engine.set_availability(room, cfg).await.unwrap();

    let err = engine
        .create_booking(Ulid::new(), request(room, Ulid::new(), at(1, "09:00"), at(1, "12:00")), now())
        .await
        .unwrap_err();
    match err {
        EngineError::Rejected(r) => {
            assert_eq!(r.kind, ViolationKind::EndUnavailable);
            assert_eq!(r.detail, Some(ReasonCode::MaxDuration));
        }
        other => panic!("expected rejection, got {other:?}"),
    }

    let err = engine
        .create_booking(Ulid::new(), request(room, Ulid::new(), at(8, "10:00"), at(8, "11:00")), now())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Rejected(r) if r.kind == ViolationKind::DateOutOfRange));

    let err = engine
        .create_booking(Ulid::new(), request(room, Ulid::new(), at(1, "11:00"), at(1, "10:00")), now())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Rejected(r) if r.kind == ViolationKind::EndUnavailable));

    // The date window is checked before the end, even for an inverted range.
    let err = engine
        .create_booking(Ulid::new(), request(room, Ulid::new(), at(13, "11:00"), at(13, "10:00")), now())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Rejected(r) if r.kind == ViolationKind::DateOutOfRange));

    assert!(engine.list_bookings(room).await.unwrap().is_empty());
}

#[tokio::test]
async fn daily_cap_counts_only_occupying_bookings() {
    let (engine, room) = engine_with_room("daily_cap.wal").await;
    let mut cfg = engine.get_availability(room).await.unwrap();
    cfg.max_bookings_per_user_per_day = 1;
    engine.set_availability(room, cfg).await.unwrap();

    let user = Ulid::new();
    let first = engine
        .create_booking(Ulid::new(), request(room, user, at(0, "14:00"), at(0, "15:00")), now())
        .await
        .unwrap();

    let err = engine
        .create_booking(Ulid::new(), request(room, user, at(0, "10:00"), at(0, "11:00")), now())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Rejected(r) if r.kind == ViolationKind::DailyLimitExceeded));

    engine.set_booking_status(first.id, BookingStatus::Cancelled).await.unwrap();
    engine
        .create_booking(Ulid::new(), request(room, user, at(0, "10:00"), at(0, "11:00")), now())
        .await
        .unwrap();
}

#[tokio::test]
async fn cancelled_booking_frees_slot() {
    let (engine, room) = engine_with_room("cancel_frees.wal").await;
    let first = engine
        .create_booking(Ulid::new(), request(room, Ulid::new(), at(1, "10:00"), at(1, "11:00")), now())
        .await
        .unwrap();
    assert!(
        engine
            .create_booking(Ulid::new(), request(room, Ulid::new(), at(1, "10:00"), at(1, "11:00")), now())
            .await
            .is_err()
    );
    engine.set_booking_status(first.id, BookingStatus::Rejected).await.unwrap();
    engine
        .create_booking(Ulid::new(), request(room, Ulid::new(), at(1, "10:00"), at(1, "11:00")), now())
        .await
        .unwrap();
}

#[tokio::test]
async fn dry_run_validation() {
    let (engine, room) = engine_with_room("dry_run.wal").await;
    let user = Ulid::new();
    assert_eq!(
        engine.validate(room, user, day(1), t("10:00"), t("11:00"), now()).await.unwrap(),
        Ok(())
    );
    let verdict = engine
        .validate(room, user, day(1), t("08:00"), t("09:00"), now())
        .await
        .unwrap();
    assert_eq!(verdict.unwrap_err().kind, ViolationKind::StartUnavailable);
    assert!(engine.list_bookings(room).await.unwrap().is_empty());
    assert!(matches!(
        engine.validate(Ulid::new(), user, day(1), t("10:00"), t("11:00"), now()).await,
        Err(EngineError::NotFound(_))
    ));
}

#[tokio::test]
async fn delete_guard_applies_to_confirmed_only() {
    let (engine, room) = engine_with_room("delete_guard.wal").await;
    let pending = engine
        .create_booking(Ulid::new(), request(room, Ulid::new(), at(1, "10:00"), at(1, "11:00")), now())
        .await
        .unwrap();
    let confirmed = engine
        .create_booking(Ulid::new(), request(room, Ulid::new(), at(1, "13:00"), at(1, "14:00")), now())
        .await
        .unwrap();
    engine.set_booking_status(confirmed.id, BookingStatus::Confirmed).await.unwrap();

    // 20 hours before the confirmed start.
    let late = confirmed.start_time - 20 * H;
    let err = engine.delete_booking(confirmed.id, late).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::DeleteBlocked(DeleteBlocked::TooCloseToStart { hours_until_start: 20 })
    ));
    assert!(err.to_string().contains("less than 24 hours"));

    let err = engine
        .delete_booking(confirmed.id, confirmed.start_time + H)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::DeleteBlocked(DeleteBlocked::AlreadyStarted)));

    engine.delete_booking(pending.id, late).await.unwrap();
    assert!(matches!(
        engine.get_booking(pending.id).await,
        Err(EngineError::NotFound(_))
    ));

    engine.delete_booking(confirmed.id, now()).await.unwrap();
    assert!(engine.list_bookings(room).await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_for_one_slot_book_once() {
    let (engine, room) = engine_with_room("race.wal").await;
    let engine = Arc::new(engine);

    let mut handles = Vec::new();
    for _ in 0..16 {
        let eng = engine.clone();
        handles.push(tokio::spawn(async move {
            eng.create_booking(
                Ulid::new(),
                request(room, Ulid::new(), at(2, "10:00"), at(2, "11:00")),
                now(),
            )
            .await
        }));
    }

    let mut won = 0;
    for h in handles {
        match h.await.unwrap() {
            Ok(_) => won += 1,
            Err(EngineError::Rejected(r)) | Err(EngineError::SlotTaken(r)) => {
                assert_eq!(r.kind, ViolationKind::StartUnavailable);
                assert_eq!(r.detail, Some(ReasonCode::ExistingBooking));
            }
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(won, 1);
    assert_eq!(engine.list_bookings(room).await.unwrap().len(), 1);
}

#[tokio::test]
async fn slot_filled_after_advisory_check_is_slot_taken() {
    let (engine, room) = engine_with_room("slot_taken.wal").await;
    let rs = engine.get_room(&room).unwrap();
    let slot = request(room, Ulid::new(), at(2, "10:00"), at(2, "11:00"));

    // Another booking lands between the advisory check and the commit.
    engine
        .create_booking(Ulid::new(), request(room, Ulid::new(), at(2, "10:00"), at(2, "11:00")), now())
        .await
        .unwrap();
    let err = engine
        .commit_booking(&rs, Ulid::new(), slot.clone(), now())
        .await
        .unwrap_err();
    match err {
        EngineError::SlotTaken(r) => {
            assert_eq!(r.kind, ViolationKind::StartUnavailable);
            assert_eq!(r.detail, Some(ReasonCode::ExistingBooking));
        }
        other => panic!("expected SlotTaken, got {other:?}"),
    }

    // Seen by the advisory check, the same request is a plain rejection.
    let err = engine.create_booking(Ulid::new(), slot, now()).await.unwrap_err();
    assert!(matches!(err, EngineError::Rejected(r) if r.kind == ViolationKind::StartUnavailable));
    assert_eq!(engine.list_bookings(room).await.unwrap().len(), 1);
}

#[tokio::test]
async fn cap_reached_after_advisory_check_stays_rejected() {
    let (engine, room) = engine_with_room("cap_race.wal").await;
    let mut cfg = engine.get_availability(room).await.unwrap();
    cfg.max_bookings_per_user_per_day = 1;
    engine.set_availability(room, cfg).await.unwrap();
    let rs = engine.get_room(&room).unwrap();

    let user = Ulid::new();
    engine
        .create_booking(Ulid::new(), request(room, user, at(1, "10:00"), at(1, "11:00")), now())
        .await
        .unwrap();
    let err = engine
        .commit_booking(&rs, Ulid::new(), request(room, user, at(1, "13:00"), at(1, "14:00")), now())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Rejected(r) if r.kind == ViolationKind::DailyLimitExceeded));
}

#[tokio::test]
async fn writes_queued_behind_room_delete_are_not_found() {
    let (engine, room) = engine_with_room("orphan_writes.wal").await;
    let engine = Arc::new(engine);
    let booking = engine
        .create_booking(Ulid::new(), request(room, Ulid::new(), at(1, "10:00"), at(1, "11:00")), now())
        .await
        .unwrap();
    let rules = engine.get_availability(room).await.unwrap();
    let b = blackout(room, at(1, "12:00"), at(1, "13:00"));

    let rs = engine.get_room(&room).unwrap();
    let held = rs.write().await;
    let blackout_task = {
        let eng = engine.clone();
        let b = b.clone();
        tokio::spawn(async move { eng.create_blackout(b).await })
    };
    let status_task = {
        let eng = engine.clone();
        tokio::spawn(async move { eng.set_booking_status(booking.id, BookingStatus::Confirmed).await })
    };
    let rules_task = {
        let eng = engine.clone();
        tokio::spawn(async move { eng.set_availability(room, rules).await })
    };
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }

    // Unregister the room as delete_room does while the writers wait on its lock.
    engine.state.remove(&room);
    forget_room_entities(&held, &engine.entity_to_room);
    drop(held);

    assert!(matches!(blackout_task.await.unwrap(), Err(EngineError::NotFound(_))));
    assert!(matches!(status_task.await.unwrap(), Err(EngineError::NotFound(_))));
    assert!(matches!(rules_task.await.unwrap(), Err(EngineError::NotFound(_))));
    assert!(engine.get_room_for_entity(&b.id).is_none());
    assert_eq!(rs.read().await.blackouts.len(), 0);
}

#[tokio::test]
async fn delete_room_drops_everything() {
    let (engine, room) = engine_with_room("delete_room.wal").await;
    let b = blackout(room, at(1, "12:00"), at(1, "13:00"));
    engine.create_blackout(b.clone()).await.unwrap();
    let booking = engine
        .create_booking(Ulid::new(), request(room, Ulid::new(), at(1, "10:00"), at(1, "11:00")), now())
        .await
        .unwrap();

    engine.delete_room(room).await.unwrap();
    assert!(engine.list_rooms().await.is_empty());
    assert!(matches!(engine.get_booking(booking.id).await, Err(EngineError::NotFound(_))));
    assert!(matches!(engine.get_blackout(b.id).await, Err(EngineError::NotFound(_))));
    assert!(engine.slots(room, day(1), now()).await.error.is_some());
    assert!(matches!(engine.delete_room(room).await, Err(EngineError::NotFound(_))));
}

// ── WAL replay and compaction ────────────────────────────

#[tokio::test]
async fn state_survives_restart() {
    let path = test_wal_path("restart.wal");
    let room = Ulid::new();
    let gone = Ulid::new();
    let b = blackout(room, at(3, "09:00"), at(3, "12:00"));
    let booking_id = Ulid::new();
    let cfg;

    {
        let engine = Engine::new(path.clone(), utc()).unwrap();
        engine.create_room(room, Some("Fjord".into())).await.unwrap();
        engine.create_room(gone, None).await.unwrap();
        let mut rules = engine.get_availability(room).await.unwrap();
        rules.buffer_time = 30;
        rules.operating_hours.saturday = DayHours::open(t("10:00"), t("14:00"));
        engine.set_availability(room, rules.clone()).await.unwrap();
        cfg = rules;

        engine.create_blackout(b.clone()).await.unwrap();
        engine
            .create_booking(booking_id, request(room, Ulid::new(), at(1, "10:00"), at(1, "11:00")), now())
            .await
            .unwrap();
        engine
            .set_booking_status(booking_id, BookingStatus::Confirmed)
            .await
            .unwrap();
        engine.delete_room(gone).await.unwrap();
    }

    let engine = Engine::new(path, utc()).unwrap();
    let rooms = engine.list_rooms().await;
    assert_eq!(rooms.len(), 1);
    assert_eq!(rooms[0].name.as_deref(), Some("Fjord"));
    assert_eq!(engine.get_availability(room).await.unwrap(), cfg);
    assert_eq!(engine.list_blackouts(room, false).await.unwrap(), vec![b]);
    assert_eq!(
        engine.get_booking(booking_id).await.unwrap().status,
        BookingStatus::Confirmed
    );
    let slots = engine.slots(room, day(1), now()).await;
    assert_eq!(slots.unavailable_reasons[&t("11:00")], Some(ReasonCode::Buffer));
}

#[tokio::test]
async fn compact_wal_preserves_state() {
    let path = test_wal_path("compact_state.wal");
    let room = Ulid::new();
    let kept = Ulid::new();

    {
        let engine = Engine::new(path.clone(), utc()).unwrap();
        engine.create_room(room, Some("Loft".into())).await.unwrap();
        let mut cfg = engine.get_availability(room).await.unwrap();
        cfg.operating_hours = OperatingHours::every_day(DayHours::open(t("09:00"), t("17:00")));
        engine.set_availability(room, cfg).await.unwrap();

        // Churn: bookings that come and go.
        for _ in 0..10 {
            let tmp = Ulid::new();
            engine
                .create_booking(tmp, request(room, Ulid::new(), at(1, "09:00"), at(1, "10:00")), now())
                .await
                .unwrap();
            engine.delete_booking(tmp, now()).await.unwrap();
        }
        engine
            .create_booking(kept, request(room, Ulid::new(), at(1, "14:00"), at(1, "15:00")), now())
            .await
            .unwrap();
        engine.set_booking_status(kept, BookingStatus::Confirmed).await.unwrap();

        let slots_before = engine.slots(room, day(1), now()).await;
        let size_before = std::fs::metadata(&path).unwrap().len();
        assert!(engine.wal_appends_since_compact().await > 0);

        let written = engine.compact_wal().await.unwrap();
        assert_eq!(written, 3); // room, rules, booking

        let size_after = std::fs::metadata(&path).unwrap().len();
        assert!(size_after < size_before, "compacted WAL ({size_after}) should be smaller than {size_before}");
        assert_eq!(engine.wal_appends_since_compact().await, 0);
        assert_eq!(engine.slots(room, day(1), now()).await, slots_before);

        // Appends after compaction land in the new file.
        engine.update_room(room, Some("Loft 2".into())).await.unwrap();
    }

    let engine = Engine::new(path, utc()).unwrap();
    assert_eq!(engine.list_rooms().await[0].name.as_deref(), Some("Loft 2"));
    let booking = engine.get_booking(kept).await.unwrap();
    assert_eq!(booking.status, BookingStatus::Confirmed);
    assert_eq!(engine.list_bookings(room).await.unwrap().len(), 1);
}

#[tokio::test]
async fn group_commit_batches_appends() {
    let path = test_wal_path("group_commit_batch.wal");
    let engine = Arc::new(Engine::new(path.clone(), utc()).unwrap());

    let n = 20;
    let mut handles = Vec::new();
    for i in 0..n {
        let eng = engine.clone();
        handles.push(tokio::spawn(async move {
            eng.create_room(Ulid::new(), Some(format!("Room {i}"))).await
        }));
    }
    for h in handles {
        h.await.unwrap().unwrap();
    }
    assert_eq!(engine.list_rooms().await.len(), n);
    assert_eq!(engine.wal_appends_since_compact().await, n as u64);

    let engine2 = Engine::new(path, utc()).unwrap();
    assert_eq!(engine2.list_rooms().await.len(), n);
}

// ── Limits ───────────────────────────────────────────────

#[tokio::test]
async fn oversized_fields_rejected() {
    let (engine, room) = engine_with_room("limits.wal").await;
    let long = "x".repeat(crate::limits::MAX_NAME_LEN + 1);
    assert!(matches!(
        engine.create_room(Ulid::new(), Some(long.clone())).await,
        Err(EngineError::LimitExceeded(_))
    ));

    let mut req = request(room, Ulid::new(), at(1, "10:00"), at(1, "11:00"));
    req.title = Some(long);
    assert!(matches!(
        engine.create_booking(Ulid::new(), req, now()).await,
        Err(EngineError::LimitExceeded(_))
    ));

    let ancient = request(room, Ulid::new(), 1_000, 2_000);
    assert!(matches!(
        engine.create_booking(Ulid::new(), ancient, now()).await,
        Err(EngineError::LimitExceeded(_))
    ));
}
