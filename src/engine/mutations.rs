use std::sync::Arc;

use tokio::sync::{oneshot, RwLock};
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::checks::{validate_availability, validate_blackout, validate_name, validate_timestamps, validate_title};
use super::guard::check_deletable;
use super::validate::{validate_booking, Rejection, ViolationKind};
use super::{forget_room_entities, Engine, EngineError, SharedRoomState, WalCommand};

impl Engine {
    pub async fn create_room(&self, id: Ulid, name: Option<String>) -> Result<(), EngineError> {
        validate_name(name.as_deref())?;
        let _gate = self.commit_gate.read().await;
        if self.state.len() >= MAX_ROOMS {
            return Err(EngineError::LimitExceeded("too many rooms"));
        }
        if self.state.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let event = Event::RoomCreated { id, name: name.clone() };
        self.wal_append(&event).await?;
        self.state
            .insert(id, Arc::new(RwLock::new(RoomState::new(id, name))));
        metrics::gauge!(observability::ROOMS_ACTIVE).set(self.state.len() as f64);
        info!("created room {id}");
        Ok(())
    }

    pub async fn update_room(&self, id: Ulid, name: Option<String>) -> Result<(), EngineError> {
        validate_name(name.as_deref())?;
        let _gate = self.commit_gate.read().await;
        let rs = self.get_room(&id).ok_or(EngineError::NotFound(id))?;
        let mut guard = rs.write().await;
        if !self.is_live(&id, &rs) {
            return Err(EngineError::NotFound(id));
        }
        let event = Event::RoomUpdated { id, name };
        self.persist_and_apply(&mut guard, &event).await
    }

    /// Drops the room together with its rules, blackouts and bookings.
    pub async fn delete_room(&self, id: Ulid) -> Result<(), EngineError> {
        let _gate = self.commit_gate.read().await;
        let rs = self.get_room(&id).ok_or(EngineError::NotFound(id))?;
        let guard = rs.write().await;
        if !self.is_live(&id, &rs) {
            return Err(EngineError::NotFound(id));
        }

        let event = Event::RoomDeleted { id };
        self.wal_append(&event).await?;
        forget_room_entities(&guard, &self.entity_to_room);
        self.state.remove(&id);
        metrics::gauge!(observability::ROOMS_ACTIVE).set(self.state.len() as f64);
        info!(
            "deleted room {id} with {} bookings and {} blackouts",
            guard.bookings.len(),
            guard.blackouts.len()
        );
        Ok(())
    }

    pub async fn set_availability(
        &self,
        room_id: Ulid,
        availability: RoomAvailability,
    ) -> Result<(), EngineError> {
        validate_availability(room_id, &availability)?;
        let _gate = self.commit_gate.read().await;
        let rs = self.get_room(&room_id).ok_or(EngineError::NotFound(room_id))?;
        let mut guard = rs.write().await;
        if !self.is_live(&room_id, &rs) {
            return Err(EngineError::NotFound(room_id));
        }
        let event = Event::AvailabilitySet { availability };
        self.persist_and_apply(&mut guard, &event).await
    }

    pub async fn create_blackout(&self, blackout: RoomBlackout) -> Result<(), EngineError> {
        validate_blackout(&blackout)?;
        let _gate = self.commit_gate.read().await;
        let room_id = blackout.room_id;
        let rs = self.get_room(&room_id).ok_or(EngineError::NotFound(room_id))?;
        let mut guard = rs.write().await;
        if !self.is_live(&room_id, &rs) {
            return Err(EngineError::NotFound(room_id));
        }
        if guard.blackouts.len() >= MAX_BLACKOUTS_PER_ROOM {
            return Err(EngineError::LimitExceeded("too many blackouts on room"));
        }
        if self.entity_to_room.contains_key(&blackout.id) {
            return Err(EngineError::AlreadyExists(blackout.id));
        }

        let event = Event::BlackoutCreated { blackout };
        self.persist_and_apply(&mut guard, &event).await
    }

    /// Replace a blackout's fields. A blackout never moves between rooms.
    pub async fn update_blackout(&self, mut blackout: RoomBlackout) -> Result<RoomBlackout, EngineError> {
        validate_blackout(&blackout)?;
        let _gate = self.commit_gate.read().await;
        let (room_id, mut guard) = self.resolve_entity_write(&blackout.id).await?;
        if !guard.blackouts.iter().any(|b| b.id == blackout.id) {
            return Err(EngineError::NotFound(blackout.id));
        }
        blackout.room_id = room_id;

        let event = Event::BlackoutUpdated {
            blackout: blackout.clone(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(blackout)
    }

    pub async fn delete_blackout(&self, id: Ulid) -> Result<Ulid, EngineError> {
        let _gate = self.commit_gate.read().await;
        let (room_id, mut guard) = self.resolve_entity_write(&id).await?;
        if !guard.blackouts.iter().any(|b| b.id == id) {
            return Err(EngineError::NotFound(id));
        }
        let event = Event::BlackoutDeleted { id, room_id };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(room_id)
    }

    /// Validate and insert a pending booking.
    ///
    /// The first validation runs under the read lock and is advisory. The
    /// second runs under the write lock in `commit_booking`.
    pub async fn create_booking(
        &self,
        id: Ulid,
        request: BookingRequest,
        now: Ms,
    ) -> Result<Booking, EngineError> {
        validate_title(request.title.as_deref())?;
        validate_timestamps(request.start_time, request.end_time)?;

        let _gate = self.commit_gate.read().await;
        let room_id = request.room_id;
        let rs = self.get_room(&room_id).ok_or(EngineError::NotFound(room_id))?;

        {
            let guard = rs.read().await;
            validate_booking(
                &guard,
                request.user_id,
                request.start_time,
                request.end_time,
                now,
                self.offset,
            )
            .map_err(|r| self.rejected(r))?;
        }

        self.commit_booking(&rs, id, request, now).await
    }

    /// Re-validate against the state the booking will be inserted into and
    /// insert it. The caller holds the commit gate.
    ///
    /// A slot rejection here means another booking won the slot since the
    /// advisory check and is reported as `SlotTaken`. Cap violations stay
    /// `Rejected`.
    pub(super) async fn commit_booking(
        &self,
        rs: &SharedRoomState,
        id: Ulid,
        request: BookingRequest,
        now: Ms,
    ) -> Result<Booking, EngineError> {
        let room_id = request.room_id;
        let mut guard = rs.write().await;
        if !self.is_live(&room_id, rs) {
            return Err(EngineError::NotFound(room_id));
        }
        if guard.bookings.len() >= MAX_BOOKINGS_PER_ROOM {
            return Err(EngineError::LimitExceeded("too many bookings on room"));
        }
        if self.entity_to_room.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        if let Err(rejection) = validate_booking(
            &guard,
            request.user_id,
            request.start_time,
            request.end_time,
            now,
            self.offset,
        ) {
            if matches!(
                rejection.kind,
                ViolationKind::DailyLimitExceeded | ViolationKind::WeeklyLimitExceeded
            ) {
                return Err(self.rejected(rejection));
            }
            warn!(
                "booking {id} lost the race for room {room_id} at {}: {rejection}",
                request.start_time
            );
            metrics::counter!(observability::SLOT_RACES_TOTAL).increment(1);
            return Err(EngineError::SlotTaken(rejection));
        }

        let booking = Booking {
            id,
            room_id,
            user_id: request.user_id,
            title: request.title,
            start_time: request.start_time,
            end_time: request.end_time,
            status: BookingStatus::Pending,
            created_at: now,
        };
        let event = Event::BookingCreated {
            booking: booking.clone(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        debug!(
            "booked room {room_id} [{}, {}) as {id}",
            booking.start_time, booking.end_time
        );
        Ok(booking)
    }

    fn rejected(&self, rejection: Rejection) -> EngineError {
        debug!("booking rejected: {rejection}");
        metrics::counter!(
            observability::BOOKINGS_REJECTED_TOTAL,
            "reason" => rejection.kind.as_str()
        )
        .increment(1);
        EngineError::Rejected(rejection)
    }

    pub async fn set_booking_status(
        &self,
        id: Ulid,
        status: BookingStatus,
    ) -> Result<Booking, EngineError> {
        let _gate = self.commit_gate.read().await;
        let (room_id, mut guard) = self.resolve_entity_write(&id).await?;
        let current = guard.booking(id).ok_or(EngineError::NotFound(id))?.status;
        if !current.can_transition_to(status) {
            return Err(EngineError::InvalidTransition {
                from: current,
                to: status,
            });
        }

        let event = Event::BookingStatusChanged { id, room_id, status };
        self.persist_and_apply(&mut guard, &event).await?;
        guard.booking(id).cloned().ok_or(EngineError::NotFound(id))
    }

    /// Remove a booking, subject to the deletion notice for confirmed ones.
    pub async fn delete_booking(&self, id: Ulid, now: Ms) -> Result<Booking, EngineError> {
        let _gate = self.commit_gate.read().await;
        let (room_id, mut guard) = self.resolve_entity_write(&id).await?;
        let booking = guard.booking(id).cloned().ok_or(EngineError::NotFound(id))?;
        check_deletable(&booking, now).map_err(EngineError::DeleteBlocked)?;

        let event = Event::BookingDeleted { id, room_id };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(booking)
    }

    /// Compact the WAL by rewriting it with only the events needed to recreate the current state.
    pub async fn compact_wal(&self) -> Result<usize, EngineError> {
        let _gate = self.commit_gate.write().await;

        let mut rooms: Vec<(Ulid, SharedRoomState)> = self
            .state
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        rooms.sort_by_key(|(id, _)| *id);

        let mut events = Vec::new();
        for (_, rs) in rooms {
            let guard = rs.read().await;
            events.push(Event::RoomCreated {
                id: guard.id,
                name: guard.name.clone(),
            });
            events.push(Event::AvailabilitySet {
                availability: guard.availability.clone(),
            });
            for blackout in &guard.blackouts {
                events.push(Event::BlackoutCreated {
                    blackout: blackout.clone(),
                });
            }
            for booking in &guard.bookings {
                events.push(Event::BookingCreated {
                    booking: booking.clone(),
                });
            }
        }

        let count = events.len();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))?;
        Ok(count)
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
