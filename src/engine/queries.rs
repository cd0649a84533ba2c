use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;

use super::slots::{compute_slots, SlotAvailabilityResult};
use super::validate::{validate_slot, Rejection};
use super::{Engine, EngineError};

impl Engine {
    pub async fn list_rooms(&self) -> Vec<RoomInfo> {
        let rooms: Vec<_> = self.state.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::with_capacity(rooms.len());
        for rs in rooms {
            let guard = rs.read().await;
            out.push(RoomInfo {
                id: guard.id,
                name: guard.name.clone(),
            });
        }
        out.sort_by_key(|r| r.id);
        out
    }

    pub async fn get_availability(&self, room_id: Ulid) -> Result<RoomAvailability, EngineError> {
        let rs = self.get_room(&room_id).ok_or(EngineError::NotFound(room_id))?;
        let guard = rs.read().await;
        Ok(guard.availability.clone())
    }

    /// Slot grid for one room and date. An unknown room is reported in the
    /// result's `error` field rather than as a failure.
    pub async fn slots(&self, room_id: Ulid, date: NaiveDate, now: Ms) -> SlotAvailabilityResult {
        let Some(rs) = self.get_room(&room_id) else {
            return SlotAvailabilityResult::failed(
                date.format("%Y-%m-%d").to_string(),
                format!("room {room_id} not found"),
            );
        };
        let guard = rs.read().await;
        compute_slots(&guard, date, now, self.offset)
    }

    /// Dry-run the booking validator without committing anything.
    pub async fn validate(
        &self,
        room_id: Ulid,
        user_id: Ulid,
        date: NaiveDate,
        start: ClockTime,
        end: ClockTime,
        now: Ms,
    ) -> Result<Result<(), Rejection>, EngineError> {
        let rs = self.get_room(&room_id).ok_or(EngineError::NotFound(room_id))?;
        let guard = rs.read().await;
        Ok(validate_slot(&guard, user_id, date, start, end, now, self.offset))
    }

    pub async fn list_blackouts(
        &self,
        room_id: Ulid,
        include_inactive: bool,
    ) -> Result<Vec<RoomBlackout>, EngineError> {
        let rs = self.get_room(&room_id).ok_or(EngineError::NotFound(room_id))?;
        let guard = rs.read().await;
        Ok(guard
            .blackouts
            .iter()
            .filter(|b| include_inactive || b.is_active)
            .cloned()
            .collect())
    }

    pub async fn get_blackout(&self, id: Ulid) -> Result<RoomBlackout, EngineError> {
        let guard = self.resolve_entity_read(&id).await?;
        guard
            .blackouts
            .iter()
            .find(|b| b.id == id)
            .cloned()
            .ok_or(EngineError::NotFound(id))
    }

    pub async fn list_bookings(&self, room_id: Ulid) -> Result<Vec<Booking>, EngineError> {
        let rs = self.get_room(&room_id).ok_or(EngineError::NotFound(room_id))?;
        let guard = rs.read().await;
        Ok(guard.bookings.clone())
    }

    pub async fn get_booking(&self, id: Ulid) -> Result<Booking, EngineError> {
        let guard = self.resolve_entity_read(&id).await?;
        guard.booking(id).cloned().ok_or(EngineError::NotFound(id))
    }
}
