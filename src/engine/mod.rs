mod checks;
mod error;
mod guard;
mod mutations;
mod queries;
mod slots;
mod validate;
#[cfg(test)]
mod tests;

pub(crate) use checks::now_ms;
pub use error::EngineError;
pub use guard::{can_delete, check_deletable, DeleteBlocked, DELETE_NOTICE_MS};
pub use slots::{check_booking_window, compute_slots, Restrictions, SlotAvailabilityResult, SLOT_MINUTES};
pub use validate::{validate_booking, validate_slot, Rejection, ViolationKind};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::FixedOffset;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{error, info};
use ulid::Ulid;

use crate::model::*;
use crate::wal::Wal;

pub type SharedRoomState = Arc<RwLock<RoomState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Drain all immediately available Appends (the batch window).
/// 3. Single flush_sync for the whole batch, then answer every sender.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut deferred = None;
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                        Ok(other) => {
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break,
                    }
                }
                commit_batch(&mut wal, &mut batch);
                if let Some(other) = deferred {
                    handle_non_append(&mut wal, other);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    if let Err(e) = &result {
        error!("WAL flush of {} events failed: {e}", batch.len());
    }
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Flush even after an append error so buffered bytes don't leak into the next batch.
    let flush_err = wal.flush_sync().err();
    match (append_err, flush_err) {
        (Some(e), _) | (None, Some(e)) => Err(e),
        (None, None) => Ok(()),
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { event, response } => {
            let mut batch = vec![(event, response)];
            commit_batch(wal, &mut batch);
        }
    }
}

pub struct Engine {
    pub state: DashMap<Ulid, SharedRoomState>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    /// Reverse lookup: blackout/booking id → room id.
    pub(super) entity_to_room: DashMap<Ulid, Ulid>,
    /// Mutations hold this shared; compaction holds it exclusively so no
    /// append can slip between its snapshot and the file swap.
    /// Always taken before any room lock.
    pub(super) commit_gate: RwLock<()>,
    /// Facility time zone for every wall-clock rule.
    offset: FixedOffset,
}

/// Apply an event to a RoomState. The caller holds its write lock.
fn apply_to_room(rs: &mut RoomState, event: &Event, entity_map: &DashMap<Ulid, Ulid>) {
    match event {
        Event::RoomUpdated { name, .. } => rs.name = name.clone(),
        Event::AvailabilitySet { availability } => rs.availability = availability.clone(),
        Event::BlackoutCreated { blackout } => {
            rs.insert_blackout(blackout.clone());
            entity_map.insert(blackout.id, blackout.room_id);
        }
        Event::BlackoutUpdated { blackout } => {
            rs.remove_blackout(blackout.id);
            rs.insert_blackout(blackout.clone());
        }
        Event::BlackoutDeleted { id, .. } => {
            rs.remove_blackout(*id);
            entity_map.remove(id);
        }
        Event::BookingCreated { booking } => {
            rs.insert_booking(booking.clone());
            entity_map.insert(booking.id, booking.room_id);
        }
        Event::BookingStatusChanged { id, status, .. } => {
            if let Some(booking) = rs.booking_mut(*id) {
                booking.status = *status;
            }
        }
        Event::BookingDeleted { id, .. } => {
            rs.remove_booking(*id);
            entity_map.remove(id);
        }
        // RoomCreated/Deleted are handled at the DashMap level, not here
        Event::RoomCreated { .. } | Event::RoomDeleted { .. } => {}
    }
}

/// Drop a deleted room's blackouts and bookings from the reverse index.
fn forget_room_entities(rs: &RoomState, entity_map: &DashMap<Ulid, Ulid>) {
    for b in &rs.blackouts {
        entity_map.remove(&b.id);
    }
    for b in &rs.bookings {
        entity_map.remove(&b.id);
    }
}

impl Engine {
    pub fn new(wal_path: PathBuf, offset: FixedOffset) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            state: DashMap::new(),
            wal_tx,
            entity_to_room: DashMap::new(),
            commit_gate: RwLock::new(()),
            offset,
        };

        // We're the sole owner of these Arcs, so try_read/try_write always
        // succeed. Never block here: this may run inside an async context.
        for event in &events {
            match event {
                Event::RoomCreated { id, name } => {
                    let rs = RoomState::new(*id, name.clone());
                    engine.state.insert(*id, Arc::new(RwLock::new(rs)));
                }
                Event::RoomDeleted { id } => {
                    if let Some((_, rs)) = engine.state.remove(id)
                        && let Ok(guard) = rs.try_read()
                    {
                        forget_room_entities(&guard, &engine.entity_to_room);
                    }
                }
                other => {
                    if let Some(room_id) = other.room_id()
                        && let Some(rs) = engine.get_room(&room_id)
                        && let Ok(mut guard) = rs.try_write()
                    {
                        apply_to_room(&mut guard, other, &engine.entity_to_room);
                    }
                }
            }
        }

        metrics::gauge!(crate::observability::ROOMS_ACTIVE).set(engine.state.len() as f64);
        info!(
            "replayed {} events: {} rooms, {} bookings/blackouts",
            events.len(),
            engine.state.len(),
            engine.entity_to_room.len()
        );
        Ok(engine)
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub fn get_room(&self, id: &Ulid) -> Option<SharedRoomState> {
        self.state.get(id).map(|e| e.value().clone())
    }

    /// Whether `rs` is still the state registered under `id`. Writers check
    /// this after taking the room's write lock.
    pub(super) fn is_live(&self, id: &Ulid, rs: &SharedRoomState) -> bool {
        self.state.get(id).is_some_and(|e| Arc::ptr_eq(e.value(), rs))
    }

    pub fn get_room_for_entity(&self, entity_id: &Ulid) -> Option<Ulid> {
        self.entity_to_room.get(entity_id).map(|e| *e.value())
    }

    /// WAL-append + apply in one call.
    pub(super) async fn persist_and_apply(
        &self,
        rs: &mut RoomState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_room(rs, event, &self.entity_to_room);
        Ok(())
    }

    /// Lookup entity → room, get room, acquire write lock.
    pub(super) async fn resolve_entity_write(
        &self,
        entity_id: &Ulid,
    ) -> Result<(Ulid, tokio::sync::OwnedRwLockWriteGuard<RoomState>), EngineError> {
        let room_id = self
            .get_room_for_entity(entity_id)
            .ok_or(EngineError::NotFound(*entity_id))?;
        let rs = self.get_room(&room_id).ok_or(EngineError::NotFound(room_id))?;
        let guard = rs.clone().write_owned().await;
        if !self.is_live(&room_id, &rs) {
            return Err(EngineError::NotFound(*entity_id));
        }
        Ok((room_id, guard))
    }

    pub(super) async fn resolve_entity_read(
        &self,
        entity_id: &Ulid,
    ) -> Result<tokio::sync::OwnedRwLockReadGuard<RoomState>, EngineError> {
        let room_id = self
            .get_room_for_entity(entity_id)
            .ok_or(EngineError::NotFound(*entity_id))?;
        let rs = self.get_room(&room_id).ok_or(EngineError::NotFound(room_id))?;
        Ok(rs.read_owned().await)
    }
}
