use ulid::Ulid;

use crate::model::BookingStatus;

use super::guard::DeleteBlocked;
use super::validate::Rejection;

#[derive(Debug)]
pub enum EngineError {
    NotFound(Ulid),
    AlreadyExists(Ulid),
    InvalidConfig(String),
    InvalidBlackout(String),
    /// The booking breaks the room's rules.
    Rejected(Rejection),
    /// The booking was valid when checked but lost the race to a concurrent one.
    SlotTaken(Rejection),
    DeleteBlocked(DeleteBlocked),
    InvalidTransition {
        from: BookingStatus,
        to: BookingStatus,
    },
    LimitExceeded(&'static str),
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::InvalidConfig(msg) => write!(f, "invalid availability: {msg}"),
            EngineError::InvalidBlackout(msg) => write!(f, "invalid blackout: {msg}"),
            EngineError::Rejected(r) => write!(f, "booking rejected: {r}"),
            EngineError::SlotTaken(r) => write!(f, "slot no longer available: {r}"),
            EngineError::DeleteBlocked(reason) => write!(f, "{reason}"),
            EngineError::InvalidTransition { from, to } => {
                write!(f, "cannot change booking status from {from} to {to}")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
