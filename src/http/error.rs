use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;
use tracing::error;

use crate::engine::{DeleteBlocked, EngineError};
use crate::model::ReasonCode;

/// Error response: `{"error": {"code", "message", "reason"?, "detail"?}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<ReasonCode>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            reason: None,
            detail: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }

    fn with_reason(mut self, reason: &'static str, detail: Option<ReasonCode>) -> Self {
        self.reason = Some(reason);
        self.detail = detail;
        self
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        let message = err.to_string();
        match err {
            EngineError::NotFound(_) => Self::new(StatusCode::NOT_FOUND, "not_found", message),
            EngineError::AlreadyExists(_) => {
                Self::new(StatusCode::CONFLICT, "already_exists", message)
            }
            EngineError::InvalidConfig(_) => {
                Self::new(StatusCode::BAD_REQUEST, "invalid_availability", message)
            }
            EngineError::InvalidBlackout(_) => {
                Self::new(StatusCode::BAD_REQUEST, "invalid_blackout", message)
            }
            EngineError::Rejected(r) => Self::new(StatusCode::BAD_REQUEST, "booking_rejected", message)
                .with_reason(r.kind.as_str(), r.detail),
            EngineError::SlotTaken(r) => Self::new(StatusCode::CONFLICT, "slot_taken", message)
                .with_reason(r.kind.as_str(), r.detail),
            EngineError::DeleteBlocked(blocked) => {
                let reason = match blocked {
                    DeleteBlocked::AlreadyStarted => "already_started",
                    DeleteBlocked::TooCloseToStart { .. } => "too_close_to_start",
                };
                Self::new(StatusCode::BAD_REQUEST, "delete_blocked", message).with_reason(reason, None)
            }
            EngineError::InvalidTransition { .. } => {
                Self::new(StatusCode::CONFLICT, "invalid_transition", message)
            }
            EngineError::LimitExceeded(_) => {
                Self::new(StatusCode::BAD_REQUEST, "limit_exceeded", message)
            }
            EngineError::WalError(_) => {
                error!("{message}");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", "failed to persist change")
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_body", rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self }))).into_response()
    }
}
