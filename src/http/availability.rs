use std::collections::HashMap;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Serialize;

use crate::calendar::parse_date;
use crate::engine::{SlotAvailabilityResult, ViolationKind};
use crate::model::{ClockTime, ReasonCode, RoomAvailability};

use super::{parse_id, ApiError, AppState};

/// Outcome of a dry-run validation.
#[derive(Debug, Serialize)]
pub struct Verdict {
    accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<ViolationKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<ReasonCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

pub async fn get_rules(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<Json<RoomAvailability>, ApiError> {
    let id = parse_id(&room_id, "room")?;
    Ok(Json(state.engine.get_availability(id).await?))
}

pub async fn set_rules(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    body: Result<Json<RoomAvailability>, JsonRejection>,
) -> Result<Json<RoomAvailability>, ApiError> {
    let id = parse_id(&room_id, "room")?;
    let Json(rules) = body?;
    state.engine.set_availability(id, rules.clone()).await?;
    Ok(Json(rules))
}

/// Always 200: request problems land in the result's `error` field.
pub async fn slots(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<SlotAvailabilityResult> {
    let Some(raw_date) = params.get("date") else {
        return Json(SlotAvailabilityResult::failed("", "date is required (YYYY-MM-DD)"));
    };
    let Some(date) = parse_date(raw_date) else {
        return Json(SlotAvailabilityResult::failed(
            raw_date.as_str(),
            format!("invalid date {raw_date:?}: expected YYYY-MM-DD"),
        ));
    };
    let room_id = match parse_id(&room_id, "room") {
        Ok(id) => id,
        Err(err) => return Json(SlotAvailabilityResult::failed(raw_date.as_str(), err.message)),
    };
    Json(state.engine.slots(room_id, date, state.now()).await)
}

pub async fn validate(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Verdict>, ApiError> {
    let room_id = parse_id(&room_id, "room")?;
    let required = |key: &str| {
        params
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| ApiError::bad_request(format!("missing query parameter {key:?}")))
    };
    let user_id = parse_id(required("user_id")?, "user")?;
    let raw_date = required("date")?;
    let date = parse_date(raw_date)
        .ok_or_else(|| ApiError::bad_request(format!("invalid date {raw_date:?}: expected YYYY-MM-DD")))?;
    let start: ClockTime = required("start")?
        .parse()
        .map_err(|e| ApiError::bad_request(format!("start: {e}")))?;
    let end: ClockTime = required("end")?
        .parse()
        .map_err(|e| ApiError::bad_request(format!("end: {e}")))?;

    let verdict = match state
        .engine
        .validate(room_id, user_id, date, start, end, state.now())
        .await?
    {
        Ok(()) => Verdict {
            accepted: true,
            reason: None,
            detail: None,
            message: None,
        },
        Err(rejection) => Verdict {
            accepted: false,
            reason: Some(rejection.kind),
            detail: rejection.detail,
            message: Some(rejection.message),
        },
    };
    Ok(Json(verdict))
}
