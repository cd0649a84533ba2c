use std::collections::HashMap;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use ulid::Ulid;

use crate::model::{BlackoutType, Ms, RoomBlackout};

use super::{parse_id, ApiError, AppState};

fn active() -> bool {
    true
}

/// Blackout fields a client may set. Ids are assigned by the server.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BlackoutInput {
    title: String,
    #[serde(default)]
    description: Option<String>,
    start_time: Ms,
    end_time: Ms,
    blackout_type: BlackoutType,
    #[serde(default)]
    is_recurring: bool,
    #[serde(default = "active")]
    is_active: bool,
}

impl BlackoutInput {
    fn into_blackout(self, id: Ulid, room_id: Ulid) -> RoomBlackout {
        RoomBlackout {
            id,
            room_id,
            title: self.title,
            description: self.description,
            start_time: self.start_time,
            end_time: self.end_time,
            blackout_type: self.blackout_type,
            is_recurring: self.is_recurring,
            is_active: self.is_active,
        }
    }
}

pub async fn list(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Vec<RoomBlackout>>, ApiError> {
    let room_id = parse_id(&room_id, "room")?;
    let include_inactive = matches!(
        params.get("include_inactive").map(String::as_str),
        Some("true" | "1")
    );
    Ok(Json(state.engine.list_blackouts(room_id, include_inactive).await?))
}

pub async fn create(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    body: Result<Json<BlackoutInput>, JsonRejection>,
) -> Result<(StatusCode, Json<RoomBlackout>), ApiError> {
    let room_id = parse_id(&room_id, "room")?;
    let Json(input) = body?;
    let blackout = input.into_blackout(Ulid::new(), room_id);
    state.engine.create_blackout(blackout.clone()).await?;
    Ok((StatusCode::CREATED, Json(blackout)))
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RoomBlackout>, ApiError> {
    let id = parse_id(&id, "blackout")?;
    Ok(Json(state.engine.get_blackout(id).await?))
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<BlackoutInput>, JsonRejection>,
) -> Result<Json<RoomBlackout>, ApiError> {
    let id = parse_id(&id, "blackout")?;
    let Json(input) = body?;
    let current = state.engine.get_blackout(id).await?;
    let updated = state
        .engine
        .update_blackout(input.into_blackout(id, current.room_id))
        .await?;
    Ok(Json(updated))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id, "blackout")?;
    state.engine.delete_blackout(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
