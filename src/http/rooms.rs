use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use ulid::Ulid;

use crate::model::RoomInfo;

use super::{parse_id, ApiError, AppState};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateRoom {
    #[serde(default)]
    id: Option<Ulid>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RenameRoom {
    #[serde(default)]
    name: Option<String>,
}

pub async fn list(State(state): State<AppState>) -> Json<Vec<RoomInfo>> {
    Json(state.engine.list_rooms().await)
}

pub async fn create(
    State(state): State<AppState>,
    body: Result<Json<CreateRoom>, JsonRejection>,
) -> Result<(StatusCode, Json<RoomInfo>), ApiError> {
    let Json(body) = body?;
    let id = body.id.unwrap_or_else(Ulid::new);
    state.engine.create_room(id, body.name.clone()).await?;
    Ok((StatusCode::CREATED, Json(RoomInfo { id, name: body.name })))
}

pub async fn update(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
    body: Result<Json<RenameRoom>, JsonRejection>,
) -> Result<Json<RoomInfo>, ApiError> {
    let id = parse_id(&room_id, "room")?;
    let Json(body) = body?;
    state.engine.update_room(id, body.name.clone()).await?;
    Ok(Json(RoomInfo { id, name: body.name }))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&room_id, "room")?;
    state.engine.delete_room(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
