use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use ulid::Ulid;

use crate::model::{Booking, BookingRequest, BookingStatus};

use super::{parse_id, ApiError, AppState};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StatusUpdate {
    status: BookingStatus,
}

pub async fn list(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<Json<Vec<Booking>>, ApiError> {
    let room_id = parse_id(&room_id, "room")?;
    Ok(Json(state.engine.list_bookings(room_id).await?))
}

pub async fn create(
    State(state): State<AppState>,
    body: Result<Json<BookingRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Booking>), ApiError> {
    let Json(request) = body?;
    let booking = state
        .engine
        .create_booking(Ulid::new(), request, state.now())
        .await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Booking>, ApiError> {
    let id = parse_id(&id, "booking")?;
    Ok(Json(state.engine.get_booking(id).await?))
}

pub async fn set_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<StatusUpdate>, JsonRejection>,
) -> Result<Json<Booking>, ApiError> {
    let id = parse_id(&id, "booking")?;
    let Json(update) = body?;
    Ok(Json(state.engine.set_booking_status(id, update.status).await?))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id, "booking")?;
    state.engine.delete_booking(id, state.now()).await?;
    Ok(StatusCode::NO_CONTENT)
}
