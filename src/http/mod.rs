//! JSON/HTTP surface over the engine.

mod availability;
mod blackouts;
mod bookings;
mod error;
mod rooms;

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{MatchedPath, Request};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post, put};
use axum::Router;
use tracing::{info, info_span, Instrument};
use ulid::Ulid;

use crate::engine::{now_ms, Engine};
use crate::model::Ms;
use crate::observability::{REQUESTS_TOTAL, REQUEST_DURATION_SECONDS};

pub use error::ApiError;

pub type Clock = Arc<dyn Fn() -> Ms + Send + Sync>;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    clock: Clock,
}

impl AppState {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self::with_clock(engine, Arc::new(now_ms))
    }

    /// Use `clock` instead of the system time for every "now" the handlers need.
    pub fn with_clock(engine: Arc<Engine>, clock: Clock) -> Self {
        Self { engine, clock }
    }

    pub fn now(&self) -> Ms {
        (self.clock)()
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/rooms", get(rooms::list).post(rooms::create))
        .route("/rooms/:room_id", put(rooms::update).delete(rooms::delete))
        .route(
            "/rooms/:room_id/availability",
            get(availability::get_rules).put(availability::set_rules),
        )
        .route("/rooms/:room_id/availability/slots", get(availability::slots))
        .route("/rooms/:room_id/availability/validate", get(availability::validate))
        .route(
            "/rooms/:room_id/blackouts",
            get(blackouts::list).post(blackouts::create),
        )
        .route(
            "/blackouts/:id",
            get(blackouts::get).put(blackouts::update).delete(blackouts::delete),
        )
        .route("/rooms/:room_id/bookings", get(bookings::list))
        .route("/bookings", post(bookings::create))
        .route("/bookings/:id", get(bookings::get).delete(bookings::delete))
        .route("/bookings/:id/status", put(bookings::set_status))
        .layer(middleware::from_fn(track_requests))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn track_requests(request: Request, next: Next) -> Response {
    let started = Instant::now();
    let method = request.method().to_string();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_owned());

    let span = info_span!("request", %method, %route);
    let response = next.run(request).instrument(span).await;

    let status = response.status().as_u16();
    let elapsed = started.elapsed();
    metrics::counter!(
        REQUESTS_TOTAL,
        "method" => method.clone(),
        "route" => route.clone(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!(REQUEST_DURATION_SECONDS, "method" => method.clone(), "route" => route.clone())
        .record(elapsed.as_secs_f64());
    info!(%method, %route, status, latency_ms = elapsed.as_millis() as u64, "request complete");
    response
}

fn parse_id(raw: &str, what: &str) -> Result<Ulid, ApiError> {
    Ulid::from_string(raw).map_err(|_| ApiError::bad_request(format!("invalid {what} id {raw:?}")))
}
