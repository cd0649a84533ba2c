use std::net::SocketAddr;

use metrics_exporter_prometheus::BuildError;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: HTTP requests served. Labels: method, route, status.
pub const REQUESTS_TOTAL: &str = "roombook_requests_total";

/// Histogram: request latency in seconds. Labels: method, route.
pub const REQUEST_DURATION_SECONDS: &str = "roombook_request_duration_seconds";

/// Counter: bookings refused by the validator. Labels: reason.
pub const BOOKINGS_REJECTED_TOTAL: &str = "roombook_bookings_rejected_total";

/// Counter: bookings that passed the advisory check but lost the slot at commit.
pub const SLOT_RACES_TOTAL: &str = "roombook_slot_races_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: rooms currently loaded.
pub const ROOMS_ACTIVE: &str = "roombook_rooms_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "roombook_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "roombook_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
