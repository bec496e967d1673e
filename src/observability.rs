use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: book attempts. Labels: outcome (`ok` or an error kind).
pub const BOOKINGS_TOTAL: &str = "parkhold_bookings_total";

/// Counter: release attempts. Labels: outcome.
pub const RELEASES_TOTAL: &str = "parkhold_releases_total";

/// Histogram: HTTP handler latency in seconds. Labels: route.
pub const REQUEST_DURATION_SECONDS: &str = "parkhold_request_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: slots currently held.
pub const SLOTS_HELD: &str = "parkhold_slots_held";

/// Counter: holds freed by the expiry sweeper.
pub const SWEEP_RELEASED_TOTAL: &str = "parkhold_sweep_released_total";

/// Counter: expired holds the sweeper could not free (store refused the write).
pub const SWEEP_FAILURES_TOTAL: &str = "parkhold_sweep_failures_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "parkhold_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "parkhold_wal_flush_batch_size";

/// Install the Prometheus exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
