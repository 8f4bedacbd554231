use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

// ── Request-driven ──────────────────────────────────────────────

/// Counter: reservation attempts. Labels: outcome.
pub const RESERVATIONS_TOTAL: &str = "queuebook_reservations_total";

/// Histogram: reserve latency in seconds, including the WAL commit.
pub const RESERVE_DURATION_SECONDS: &str = "queuebook_reserve_duration_seconds";

/// Counter: cancellations. Labels: outcome.
pub const CANCELLATIONS_TOTAL: &str = "queuebook_cancellations_total";

// ── Resource utilization ────────────────────────────────────────

/// Gauge: queues held by the store.
pub const QUEUES_ACTIVE: &str = "queuebook_queues_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "queuebook_wal_flush_duration_seconds";

/// Histogram: events per WAL group-commit flush.
pub const WAL_FLUSH_BATCH_SIZE: &str = "queuebook_wal_flush_batch_size";

/// Counter: WAL compactions.
pub const WAL_COMPACTIONS_TOTAL: &str = "queuebook_wal_compactions_total";

/// Install the fmt subscriber. Safe to call more than once.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().try_init();
}

/// Install tracing and, if a port is given, the Prometheus exporter.
pub fn init(metrics_port: Option<u16>) -> Result<(), BuildError> {
    init_tracing();
    let Some(port) = metrics_port else {
        return Ok(());
    };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!("metrics endpoint: http://{addr}/metrics");
    Ok(())
}
