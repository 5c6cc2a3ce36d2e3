// src/core/metrics.rs

//! Defines and registers Prometheus metrics for gateway monitoring.
//!
//! This module uses `lazy_static` to ensure that metrics are registered only once
//! globally for the entire application lifecycle.

use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Gauge, Histogram, TextEncoder, register_counter, register_counter_vec,
    register_gauge, register_histogram,
};

lazy_static! {
    /// The number of clients currently holding a connection slot.
    pub static ref CONNECTED_CLIENTS: Gauge =
        register_gauge!("opcgate_connected_clients", "Number of currently connected clients.").unwrap();
    /// The number of registered points in the session directory.
    pub static ref REGISTERED_POINTS: Gauge =
        register_gauge!("opcgate_registered_points", "Number of points registered on the data source.").unwrap();

    /// The total number of connections accepted since startup.
    pub static ref CONNECTIONS_RECEIVED_TOTAL: Counter =
        register_counter!("opcgate_connections_received_total", "Total number of connections accepted.").unwrap();
    /// How often the accept loop had to wait for a free connection slot.
    pub static ref ADMISSION_WAITS_TOTAL: Counter =
        register_counter!("opcgate_admission_waits_total", "Total number of times the accept loop waited for a free slot.").unwrap();
    /// Requests processed, labeled by verb (`INVALID` for rejected requests).
    pub static ref REQUESTS_PROCESSED_TOTAL: CounterVec =
        register_counter_vec!("opcgate_requests_processed_total", "Total number of requests processed, labeled by verb.", &["verb"]).unwrap();
    /// Change notification batches received from the data source.
    pub static ref NOTIFICATION_BATCHES_TOTAL: Counter =
        register_counter!("opcgate_notification_batches_total", "Total number of change notification batches received.").unwrap();
    /// Point changes forwarded by the notification pipeline.
    pub static ref CHANGES_EMITTED_TOTAL: Counter =
        register_counter!("opcgate_changes_emitted_total", "Total number of point changes emitted by the notification pipeline.").unwrap();

    /// A histogram of request processing latencies, including lock waits.
    pub static ref REQUEST_LATENCY_SECONDS: Histogram =
        register_histogram!("opcgate_request_latency_seconds", "Latency of request processing in seconds.").unwrap();
}

/// Gathers all registered metrics and encodes them into the Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_else(|e| format!("# failed to encode metrics: {e}"))
}
