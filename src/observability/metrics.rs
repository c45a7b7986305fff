//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define gateway metrics (requests, latency, merges, spills, stream errors)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by transport, method, status
//! - `gateway_request_duration_seconds` (histogram): time to response commit, by transport
//! - `gateway_merge_records_total` (counter): records folded by the merge engine
//! - `gateway_spill_bytes_total` (counter): raw bytes written to spill resources
//! - `gateway_spill_failures_total` (counter): spilled fields dropped from merged output
//! - `gateway_stream_errors_total` (counter): post-commit failures by stage
//!
//! # Design Decisions
//! - Low-overhead metric updates through the `metrics` facade
//! - Method labels come from the dispatch table, so cardinality is bounded

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus recorder and its scrape listener.
///
/// Must run inside the Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(transport: &'static str, method: &str, status: u16, start: Instant) {
    metrics::counter!(
        "gateway_requests_total",
        "transport" => transport,
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("gateway_request_duration_seconds", "transport" => transport)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_merge(records: u64, spill_bytes: u64, spill_failures: usize) {
    metrics::counter!("gateway_merge_records_total").increment(records);
    metrics::counter!("gateway_spill_bytes_total").increment(spill_bytes);
    if spill_failures > 0 {
        metrics::counter!("gateway_spill_failures_total").increment(spill_failures as u64);
    }
}

/// `stage` is one of `recv`, `merge`, `encode`, `spill`, `client`.
pub fn record_stream_error(stage: &'static str) {
    metrics::counter!("gateway_stream_errors_total", "stage" => stage).increment(1);
}
