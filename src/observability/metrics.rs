//! Metrics collection and exposition.
//!
//! # Metrics
//! - `relay_requests_total` (counter): requests by route, status
//! - `relay_request_duration_seconds` (histogram): time to response head, by route
//! - `relay_retries_total` (counter): media redirect payloads followed
//! - `relay_length_mismatch_total` (counter): responses rejected by the length check
//! - `relay_errors_total` (counter): failures by kind
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(route: &'static str, status: u16, start: Instant) {
    metrics::counter!("relay_requests_total", "route" => route, "status" => status.to_string())
        .increment(1);
    metrics::histogram!("relay_request_duration_seconds", "route" => route)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_retry() {
    metrics::counter!("relay_retries_total").increment(1);
}

pub fn record_length_mismatch() {
    metrics::counter!("relay_length_mismatch_total").increment(1);
}

pub fn record_error(kind: &'static str) {
    metrics::counter!("relay_errors_total", "kind" => kind).increment(1);
}
