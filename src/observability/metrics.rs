//! Metrics collection and exposition.
//!
//! # Metrics
//! - `balancer_requests_total` (counter): requests by method, status, backend
//! - `balancer_request_duration_seconds` (histogram): end-to-end latency
//! - `balancer_backend_latency_seconds` (gauge): last measured latency per backend
//! - `balancer_rate_limited_total` (counter): denials by JSON-RPC method
//! - `balancer_store_errors_total` (counter): failed store operations

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder with its own HTTP listener.
///
/// Must be called from within the Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, backend: &str, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
        ("backend", backend.to_string()),
    ];
    metrics::counter!("balancer_requests_total", &labels).increment(1);
    metrics::histogram!("balancer_request_duration_seconds", &labels)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_backend_latency(backend: &str, latency: Duration) {
    metrics::gauge!("balancer_backend_latency_seconds", "backend" => backend.to_string())
        .set(latency.as_secs_f64());
}

pub fn record_rate_limited(call: &str) {
    metrics::counter!("balancer_rate_limited_total", "method" => call.to_string()).increment(1);
}

pub fn record_store_error(operation: &'static str) {
    metrics::counter!("balancer_store_errors_total", "operation" => operation).increment(1);
}
