//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define gateway metrics (requests, latency, rejections, upstream errors)
//! - Expose a Prometheus-compatible scrape endpoint when enabled
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, status, route class
//! - `gateway_request_duration_seconds` (histogram): latency distribution
//! - `gateway_policy_rejections_total` (counter): rejections by policy
//! - `gateway_upstream_errors_total` (counter): backend failures by kind
//! - `gateway_persistence_saves_total` (counter): scheduled saves by outcome
//! - `gateway_rate_limit_clients` (gauge): tracked rate-limit windows
//!
//! # Design Decisions
//! - Recording is a no-op until an exporter is installed
//! - Labels are low-cardinality: no paths, no addresses

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::MetricsError;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), MetricsError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| MetricsError {
            addr,
            reason: e.to_string(),
        })?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_request(method: &str, status: u16, class: &'static str, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
        ("class", class.to_string()),
    ];
    ::metrics::counter!("gateway_requests_total", &labels).increment(1);
    ::metrics::histogram!("gateway_request_duration_seconds", &labels)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_policy_rejection(policy: &'static str) {
    ::metrics::counter!("gateway_policy_rejections_total", "policy" => policy).increment(1);
}

pub fn record_upstream_error(kind: &'static str) {
    ::metrics::counter!("gateway_upstream_errors_total", "kind" => kind).increment(1);
}

pub fn record_persistence_save(outcome: &'static str) {
    ::metrics::counter!("gateway_persistence_saves_total", "outcome" => outcome).increment(1);
}

pub fn record_rate_limit_clients(count: usize) {
    ::metrics::gauge!("gateway_rate_limit_clients").set(count as f64);
}
