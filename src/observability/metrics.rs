//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, status, service
//! - `gateway_request_duration_seconds` (histogram): latency distribution
//! - `gateway_rate_limited_total` (counter): admissions denied
//! - `gateway_cache_lookups_total` (counter): cache hits and misses
//! - `gateway_cache_size_bytes` (gauge): estimated cache footprint
//! - `gateway_circuit_transitions_total` (counter): breaker state changes
//! - `gateway_instance_health` (gauge): 1=healthy, 0=unhealthy

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus scrape listener. Must be called inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, service: &str, start: Instant) {
    counter!(
        "gateway_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "service" => service.to_string()
    )
    .increment(1);
    histogram!("gateway_request_duration_seconds", "service" => service.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_rate_limited(key_strategy: &str) {
    counter!("gateway_rate_limited_total", "strategy" => key_strategy.to_string()).increment(1);
}

pub fn record_cache_lookup(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!("gateway_cache_lookups_total", "result" => result).increment(1);
}

pub fn record_cache_size(bytes: usize) {
    gauge!("gateway_cache_size_bytes").set(bytes as f64);
}

pub fn record_circuit_transition(circuit: &str, state: &'static str) {
    counter!(
        "gateway_circuit_transitions_total",
        "circuit" => circuit.to_string(),
        "state" => state
    )
    .increment(1);
}

pub fn record_instance_health(service: &str, instance: &str, healthy: bool) {
    gauge!(
        "gateway_instance_health",
        "service" => service.to_string(),
        "instance" => instance.to_string()
    )
    .set(if healthy { 1.0 } else { 0.0 });
}
