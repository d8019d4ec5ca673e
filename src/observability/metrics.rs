//! Metrics collection and exposition.
//!
//! # Metrics
//! - `dp_connector_calls_total` (counter): finished calls by outcome
//! - `dp_connector_attempts_total` (counter): attempts by host and outcome
//! - `dp_connector_call_duration_seconds` (histogram): call latency, retries included
//! - `dp_connector_circuit_state` (gauge): 0=closed, 1=open, 2=half_open
//! - `dp_connector_host_health` (gauge): 1=healthy, 0=unhealthy, per host
//!
//! # Design Decisions
//! - Prometheus exporter is optional and owns its own HTTP listener
//! - Labels stay low-cardinality: outcome, error kind, host

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::resilience::CircuitState;

/// Install the Prometheus recorder and its scrape endpoint.
///
/// Must run inside a tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Prometheus exporter listening"),
        Err(e) => {
            tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter")
        }
    }
}

/// `outcome` is "success" or an error kind.
pub fn record_call(outcome: &'static str, duration: Duration) {
    counter!("dp_connector_calls_total", "outcome" => outcome).increment(1);
    histogram!("dp_connector_call_duration_seconds", "outcome" => outcome)
        .record(duration.as_secs_f64());
}

pub fn record_attempt(host: &str, outcome: &'static str) {
    counter!(
        "dp_connector_attempts_total",
        "host" => host.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_circuit_state(state: CircuitState) {
    gauge!("dp_connector_circuit_state").set(state as u8 as f64);
}

pub fn record_host_health(host: &str, healthy: bool) {
    gauge!("dp_connector_host_health", "host" => host.to_string())
        .set(if healthy { 1.0 } else { 0.0 });
}
