//! Metrics collection and exposition.
//!
//! # Metrics
//! - `harness_lifecycle_events_total` (counter): lifecycle transitions by `event`
//! - `harness_serving` (gauge): 1 while a serve loop is running
//! - `harness_connections_accepted_total` (counter): accepted connections by `transport`
//! - `harness_tls_handshake_failures_total` (counter)
//! - `harness_acme_events_total` (counter): ACME driver events by `outcome`

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Count a lifecycle transition (`tls_ready`, `listening`, `serve_returned`, ...).
pub fn record_lifecycle_event(event: &'static str) {
    metrics::counter!("harness_lifecycle_events_total", "event" => event).increment(1);
}

pub fn set_serving(serving: bool) {
    metrics::gauge!("harness_serving").set(if serving { 1.0 } else { 0.0 });
}

pub fn record_connection(transport: &'static str) {
    metrics::counter!("harness_connections_accepted_total", "transport" => transport).increment(1);
}

pub fn record_handshake_failure() {
    metrics::counter!("harness_tls_handshake_failures_total").increment(1);
}

pub fn record_acme_event(ok: bool) {
    let outcome = if ok { "ok" } else { "error" };
    metrics::counter!("harness_acme_events_total", "outcome" => outcome).increment(1);
}
