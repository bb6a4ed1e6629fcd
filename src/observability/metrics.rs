//! Metrics collection and exposition.
//!
//! # Metrics
//! - `proxy_connections_accepted_total` (counter): sessions accepted, by gateway
//! - `proxy_handshake_failures_total` (counter): rejected handshakes, by reason
//! - `proxy_routes_total` (counter): routing outcomes (`tunnel`, `not_found`,
//!   `offline`, `forbidden`)
//! - `proxy_active_tunnels` (gauge): live tunnels

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_connection_accepted(gateway_id: &str) {
    ::metrics::counter!("proxy_connections_accepted_total", "gateway" => gateway_id.to_string())
        .increment(1);
}

pub fn record_handshake_failure(reason: &'static str) {
    ::metrics::counter!("proxy_handshake_failures_total", "reason" => reason).increment(1);
}

pub fn record_route(result: &'static str) {
    ::metrics::counter!("proxy_routes_total", "result" => result).increment(1);
}

pub fn tunnel_opened() {
    ::metrics::gauge!("proxy_active_tunnels").increment(1.0);
}

pub fn tunnel_closed() {
    ::metrics::gauge!("proxy_active_tunnels").decrement(1.0);
}
