//! Metrics collection and exposition.
//!
//! # Metrics
//! - `capsule_requests_total` (counter): requests by protocol and status
//! - `capsule_request_duration_seconds` (histogram): time to answer a request
//! - `capsule_active_connections` (gauge): current connection count
//!
//! # Design Decisions
//! - Recording is unconditional; without an installed recorder it is a no-op
//! - Status labels use the wire code, so Spartan and Gemini stay distinguishable

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::protocol::Protocol;

/// Install the Prometheus recorder and its scrape endpoint.
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// Record one answered request. `status` is `None` when a dynamic handler
/// wrote the status line itself.
pub fn record_request(protocol: Protocol, status: Option<u8>, start: Instant) {
    let status = status.map_or_else(|| "dynamic".to_string(), |code| code.to_string());
    ::metrics::counter!(
        "capsule_requests_total",
        "protocol" => protocol.name(),
        "status" => status
    )
    .increment(1);
    ::metrics::histogram!(
        "capsule_request_duration_seconds",
        "protocol" => protocol.name()
    )
    .record(start.elapsed().as_secs_f64());
}

pub fn set_active_connections(count: u64) {
    ::metrics::gauge!("capsule_active_connections").set(count as f64);
}
