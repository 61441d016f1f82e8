//! Startup orchestration.
//!
//! # Responsibilities
//! - Install the metrics exporter when enabled
//! - Build the capsule and TLS acceptor from the validated config
//! - Bind the listener last, so traffic only arrives when ready
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - The config is assumed validated; see `config::validate_config`

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::ServerConfig;
use crate::net::{CapsuleServer, Listener, ServerError};
use crate::observability::metrics;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid metrics address {0}")]
    MetricsAddress(String),

    #[error("metrics exporter: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error(transparent)]
    Server(#[from] ServerError),
}

/// Prepare a server and its bound listener.
pub async fn start(config: &ServerConfig) -> Result<(CapsuleServer, Listener), StartupError> {
    if config.observability.metrics_enabled {
        let addr: SocketAddr = config
            .observability
            .metrics_address
            .parse()
            .map_err(|_| StartupError::MetricsAddress(config.observability.metrics_address.clone()))?;
        metrics::init_metrics(addr)?;
    }

    let server = CapsuleServer::from_config(config)?;
    let listener = Listener::bind(&config.bind_address(), config.listener.max_connections)
        .await
        .map_err(ServerError::from)?;

    tracing::info!(
        protocol = %config.capsule.protocol,
        bind_address = %config.bind_address(),
        max_connections = config.listener.max_connections,
        request_timeout_secs = config.timeouts.request_secs,
        "Startup complete"
    );
    Ok((server, listener))
}
