//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the global subscriber
//! - Turn a configured level into a filter for this crate's binaries
//!
//! # Design Decisions
//! - `RUST_LOG` takes precedence over configuration
//! - Human-readable fmt output on stderr; stdout is reserved for protocol data
//!   in `--stdio` mode and for fetched bodies

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Expand a bare level ("debug") into per-target directives. Full directives
/// ("capsule_engine=trace,rustls=warn") pass through unchanged.
pub fn filter_directive(log_level: &str) -> String {
    if log_level.contains('=') || log_level.contains(',') {
        return log_level.to_string();
    }
    format!(
        "capsule_engine={0},capsule={0},capsule_fetch={0}",
        log_level
    )
}

/// Install the global subscriber.
pub fn init_logging(log_level: &str) -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter_directive(log_level).into()),
        )
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init()
}
