//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Server and client produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!     → tracing.rs (per-request spans with correlation IDs)
//!
//! Consumers:
//!     → stderr via tracing-subscriber's fmt layer
//!     → Metrics endpoint (Prometheus scrape), when enabled
//! ```
//!
//! # Design Decisions
//! - Request ID flows through every event of a request via its span
//! - Metrics are cheap (atomic increments) and no-ops without a recorder
//! - `RUST_LOG` always wins over the configured level

pub mod logging;
pub mod metrics;
pub mod tracing;
