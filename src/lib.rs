//! Gemini and Spartan capsule engine.
//!
//! Serves a directory tree over either protocol and fetches from remote
//! capsules with leap-of-faith TLS trust.

// Core
pub mod capsule;
pub mod client;
pub mod protocol;

// Server plumbing
pub mod config;
pub mod net;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use capsule::{Capsule, Outcome, ServeError};
pub use client::{ClientError, Requester, Response};
pub use config::ServerConfig;
pub use lifecycle::Shutdown;
pub use net::CapsuleServer;
pub use protocol::{Protocol, Status, StatusClass};
