//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → tls.rs (TLS handshake, Gemini only)
//!     → connection.rs (lifecycle tracking)
//!     → server.rs (request line → Capsule::handle → close)
//!
//! Connection States:
//!     Accepting → Handshaking → Reading → Responding → Closed
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Each connection tracked for graceful shutdown
//! - TLS is handled transparently by the stream type

pub mod connection;
pub mod listener;
pub mod server;
pub mod tls;

pub use connection::{ConnectionId, ConnectionTracker};
pub use listener::{Listener, ListenerError};
pub use server::{serve_stdio, serve_stream, CapsuleServer, ServerError};
pub use tls::{load_tls_acceptor, TlsError};
