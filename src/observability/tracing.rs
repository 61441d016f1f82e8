//! Request correlation.
//!
//! Every request runs inside a span carrying a fresh UUID, so log lines from
//! the resolver, the dynamic handler and the connection task can be joined.

use std::net::SocketAddr;

use tracing::Span;
use uuid::Uuid;

use crate::net::connection::ConnectionId;
use crate::protocol::Protocol;

/// Span for one request on one connection.
pub fn request_span(protocol: Protocol, connection: ConnectionId, peer: Option<SocketAddr>) -> Span {
    let request_id = Uuid::new_v4();
    match peer {
        Some(peer) => tracing::info_span!(
            "request",
            %request_id,
            %connection,
            %peer,
            protocol = protocol.name()
        ),
        None => tracing::info_span!(
            "request",
            %request_id,
            %connection,
            protocol = protocol.name()
        ),
    }
}
