//! Server-side protocol engine.
//!
//! # Data Flow
//! ```text
//! raw request line
//!     → protocol::request (validate)
//!     → resolver.rs (path → Resource)
//!     → emitter.rs (status line + file body)
//!       or cgi.rs (dynamic handler writes the response)
//!     → exactly one status line on the sink
//! ```
//!
//! # Design Decisions
//! - A `Capsule` is built once per listener and shared read-only via `Arc`
//! - The same engine serves both protocols, parameterised by `Protocol`
//! - Every failure is written as a status line *and* returned as `ServeError`

pub mod cgi;
pub mod emitter;
pub mod resolver;
pub mod responder;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::protocol::{Protocol, RequestError, Status};

pub use cgi::{CgiError, DynamicHandler, ProcessHandler};
pub use emitter::ResponseEmitter;
pub use resolver::{PathResolver, Resource};
pub use responder::Outcome;

/// A configured engine bound to one resource root.
#[derive(Debug, Clone)]
pub struct Capsule {
    protocol: Protocol,
    resolver: PathResolver,
    handler: Arc<dyn DynamicHandler>,
}

impl Capsule {
    /// Create a capsule serving `root`, running dynamic resources as processes.
    pub fn new(protocol: Protocol, root: impl AsRef<Path>) -> std::io::Result<Self> {
        Ok(Self {
            protocol,
            resolver: PathResolver::new(root, protocol)?,
            handler: Arc::new(ProcessHandler),
        })
    }

    /// Replace the dynamic handler.
    pub fn with_handler(mut self, handler: Arc<dyn DynamicHandler>) -> Self {
        self.handler = handler;
        self
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Canonical root directory.
    pub fn root(&self) -> &Path {
        self.resolver.root()
    }
}

/// Server-side request failures.
#[derive(Debug, Error)]
pub enum ServeError {
    #[error("{0}")]
    Request(#[from] RequestError),

    #[error("not found: {0}")]
    ResourceMissing(String),

    #[error("unreadable {}: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("dynamic handler failed: {0}")]
    DynamicHandler(#[from] CgiError),

    /// The handler failed after part of its response reached the client.
    #[error("dynamic handler failed after writing {written} bytes: {source}")]
    HandlerAborted {
        written: u64,
        #[source]
        source: CgiError,
    },

    #[error("transport failure: {0}")]
    Transport(#[from] std::io::Error),
}

impl ServeError {
    /// The status line this failure is reported with, if one can be written.
    pub fn response(&self, protocol: Protocol) -> Option<(Status, String)> {
        let gemini = protocol == Protocol::Gemini;
        match self {
            ServeError::Request(e) => Some((e.status(), e.to_string())),
            ServeError::ResourceMissing(_) => {
                let status = if gemini { Status::NotFound } else { Status::CLIENT_ERROR };
                Some((status, "not found".to_string()))
            }
            ServeError::Unreadable { .. } if gemini => {
                Some((Status::NotFound, "not found".to_string()))
            }
            ServeError::Unreadable { .. } => {
                Some((Status::SERVER_ERROR, "unreadable".to_string()))
            }
            ServeError::DynamicHandler(_) => {
                let status = if gemini { Status::CgiError } else { Status::SERVER_ERROR };
                Some((status, "cgi error".to_string()))
            }
            ServeError::HandlerAborted { .. } | ServeError::Transport(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_statuses_per_protocol() {
        let missing = ServeError::ResourceMissing("/x".into());
        assert_eq!(missing.response(Protocol::Gemini).unwrap().0, Status::NotFound);
        assert_eq!(
            missing.response(Protocol::Spartan).unwrap().0.wire_code(Protocol::Spartan),
            4
        );

        let cgi = ServeError::DynamicHandler(CgiError::Other("boom".into()));
        assert_eq!(cgi.response(Protocol::Gemini).unwrap().0, Status::CgiError);
        assert_eq!(
            cgi.response(Protocol::Spartan).unwrap().0.wire_code(Protocol::Spartan),
            5
        );

        let io = ServeError::Transport(std::io::Error::other("reset"));
        assert!(io.response(Protocol::Gemini).is_none());

        let aborted = ServeError::HandlerAborted {
            written: 12,
            source: CgiError::Other("boom".into()),
        };
        assert!(aborted.response(Protocol::Gemini).is_none());
        assert!(aborted.response(Protocol::Spartan).is_none());
    }
}
