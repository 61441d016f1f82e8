//! Gemini and Spartan client.
//!
//! # Data Flow
//! ```text
//! URL ─▶ requester.rs ─▶ transport.rs (TCP, TLS for Gemini)
//!                           │
//!                           ├─▶ trust.rs (hostname + validity of the leaf)
//!                           ▼
//!                     status line ─▶ redirect? ─▶ next hop
//!                           │
//!                           ▼
//!                      response.rs (lazy body)
//! ```
//!
//! # Design Decisions
//! - Leap-of-faith trust: no CA store, no persisted fingerprints
//! - Every failure aborts the chain; nothing is retried

pub mod requester;
pub mod response;
pub mod transport;
pub mod trust;
pub mod verifier;

use std::time::Duration;

use thiserror::Error;

pub use requester::{Data, Requester};
pub use response::Response;
pub use transport::Transport;
pub use trust::{Fingerprint, TrustDecision, TrustError, TrustValidator};

/// Redirects followed before a chain is abandoned.
pub const MAX_REDIRECTS: usize = 5;

/// Bound on each dial, TLS handshake included.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest accepted response header: two status digits, a space, 1024 bytes
/// of meta and the terminator.
pub const MAX_RESPONSE_HEADER: usize = 1029;

/// Client-side failures.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("connection failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection timed out after {0:?}")]
    Timeout(Duration),

    #[error("tls error: {0}")]
    Tls(#[from] rustls::Error),

    #[error("invalid url {0}")]
    InvalidUrl(String),

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("gemini requests cannot carry a data block")]
    DataUnsupported,

    #[error("server presented no certificate")]
    MissingCertificate,

    #[error(transparent)]
    Trust(#[from] TrustError),

    #[error("too many redirects")]
    TooManyRedirects,

    #[error("no cross-site redirects")]
    CrossSiteRedirect,

    #[error("invalid redirect {0}")]
    InvalidRedirect(String),

    #[error("invalid status code {0}")]
    InvalidStatus(String),

    #[error("malformed header")]
    MalformedHeader,

    #[error("malformed status code")]
    MalformedStatus,

    #[error("invalid data length: declared {declared}, source had {written}")]
    InvalidDataLength { declared: u64, written: u64 },
}

impl ClientError {
    /// Failures caused by the redirect policy rather than the network.
    pub fn is_redirect_policy(&self) -> bool {
        matches!(
            self,
            ClientError::TooManyRedirects | ClientError::CrossSiteRedirect | ClientError::InvalidRedirect(_)
        )
    }
}
