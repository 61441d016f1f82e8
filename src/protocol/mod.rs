//! Wire-level protocol definitions shared by server and client.
//!
//! # Data Flow
//! ```text
//! Inbound line
//!     → request.rs (validate Gemini URL / split Spartan triple)
//!     → Request { host, path, protocol, content_length }
//!
//! Status handling:
//!     status.rs (two-digit codes, class digits, wire formatting)
//!     mime.rs (extension → media type table)
//! ```
//!
//! # Design Decisions
//! - One `Protocol` tag parameterises everything; no per-protocol engines
//! - Gemini codes are the canonical representation; Spartan writes the class digit
//! - Line reads are always bounded

pub mod mime;
pub mod request;
pub mod status;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

pub use request::{Request, RequestError};
pub use status::{Status, StatusClass};

/// Default Gemini port.
pub const GEMINI_PORT: u16 = 1965;

/// Default Spartan port.
pub const SPARTAN_PORT: u16 = 300;

/// Maximum Gemini request size, URL plus terminator.
pub const MAX_GEMINI_REQUEST: usize = 1024;

/// Upper bound for a Spartan request line. The protocol sets no limit.
pub const MAX_SPARTAN_REQUEST: usize = 4096;

/// The two supported line protocols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Gemini,
    Spartan,
}

impl Protocol {
    /// Lowercase protocol name, also the URL scheme.
    pub fn name(&self) -> &'static str {
        match self {
            Protocol::Gemini => "gemini",
            Protocol::Spartan => "spartan",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Protocol::Gemini => GEMINI_PORT,
            Protocol::Spartan => SPARTAN_PORT,
        }
    }

    /// Resolve a protocol from a URL scheme.
    pub fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme {
            "gemini" => Some(Protocol::Gemini),
            "spartan" => Some(Protocol::Spartan),
            _ => None,
        }
    }

    /// How many bytes the server reads before giving up on a request line.
    ///
    /// Gemini gets one byte beyond its limit so an oversize line is still
    /// handed to the parser and rejected as too long.
    pub fn request_limit(&self) -> usize {
        match self {
            Protocol::Gemini => MAX_GEMINI_REQUEST + 1,
            Protocol::Spartan => MAX_SPARTAN_REQUEST,
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of a bounded line read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    /// A line ending in `\n`, terminator included.
    Complete(Vec<u8>),
    /// The limit was reached before a terminator showed up.
    Truncated(Vec<u8>),
    /// EOF before a terminator. Empty when the peer sent nothing.
    Eof(Vec<u8>),
}

/// Read a single `\n`-terminated line of at most `limit` bytes.
pub async fn read_line_bounded<R>(reader: &mut R, limit: usize) -> std::io::Result<Line>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let n = (&mut *reader)
        .take(limit as u64)
        .read_until(b'\n', &mut buf)
        .await?;

    if buf.last() == Some(&b'\n') {
        Ok(Line::Complete(buf))
    } else if n >= limit {
        Ok(Line::Truncated(buf))
    } else {
        Ok(Line::Eof(buf))
    }
}

/// Strip a trailing `\r\n` or `\n`.
pub fn trim_terminator(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
