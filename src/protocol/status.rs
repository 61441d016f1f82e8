//! Status codes and their wire representation.
//!
//! Gemini's two-digit codes are the canonical form. Spartan only knows the
//! class digit, so a Spartan response writes `code / 10`.

use super::Protocol;

/// Response status, named after the Gemini codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Status {
    Input = 10,
    SensitiveInput = 11,
    Success = 20,
    TemporaryRedirect = 30,
    PermanentRedirect = 31,
    TemporaryFailure = 40,
    ServerUnavailable = 41,
    CgiError = 42,
    ProxyError = 43,
    SlowDown = 44,
    PermanentFailure = 50,
    NotFound = 51,
    Gone = 52,
    ProxyRequestRefused = 53,
    BadRequest = 59,
    ClientCertificateRequired = 60,
    CertificateNotAuthorized = 61,
    CertificateNotValid = 62,
}

impl Status {
    /// Spartan "client error" (`4`).
    pub const CLIENT_ERROR: Status = Status::TemporaryFailure;
    /// Spartan "server error" (`5`).
    pub const SERVER_ERROR: Status = Status::PermanentFailure;
    /// Spartan redirect (`3`).
    pub const REDIRECT: Status = Status::TemporaryRedirect;

    /// The full two-digit code.
    pub fn code(&self) -> u8 {
        *self as u8
    }

    pub fn class(&self) -> StatusClass {
        // Every variant has a leading digit in 1..=6.
        StatusClass::from_digit(self.code() / 10).unwrap_or(StatusClass::ServerError)
    }

    /// The number actually written on the status line.
    pub fn wire_code(&self, protocol: Protocol) -> u8 {
        match protocol {
            Protocol::Gemini => self.code(),
            Protocol::Spartan => self.code() / 10,
        }
    }

    pub fn is_success(&self) -> bool {
        self.class() == StatusClass::Success
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Status class, the leading digit shared by both protocols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusClass {
    Input,
    Success,
    Redirect,
    ClientError,
    ServerError,
    ClientCertificate,
}

impl StatusClass {
    pub fn from_digit(digit: u8) -> Option<Self> {
        match digit {
            1 => Some(StatusClass::Input),
            2 => Some(StatusClass::Success),
            3 => Some(StatusClass::Redirect),
            4 => Some(StatusClass::ClientError),
            5 => Some(StatusClass::ServerError),
            6 => Some(StatusClass::ClientCertificate),
            _ => None,
        }
    }

    /// Classify a status code as received on the wire.
    ///
    /// Returns `None` for codes outside the protocol's valid range
    /// (10–69 for Gemini, 2–5 for Spartan).
    pub fn from_wire(protocol: Protocol, code: u8) -> Option<Self> {
        match protocol {
            Protocol::Gemini if (10..=69).contains(&code) => Self::from_digit(code / 10),
            Protocol::Spartan if (2..=5).contains(&code) => Self::from_digit(code),
            _ => None,
        }
    }
}
