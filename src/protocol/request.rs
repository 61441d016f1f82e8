//! Request line parsing and validation.
//!
//! # Responsibilities
//! - Gemini: validate an absolute `gemini://` URL of at most 1024 bytes
//! - Spartan: split `host path content-length` and validate each field;
//!   a line truncated at the read limit is refused outright
//! - Map every rejection to a status and a short message
//!
//! # Design Decisions
//! - Pure functions: no I/O, no logging
//! - Gemini length is measured on the raw line, terminator included
//! - A positive Spartan content length is rejected before the path is looked at,
//!   since the server cannot consume a data block yet

use thiserror::Error;
use url::Url;

use super::{Protocol, Status, MAX_GEMINI_REQUEST, MAX_SPARTAN_REQUEST};

/// A validated inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub host: String,
    /// Percent-decoded path. Starts with `/` except for a bare Gemini authority.
    pub path: String,
    /// Raw Gemini query string, if any.
    pub query: Option<String>,
    pub protocol: Protocol,
    pub content_length: u64,
}

/// Reasons a request line is refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("too long")]
    TooLong,

    #[error("invalid url")]
    InvalidUrl,

    #[error("not an absolute url")]
    NotAbsolute,

    #[error("fragments not allowed")]
    Fragment,

    #[error("userinfo not allowed")]
    UserInfo,

    #[error("this is a gemini server")]
    WrongScheme,

    /// Wrong field count or undecodable Spartan line.
    #[error("bad request")]
    BadRequest,

    #[error("missing /")]
    MissingSlash,

    #[error("invalid content length")]
    InvalidContentLength,

    #[error("no data block support yet")]
    DataBlockUnsupported,
}

impl RequestError {
    /// Status written back to the client.
    pub fn status(&self) -> Status {
        match self {
            RequestError::TooLong
            | RequestError::InvalidUrl
            | RequestError::NotAbsolute
            | RequestError::Fragment
            | RequestError::UserInfo
            | RequestError::WrongScheme => Status::BadRequest,
            RequestError::BadRequest
            | RequestError::MissingSlash
            | RequestError::InvalidContentLength => Status::CLIENT_ERROR,
            RequestError::DataBlockUnsupported => Status::SERVER_ERROR,
        }
    }

    /// True when the line could not even be split or decoded, as opposed to
    /// being well-formed but semantically unacceptable.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            RequestError::InvalidUrl
                | RequestError::BadRequest
                | RequestError::MissingSlash
                | RequestError::InvalidContentLength
        )
    }
}

impl Request {
    /// Parse a raw request line for the given protocol.
    pub fn parse(protocol: Protocol, raw: &[u8]) -> Result<Self, RequestError> {
        match protocol {
            Protocol::Gemini => Self::parse_gemini(raw),
            Protocol::Spartan => Self::parse_spartan(raw),
        }
    }

    pub fn parse_gemini(raw: &[u8]) -> Result<Self, RequestError> {
        if raw.len() > MAX_GEMINI_REQUEST {
            return Err(RequestError::TooLong);
        }
        let line = std::str::from_utf8(raw)
            .map_err(|_| RequestError::InvalidUrl)?
            .trim();

        let url = match Url::parse(line) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                return Err(RequestError::NotAbsolute)
            }
            Err(_) => return Err(RequestError::InvalidUrl),
        };

        let host = match url.host_str() {
            Some(host) if !host.is_empty() => host.to_string(),
            _ => return Err(RequestError::NotAbsolute),
        };
        if url.fragment().is_some() {
            return Err(RequestError::Fragment);
        }
        if !url.username().is_empty() || url.password().is_some() {
            return Err(RequestError::UserInfo);
        }
        if url.scheme() != Protocol::Gemini.name() {
            return Err(RequestError::WrongScheme);
        }

        let path = urlencoding::decode(url.path())
            .map_err(|_| RequestError::InvalidUrl)?
            .into_owned();

        Ok(Self {
            host,
            path,
            query: url.query().map(str::to_string),
            protocol: Protocol::Gemini,
            content_length: 0,
        })
    }

    pub fn parse_spartan(raw: &[u8]) -> Result<Self, RequestError> {
        // A line cut off at the read limit may have lost part of its length.
        if raw.len() >= MAX_SPARTAN_REQUEST && raw.last() != Some(&b'\n') {
            return Err(RequestError::BadRequest);
        }
        let line = std::str::from_utf8(raw)
            .map_err(|_| RequestError::BadRequest)?
            .trim();

        let fields: Vec<&str> = line.split(' ').collect();
        let [host, path, length] = fields[..] else {
            return Err(RequestError::BadRequest);
        };

        let content_length: u64 = length
            .parse()
            .map_err(|_| RequestError::InvalidContentLength)?;
        if content_length > 0 {
            return Err(RequestError::DataBlockUnsupported);
        }
        if !path.starts_with('/') {
            return Err(RequestError::MissingSlash);
        }

        Ok(Self {
            host: host.to_string(),
            path: path.to_string(),
            query: None,
            protocol: Protocol::Spartan,
            content_length,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gemini_valid() {
        let req = Request::parse_gemini(b"gemini://localhost/README.gmi\r\n").unwrap();
        assert_eq!(req.host, "localhost");
        assert_eq!(req.path, "/README.gmi");
        assert_eq!(req.query, None);
        assert_eq!(req.protocol, Protocol::Gemini);
    }

    #[test]
    fn gemini_query_and_decoding() {
        let req = Request::parse_gemini(b"gemini://example.org/my%20file.gmi?hello\r\n").unwrap();
        assert_eq!(req.path, "/my file.gmi");
        assert_eq!(req.query.as_deref(), Some("hello"));
    }

    #[test]
    fn gemini_bare_authority_has_empty_path() {
        let req = Request::parse_gemini(b"gemini://localhost\r\n").unwrap();
        assert_eq!(req.path, "");
    }

    #[test]
    fn gemini_rejections() {
        let cases: &[(&[u8], RequestError)] = &[
            (b"gemini://localhost/a#top\r\n", RequestError::Fragment),
            (b"gemini://user:pw@localhost/\r\n", RequestError::UserInfo),
            (b"gemini://user@localhost/\r\n", RequestError::UserInfo),
            (b"https://localhost/\r\n", RequestError::WrongScheme),
            (b"/README.gmi\r\n", RequestError::NotAbsolute),
            (b"gemini:README.gmi\r\n", RequestError::NotAbsolute),
            (b"gemini://[::1/\r\n", RequestError::InvalidUrl),
        ];
        for (line, expected) in cases {
            let err = Request::parse_gemini(line).unwrap_err();
            assert_eq!(&err, expected, "line {:?}", String::from_utf8_lossy(line));
            assert_eq!(err.status(), Status::BadRequest);
        }
    }

    #[test]
    fn gemini_too_long_even_if_valid() {
        let mut line = b"gemini://localhost/".to_vec();
        line.extend(std::iter::repeat(b'a').take(1100));
        line.extend_from_slice(b"\r\n");
        assert_eq!(Request::parse_gemini(&line), Err(RequestError::TooLong));
    }

    #[test]
    fn gemini_limit_counts_terminator() {
        let prefix = b"gemini://localhost/";
        let mut line = prefix.to_vec();
        line.extend(std::iter::repeat(b'a').take(MAX_GEMINI_REQUEST - prefix.len() - 2));
        line.extend_from_slice(b"\r\n");
        assert_eq!(line.len(), MAX_GEMINI_REQUEST);
        assert!(Request::parse_gemini(&line).is_ok());

        line.insert(prefix.len(), b'a');
        assert_eq!(Request::parse_gemini(&line), Err(RequestError::TooLong));
    }

    #[test]
    fn spartan_valid() {
        let req = Request::parse_spartan(b"localhost /index.gmi 0\r\n").unwrap();
        assert_eq!(req.host, "localhost");
        assert_eq!(req.path, "/index.gmi");
        assert_eq!(req.content_length, 0);
        assert_eq!(req.protocol, Protocol::Spartan);
    }

    #[test]
    fn spartan_field_count() {
        assert_eq!(Request::parse_spartan(b"localhost /\r\n"), Err(RequestError::BadRequest));
        assert_eq!(
            Request::parse_spartan(b"localhost / 0 extra\r\n"),
            Err(RequestError::BadRequest)
        );
        assert_eq!(Request::parse_spartan(b"\r\n"), Err(RequestError::BadRequest));
    }

    #[test]
    fn spartan_missing_slash() {
        let err = Request::parse_spartan(b"localhost oops 0\r\n").unwrap_err();
        assert_eq!(err, RequestError::MissingSlash);
        assert_eq!(err.to_string(), "missing /");
        assert_eq!(err.status().wire_code(Protocol::Spartan), 4);
    }

    #[test]
    fn spartan_content_length() {
        assert_eq!(
            Request::parse_spartan(b"localhost / -1\r\n"),
            Err(RequestError::InvalidContentLength)
        );
        assert_eq!(
            Request::parse_spartan(b"localhost / lots\r\n"),
            Err(RequestError::InvalidContentLength)
        );
    }

    #[test]
    fn spartan_positive_length_is_server_error_regardless_of_path() {
        for line in [&b"localhost /ok 5\r\n"[..], b"localhost oops 12\r\n"] {
            let err = Request::parse_spartan(line).unwrap_err();
            assert_eq!(err, RequestError::DataBlockUnsupported);
            assert_eq!(err.status().wire_code(Protocol::Spartan), 5);
        }
    }

    #[test]
    fn spartan_truncated_line_is_refused() {
        let mut line = b"localhost /README.gmi ".to_vec();
        line.extend(std::iter::repeat(b'0').take(MAX_SPARTAN_REQUEST));
        line.truncate(MAX_SPARTAN_REQUEST);
        assert_eq!(Request::parse_spartan(&line), Err(RequestError::BadRequest));

        line.truncate(MAX_SPARTAN_REQUEST - 2);
        line.extend_from_slice(b"\r\n");
        assert!(Request::parse_spartan(&line).is_ok());
    }

    #[test]
    fn malformed_vs_invalid() {
        assert!(RequestError::BadRequest.is_malformed());
        assert!(!RequestError::Fragment.is_malformed());
        assert!(!RequestError::DataBlockUnsupported.is_malformed());
    }
}
