//! Request driver.
//!
//! ```text
//! Dial ─▶ Sent ─▶ AwaitStatus ─┬─▶ Terminal (Response)
//!  ▲                           │
//!  └──────── Redirect ◀────────┘   hops > MAX_REDIRECTS → error
//! ```
//!
//! # Design Decisions
//! - The scheme of each hop picks the protocol; a chain never switches
//! - A Spartan data block is sent to the first hop only
//! - Trust is checked on every Gemini hop before anything is written

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio_rustls::TlsConnector;
use url::{Host, Url};

use super::trust::TrustValidator;
use super::verifier::client_config;
use super::{ClientError, Response, Transport, CONNECT_TIMEOUT, MAX_REDIRECTS, MAX_RESPONSE_HEADER};
use crate::protocol::{read_line_bounded, trim_terminator, Line, Protocol, StatusClass, MAX_GEMINI_REQUEST};

/// Upload for a Spartan request.
pub struct Data {
    length: u64,
    source: Box<dyn AsyncRead + Send + Unpin>,
}

impl Data {
    /// Declare `length` bytes to be read from `source`.
    ///
    /// The source must yield exactly `length` bytes or the request fails.
    pub fn from_reader(length: u64, source: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self {
            length,
            source: Box::new(source),
        }
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        let bytes = bytes.into();
        Self::from_reader(bytes.len() as u64, std::io::Cursor::new(bytes))
    }

    pub fn len(&self) -> u64 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
}

impl std::fmt::Debug for Data {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Data").field("length", &self.length).finish_non_exhaustive()
    }
}

/// Fetches Gemini and Spartan URLs, following redirects.
#[derive(Clone)]
pub struct Requester {
    connector: TlsConnector,
    validator: TrustValidator,
    connect_timeout: Duration,
}

impl Requester {
    pub fn new() -> Result<Self, ClientError> {
        Ok(Self {
            connector: TlsConnector::from(Arc::new(client_config()?)),
            validator: TrustValidator::new(),
            connect_timeout: CONNECT_TIMEOUT,
        })
    }

    /// Bound each dial, TLS handshake included.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub async fn get(&self, url: &str) -> Result<Response, ClientError> {
        self.request(url, None).await
    }

    /// Fetch `url`, uploading `data` when it is a Spartan URL.
    pub async fn request(&self, url: &str, data: Option<Data>) -> Result<Response, ClientError> {
        let mut url = Url::parse(url).map_err(|e| ClientError::InvalidUrl(format!("{}: {}", url, e)))?;
        let protocol = Protocol::from_scheme(url.scheme())
            .ok_or_else(|| ClientError::UnsupportedScheme(url.scheme().to_string()))?;
        if protocol == Protocol::Gemini && data.is_some() {
            return Err(ClientError::DataUnsupported);
        }

        let mut data = data;
        let mut hops = 0;
        loop {
            let mut response = self.fetch(&url, protocol, data.take()).await?;
            if response.class() != StatusClass::Redirect {
                response.redirects = hops;
                return Ok(response);
            }

            let next = redirect_target(&url, protocol, response.meta())?;
            hops += 1;
            if hops > MAX_REDIRECTS {
                return Err(ClientError::TooManyRedirects);
            }
            tracing::debug!(from = %url, to = %next, hops, "Following redirect");
            // The old connection is dropped before the next dial.
            drop(response);
            url = next;
        }
    }

    async fn fetch(
        &self,
        url: &Url,
        protocol: Protocol,
        data: Option<Data>,
    ) -> Result<Response, ClientError> {
        let host = dial_host(url)?;
        let port = url.port().unwrap_or(protocol.default_port());

        let (mut transport, certificate) = match protocol {
            Protocol::Gemini => {
                let (transport, leaf) =
                    Transport::tls(&self.connector, &host, port, self.connect_timeout).await?;
                self.validator.verify(leaf.as_ref(), &host)?;
                (transport, Some(leaf))
            }
            Protocol::Spartan => {
                (Transport::plain(&host, port, self.connect_timeout).await?, None)
            }
        };

        match protocol {
            Protocol::Gemini => send_gemini(&mut transport, url).await?,
            Protocol::Spartan => send_spartan(&mut transport, url, data).await?,
        }

        let mut body = BufReader::new(transport);
        let (status, meta) = read_header(&mut body, protocol).await?;
        tracing::debug!(%url, status, meta = %meta, "Response header received");

        Ok(Response {
            url: url.clone(),
            protocol,
            status,
            meta,
            certificate,
            redirects: 0,
            body,
        })
    }
}

impl std::fmt::Debug for Requester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Requester")
            .field("connect_timeout", &self.connect_timeout)
            .finish_non_exhaustive()
    }
}

/// Host as passed to the resolver and the certificate check: IPv6 without
/// brackets.
fn dial_host(url: &Url) -> Result<String, ClientError> {
    match url.host() {
        Some(Host::Domain(domain)) if !domain.is_empty() => Ok(domain.to_string()),
        Some(Host::Ipv4(ip)) => Ok(ip.to_string()),
        Some(Host::Ipv6(ip)) => Ok(ip.to_string()),
        _ => Err(ClientError::InvalidUrl(format!("{}: missing host", url))),
    }
}

async fn send_gemini<W>(sink: &mut W, url: &Url) -> Result<(), ClientError>
where
    W: AsyncWrite + Unpin,
{
    // The limit covers the terminator.
    if url.as_str().len() + 2 > MAX_GEMINI_REQUEST {
        return Err(ClientError::InvalidUrl(format!("{}: too long", url)));
    }
    sink.write_all(format!("{}\r\n", url).as_bytes()).await?;
    sink.flush().await?;
    Ok(())
}

async fn send_spartan<W>(sink: &mut W, url: &Url, data: Option<Data>) -> Result<(), ClientError>
where
    W: AsyncWrite + Unpin,
{
    let host = url.host_str().unwrap_or_default();
    let path = match url.path() {
        "" => "/",
        path => path,
    };
    let length = data.as_ref().map_or(0, Data::len);
    sink.write_all(format!("{} {} {}\r\n", host, path, length).as_bytes())
        .await?;

    if let Some(mut data) = data {
        let written = tokio::io::copy(&mut (&mut data.source).take(length), sink).await?;
        if written != length {
            return Err(ClientError::InvalidDataLength {
                declared: length,
                written,
            });
        }
        let mut probe = [0u8; 1];
        if data.source.read(&mut probe).await? != 0 {
            return Err(ClientError::InvalidDataLength {
                declared: length,
                written: length + 1,
            });
        }
    }
    sink.flush().await?;
    Ok(())
}

/// Read and validate `<status> <meta>\r\n`.
async fn read_header<R>(reader: &mut R, protocol: Protocol) -> Result<(u8, String), ClientError>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    let line = match read_line_bounded(reader, MAX_RESPONSE_HEADER).await? {
        Line::Complete(line) => line,
        Line::Truncated(_) | Line::Eof(_) => return Err(ClientError::MalformedHeader),
    };
    let line = std::str::from_utf8(trim_terminator(&line)).map_err(|_| ClientError::MalformedHeader)?;
    let (status, meta) = line.split_once(' ').unwrap_or((line, ""));

    match protocol {
        Protocol::Gemini if status.len() < 2 => return Err(ClientError::MalformedHeader),
        Protocol::Spartan if status.len() != 1 => return Err(ClientError::MalformedStatus),
        _ => {}
    }
    let code = status
        .parse::<u8>()
        .ok()
        .filter(|code| StatusClass::from_wire(protocol, *code).is_some())
        .ok_or_else(|| ClientError::InvalidStatus(status.to_string()))?;

    Ok((code, meta.trim().to_string()))
}

/// Resolve a redirect header against the current URL and apply the
/// protocol's redirect policy.
fn redirect_target(current: &Url, protocol: Protocol, location: &str) -> Result<Url, ClientError> {
    let next = current
        .join(location)
        .map_err(|e| ClientError::InvalidRedirect(format!("{}: {}", location, e)))?;

    match protocol {
        Protocol::Gemini if next.scheme() != "gemini" => Err(ClientError::InvalidRedirect(format!(
            "{}: not a gemini url",
            next
        ))),
        Protocol::Spartan
            if next.scheme() != "spartan"
                || next.host_str() != current.host_str()
                || spartan_port(&next) != spartan_port(current) =>
        {
            Err(ClientError::CrossSiteRedirect)
        }
        _ => Ok(next),
    }
}

fn spartan_port(url: &Url) -> u16 {
    url.port().unwrap_or(Protocol::Spartan.default_port())
}
