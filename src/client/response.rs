//! The terminal response of a request chain.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use rustls::pki_types::CertificateDer;
use tokio::io::{AsyncRead, AsyncWriteExt, BufReader, ReadBuf};
use url::Url;

use super::trust::Fingerprint;
use super::Transport;
use crate::protocol::{Protocol, StatusClass};

/// Status, header and a lazily read body.
///
/// The connection stays open until `close` is called or the response is
/// dropped.
#[derive(Debug)]
pub struct Response {
    pub(super) url: Url,
    pub(super) protocol: Protocol,
    pub(super) status: u8,
    pub(super) meta: String,
    pub(super) certificate: Option<CertificateDer<'static>>,
    pub(super) redirects: usize,
    pub(super) body: BufReader<Transport>,
}

impl Response {
    /// URL of the final hop.
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Status code exactly as received.
    pub fn status(&self) -> u8 {
        self.status
    }

    pub fn class(&self) -> StatusClass {
        // Validated when the header was read.
        StatusClass::from_wire(self.protocol, self.status).unwrap_or(StatusClass::ServerError)
    }

    /// The header text after the status code: a MIME type, redirect target or
    /// error message.
    pub fn meta(&self) -> &str {
        &self.meta
    }

    /// DER bytes of the server's leaf certificate. `None` for Spartan.
    pub fn certificate(&self) -> Option<&[u8]> {
        self.certificate.as_ref().map(|der| der.as_ref())
    }

    pub fn fingerprint(&self) -> Option<Fingerprint> {
        self.certificate().map(Fingerprint::of)
    }

    /// Redirects followed before this response.
    pub fn redirects(&self) -> usize {
        self.redirects
    }

    /// Shut the connection down. A peer that already hung up is not an error.
    pub async fn close(self) -> io::Result<()> {
        let mut transport = self.body.into_inner();
        match transport.shutdown().await {
            Err(e)
                if !matches!(
                    e.kind(),
                    io::ErrorKind::NotConnected
                        | io::ErrorKind::BrokenPipe
                        | io::ErrorKind::ConnectionReset
                ) =>
            {
                Err(e)
            }
            _ => Ok(()),
        }
    }
}

impl AsyncRead for Response {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().body).poll_read(cx, buf)
    }
}
