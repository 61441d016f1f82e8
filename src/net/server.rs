//! Accept loop and per-connection driver.
//!
//! # Responsibilities
//! - Accept connections until shutdown, one task per connection
//! - Optional TLS handshake and a bounded, timed request-line read
//! - Hand the line to `Capsule::handle`, then record and close
//! - Drain in-flight connections for a bounded time on shutdown
//!
//! # Design Decisions
//! - One request per connection; the stream is shut down after the response
//! - The request timeout covers the handshake and the request line, not the
//!   response body or a dynamic handler
//! - A silent peer (EOF before any byte) gets no response

use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio_rustls::TlsAcceptor;
use tracing::Instrument;

use super::connection::{ConnectionId, ConnectionTracker};
use super::listener::{Listener, ListenerError};
use super::tls::{load_tls_acceptor, TlsError};
use crate::capsule::{Capsule, Outcome, ServeError};
use crate::config::ServerConfig;
use crate::observability::{metrics, tracing as correlation};
use crate::protocol::{read_line_bounded, Line, Protocol};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error("invalid capsule root {}: {source}", .root.display())]
    Root {
        root: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("gemini requires a TLS certificate and key")]
    TlsRequired,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Serves one capsule on one listener.
#[derive(Clone)]
pub struct CapsuleServer {
    capsule: Arc<Capsule>,
    tls: Option<TlsAcceptor>,
    request_timeout: Duration,
    drain_timeout: Duration,
    tracker: ConnectionTracker,
}

impl CapsuleServer {
    pub fn new(capsule: Capsule) -> Self {
        Self {
            capsule: Arc::new(capsule),
            tls: None,
            request_timeout: Duration::from_secs(30),
            drain_timeout: Duration::from_secs(10),
            tracker: ConnectionTracker::new(),
        }
    }

    pub fn with_tls(mut self, acceptor: TlsAcceptor) -> Self {
        self.tls = Some(acceptor);
        self
    }

    pub fn with_timeouts(mut self, request: Duration, drain: Duration) -> Self {
        self.request_timeout = request;
        self.drain_timeout = drain;
        self
    }

    /// Build the capsule, TLS acceptor and timeouts from a validated config.
    pub fn from_config(config: &ServerConfig) -> Result<Self, ServerError> {
        let root = &config.capsule.root;
        let capsule = Capsule::new(config.capsule.protocol, root).map_err(|source| ServerError::Root {
            root: root.clone(),
            source,
        })?;

        let mut server = Self::new(capsule).with_timeouts(
            Duration::from_secs(config.timeouts.request_secs),
            Duration::from_secs(config.timeouts.drain_secs),
        );
        if let Some(tls) = &config.listener.tls {
            server = server.with_tls(load_tls_acceptor(&tls.cert_path, &tls.key_path)?);
        }
        Ok(server)
    }

    pub fn capsule(&self) -> &Capsule {
        &self.capsule
    }

    pub fn tracker(&self) -> &ConnectionTracker {
        &self.tracker
    }

    /// Accept until `shutdown` fires, then drain.
    pub async fn run(
        &self,
        listener: Listener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        let protocol = self.capsule.protocol();
        if protocol == Protocol::Gemini && self.tls.is_none() {
            return Err(ServerError::TlsRequired);
        }

        tracing::info!(
            address = %listener.local_addr()?,
            %protocol,
            root = %self.capsule.root().display(),
            "Capsule server starting"
        );

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer, permit)) => {
                        let guard = self.tracker.track();
                        let capsule = Arc::clone(&self.capsule);
                        let tls = self.tls.clone();
                        let request_timeout = self.request_timeout;
                        let span = correlation::request_span(protocol, guard.id(), Some(peer));

                        tokio::spawn(
                            async move {
                                let _permit = permit;
                                let _guard = guard;
                                serve_connection(&capsule, tls, stream, request_timeout).await;
                            }
                            .instrument(span),
                        );
                    }
                    Err(ListenerError::Closed) => break,
                    Err(e) => {
                        tracing::warn!(error = %e, "Accept failed");
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                },
                _ = shutdown.recv() => {
                    tracing::info!("Shutdown signal received, no longer accepting");
                    break;
                }
            }
        }

        drop(listener);
        if self.tracker.drain(self.drain_timeout).await {
            tracing::info!("All connections drained");
        } else {
            tracing::warn!(
                remaining = self.tracker.active_count(),
                "Drain deadline passed, abandoning connections"
            );
        }
        Ok(())
    }
}

impl std::fmt::Debug for CapsuleServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapsuleServer")
            .field("capsule", &self.capsule)
            .field("tls", &self.tls.is_some())
            .field("request_timeout", &self.request_timeout)
            .field("drain_timeout", &self.drain_timeout)
            .finish()
    }
}

async fn serve_connection(
    capsule: &Capsule,
    tls: Option<TlsAcceptor>,
    stream: TcpStream,
    request_timeout: Duration,
) {
    let deadline = Instant::now() + request_timeout;
    match tls {
        Some(acceptor) => {
            let stream = match tokio::time::timeout(request_timeout, acceptor.accept(stream)).await {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => {
                    tracing::debug!(error = %e, "TLS handshake failed");
                    return;
                }
                Err(_) => {
                    tracing::debug!("TLS handshake timed out");
                    return;
                }
            };
            let remaining = deadline.saturating_duration_since(Instant::now());
            serve_stream(capsule, stream, remaining).await;
        }
        None => {
            serve_stream(capsule, stream, request_timeout).await;
        }
    }
}

/// Answer one request on an established stream, then shut it down.
///
/// Returns `None` when no request was read.
pub async fn serve_stream<S>(
    capsule: &Capsule,
    stream: S,
    read_timeout: Duration,
) -> Option<Result<Outcome, ServeError>>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let protocol = capsule.protocol();
    let mut stream = BufReader::new(stream);

    let line = match tokio::time::timeout(read_timeout, read_line_bounded(&mut stream, protocol.request_limit())).await {
        Ok(Ok(line)) => line,
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "Request read failed");
            return None;
        }
        Err(_) => {
            tracing::debug!("Request read timed out");
            return None;
        }
    };
    let raw = match line {
        Line::Eof(raw) if raw.is_empty() => {
            tracing::debug!("Peer closed without a request");
            return None;
        }
        Line::Complete(raw) | Line::Truncated(raw) | Line::Eof(raw) => raw,
    };

    let result = answer(capsule, &raw, &mut stream).await;

    if let Err(e) = stream.into_inner().shutdown().await {
        tracing::debug!(error = %e, "Shutdown failed");
    }
    Some(result)
}

/// Handle `raw`, logging and recording the result.
async fn answer<W>(capsule: &Capsule, raw: &[u8], sink: &mut W) -> Result<Outcome, ServeError>
where
    W: AsyncWrite + Unpin + Send,
{
    let protocol = capsule.protocol();
    let start = Instant::now();
    let result = capsule.handle(raw, sink).await;

    let status = match &result {
        Ok(outcome) => outcome.status(),
        Err(e) => e.response(protocol).map(|(status, _)| status),
    }
    .map(|status| status.wire_code(protocol));
    metrics::record_request(protocol, status, start);

    match &result {
        Ok(outcome) => tracing::info!(
            status = ?status,
            outcome = ?outcome,
            duration_ms = start.elapsed().as_millis() as u64,
            "Request completed"
        ),
        Err(e) => tracing::warn!(
            status = ?status,
            error = %e,
            duration_ms = start.elapsed().as_millis() as u64,
            "Request failed"
        ),
    }
    result
}

/// Serve exactly one request read from stdin, answering on stdout.
pub async fn serve_stdio(capsule: &Capsule) -> Result<Option<Outcome>, ServerError> {
    let span = correlation::request_span(capsule.protocol(), ConnectionId::new(), None);
    stdio_exchange(capsule).instrument(span).await
}

async fn stdio_exchange(capsule: &Capsule) -> Result<Option<Outcome>, ServerError> {
    let mut input = BufReader::new(tokio::io::stdin());
    let raw = match read_line_bounded(&mut input, capsule.protocol().request_limit()).await? {
        Line::Eof(raw) if raw.is_empty() => return Ok(None),
        Line::Complete(raw) | Line::Truncated(raw) | Line::Eof(raw) => raw,
    };

    let mut output = tokio::io::stdout();
    let result = answer(capsule, &raw, &mut output).await;
    output.flush().await?;
    match result {
        Ok(outcome) => Ok(Some(outcome)),
        Err(ServeError::Transport(e)) => Err(ServerError::Io(e)),
        // Already reported to the client.
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    fn spartan_capsule() -> (tempfile::TempDir, Capsule) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.gmi"), "# home\n").unwrap();
        let capsule = Capsule::new(Protocol::Spartan, dir.path()).unwrap();
        (dir, capsule)
    }

    #[tokio::test]
    async fn serves_one_request_over_a_duplex() {
        let (_dir, capsule) = spartan_capsule();
        let (mut client, server) = tokio::io::duplex(1024);

        client.write_all(b"localhost / 0\r\n").await.unwrap();
        let served = serve_stream(&capsule, server, Duration::from_secs(5)).await;
        assert!(matches!(served, Some(Ok(Outcome::Served { .. }))));

        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();
        assert_eq!(response, b"2 text/gemini\r\n# home\n");
    }

    #[tokio::test]
    async fn overlong_spartan_line_is_refused() {
        let (_dir, capsule) = spartan_capsule();
        let (mut client, server) = tokio::io::duplex(8192);

        let mut request = b"localhost / ".to_vec();
        request.extend(std::iter::repeat(b'0').take(4100));
        request.extend_from_slice(b"1\r\n");
        client.write_all(&request).await.unwrap();

        let served = serve_stream(&capsule, server, Duration::from_secs(5)).await;
        assert!(matches!(served, Some(Err(ServeError::Request(_)))));

        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();
        assert_eq!(response, b"4 bad request\r\n");
    }

    #[tokio::test]
    async fn silent_peer_gets_nothing() {
        let (_dir, capsule) = spartan_capsule();
        let (client, server) = tokio::io::duplex(1024);
        drop(client);

        assert!(serve_stream(&capsule, server, Duration::from_secs(5)).await.is_none());
    }

    #[tokio::test]
    async fn slow_request_times_out() {
        let (_dir, capsule) = spartan_capsule();
        let (mut client, server) = tokio::io::duplex(1024);
        client.write_all(b"localhost /").await.unwrap();

        assert!(serve_stream(&capsule, server, Duration::from_millis(50)).await.is_none());
    }

    #[tokio::test]
    async fn gemini_without_tls_refuses_to_run() {
        let dir = tempfile::tempdir().unwrap();
        let server = CapsuleServer::new(Capsule::new(Protocol::Gemini, dir.path()).unwrap());
        let listener = Listener::bind("127.0.0.1:0", 4).await.unwrap();
        let (_tx, rx) = broadcast::channel(1);

        assert!(matches!(server.run(listener, rx).await, Err(ServerError::TlsRequired)));
    }
}
