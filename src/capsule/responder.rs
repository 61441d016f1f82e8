//! Request → response state machine.
//!
//! ```text
//! Start ──parse──▶ Validated ──resolve──▶ Resolved ──▶ Served
//!   │                 │  │                   │
//!   │                 │  └──directory──▶ Redirected
//!   ▼                 ▼                      ▼
//! Failed ◀────────── missing ◀──── open / handler failure
//! ```
//!
//! Every terminal state writes at most one status line. Failures are written
//! by `handle` from the returned `ServeError`, so no branch writes its own
//! error line. A dynamic handler that fails after writing output gets no
//! second line.

use std::io;
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::{Capsule, Resource, ResponseEmitter, ServeError};
use crate::protocol::{Protocol, Request, Status};

/// How a request was answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// A static resource was streamed.
    Served { mime: &'static str, bytes: u64 },
    /// A Spartan directory redirect was sent.
    Redirected { location: String },
    /// The dynamic handler produced the response.
    Dynamic,
}

impl Outcome {
    /// Status written by the engine itself. `None` for dynamic responses.
    pub fn status(&self) -> Option<Status> {
        match self {
            Outcome::Served { .. } => Some(Status::Success),
            Outcome::Redirected { .. } => Some(Status::REDIRECT),
            Outcome::Dynamic => None,
        }
    }
}

impl Capsule {
    /// Answer one raw request line, writing the response to `sink`.
    ///
    /// The returned error has already been reported to the client; it is
    /// handed back for logging only.
    pub async fn handle<W>(&self, raw: &[u8], sink: &mut W) -> Result<Outcome, ServeError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let emitter = ResponseEmitter::new(self.protocol);
        let result = match Request::parse(self.protocol, raw) {
            Ok(request) => {
                tracing::debug!(host = %request.host, path = %request.path, "Request validated");
                let resource = self.resolver.resolve(&request.path).await;
                self.deliver(&request, resource, sink, &emitter).await
            }
            Err(e) => Err(ServeError::Request(e)),
        };

        let result = match result {
            Err(err) => Err(self.report(err, sink, &emitter).await),
            ok => ok,
        };

        if let Err(e) = sink.flush().await {
            tracing::debug!(error = %e, "Flush failed");
        }
        result
    }

    /// Write the status line for `err`, if it has one.
    async fn report<W>(&self, err: ServeError, sink: &mut W, emitter: &ResponseEmitter) -> ServeError
    where
        W: AsyncWrite + Unpin + Send,
    {
        if let Some((status, meta)) = err.response(self.protocol) {
            if let Err(e) = emitter.header(sink, status, &meta).await {
                tracing::debug!(error = %e, cause = %err, "Failed to report error");
                return ServeError::Transport(e);
            }
        }
        err
    }

    async fn deliver<W>(
        &self,
        request: &Request,
        resource: Resource,
        sink: &mut W,
        emitter: &ResponseEmitter,
    ) -> Result<Outcome, ServeError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        match resource {
            Resource::Missing => Err(ServeError::ResourceMissing(request.path.clone())),
            Resource::Directory { location } => {
                emitter.header(sink, Status::REDIRECT, &location).await?;
                Ok(Outcome::Redirected { location })
            }
            Resource::Dynamic { path } => {
                self.invoke(request, &path, sink).await?;
                Ok(Outcome::Dynamic)
            }
            Resource::Static { path, mime } => {
                let mut file = tokio::fs::File::open(&path)
                    .await
                    .map_err(|source| ServeError::Unreadable { path, source })?;
                emitter.header(sink, Status::Success, mime).await?;
                let bytes = emitter.body(sink, &mut file).await;
                Ok(Outcome::Served { mime, bytes })
            }
        }
    }

    /// Run the dynamic handler. A failure only becomes a status line while
    /// the handler has written nothing.
    async fn invoke<W>(&self, request: &Request, program: &Path, sink: &mut W) -> Result<(), ServeError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let argv = vec![program
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()];
        let env = cgi_environment(request);

        tracing::debug!(program = %program.display(), "Invoking dynamic handler");
        let mut counted = CountingSink::new(sink);
        let result = self.handler.invoke(program, &argv, &env, &mut counted).await;
        match result {
            Ok(()) => Ok(()),
            Err(source) if counted.written() == 0 => Err(ServeError::DynamicHandler(source)),
            Err(source) => Err(ServeError::HandlerAborted {
                written: counted.written(),
                source,
            }),
        }
    }
}

/// Counts the bytes that reach the wrapped writer.
struct CountingSink<'a, W> {
    inner: &'a mut W,
    written: u64,
}

impl<'a, W> CountingSink<'a, W> {
    fn new(inner: &'a mut W) -> Self {
        Self { inner, written: 0 }
    }

    fn written(&self) -> u64 {
        self.written
    }
}

impl<W> AsyncWrite for CountingSink<'_, W>
where
    W: AsyncWrite + Unpin,
{
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut *this.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(n)) = &poll {
            this.written += *n as u64;
        }
        poll
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut *self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut *self.get_mut().inner).poll_shutdown(cx)
    }
}

/// Environment handed to dynamic handlers.
pub fn cgi_environment(request: &Request) -> Vec<(String, String)> {
    let mut env = vec![
        ("GATEWAY_INTERFACE".to_string(), "CGI/1.1".to_string()),
        ("SERVER_PROTOCOL".to_string(), request.protocol.name().to_string()),
        (
            "SERVER_SOFTWARE".to_string(),
            format!("capsule/{}", env!("CARGO_PKG_VERSION")),
        ),
        ("SERVER_NAME".to_string(), request.host.clone()),
        ("SCRIPT_NAME".to_string(), request.path.clone()),
    ];
    match request.protocol {
        Protocol::Gemini => {
            if let Some(query) = &request.query {
                env.push(("QUERY_STRING".to_string(), query.clone()));
            }
        }
        Protocol::Spartan => {
            env.push(("CONTENT_LENGTH".to_string(), request.content_length.to_string()));
        }
    }
    env
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup<'a>(env: &'a [(String, String)], key: &str) -> Option<&'a str> {
        env.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    #[test]
    fn gemini_environment() {
        let request = Request::parse_gemini(b"gemini://example.org/app.cgi?q=1\r\n").unwrap();
        let env = cgi_environment(&request);
        assert_eq!(lookup(&env, "GATEWAY_INTERFACE"), Some("CGI/1.1"));
        assert_eq!(lookup(&env, "SERVER_PROTOCOL"), Some("gemini"));
        assert_eq!(lookup(&env, "QUERY_STRING"), Some("q=1"));
        assert_eq!(lookup(&env, "SERVER_NAME"), Some("example.org"));
        assert_eq!(lookup(&env, "CONTENT_LENGTH"), None);
    }

    #[test]
    fn spartan_environment() {
        let request = Request::parse_spartan(b"example.org /app.cgi 0\r\n").unwrap();
        let env = cgi_environment(&request);
        assert_eq!(lookup(&env, "SERVER_PROTOCOL"), Some("spartan"));
        assert_eq!(lookup(&env, "CONTENT_LENGTH"), Some("0"));
        assert_eq!(lookup(&env, "SCRIPT_NAME"), Some("/app.cgi"));
    }

    async fn vanished_after_resolve(protocol: Protocol) -> (Vec<u8>, ServeError) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("gone.gmi"), "# gone\n").unwrap();
        let capsule = Capsule::new(protocol, dir.path()).unwrap();
        let raw: &[u8] = match protocol {
            Protocol::Gemini => b"gemini://localhost/gone.gmi\r\n",
            Protocol::Spartan => b"localhost /gone.gmi 0\r\n",
        };
        let request = Request::parse(protocol, raw).unwrap();

        let resource = capsule.resolver.resolve(&request.path).await;
        assert!(matches!(resource, Resource::Static { .. }));
        std::fs::remove_file(dir.path().join("gone.gmi")).unwrap();

        let emitter = ResponseEmitter::new(protocol);
        let mut sink = Vec::new();
        let err = capsule
            .deliver(&request, resource, &mut sink, &emitter)
            .await
            .unwrap_err();
        let err = capsule.report(err, &mut sink, &emitter).await;
        (sink, err)
    }

    #[tokio::test]
    async fn unreadable_static_resource() {
        let (sink, err) = vanished_after_resolve(Protocol::Gemini).await;
        assert!(matches!(err, ServeError::Unreadable { .. }));
        assert_eq!(sink, b"51 not found\r\n");

        let (sink, err) = vanished_after_resolve(Protocol::Spartan).await;
        assert!(matches!(err, ServeError::Unreadable { .. }));
        assert_eq!(sink, b"5 unreadable\r\n");
    }

    #[tokio::test]
    async fn counting_sink_tracks_written_bytes() {
        let mut out = Vec::new();
        let mut counted = CountingSink::new(&mut out);
        counted.write_all(b"20 text/plain\r\n").await.unwrap();
        counted.write_all(b"body").await.unwrap();
        assert_eq!(counted.written(), 19);
        assert_eq!(out, b"20 text/plain\r\nbody");
    }
}
