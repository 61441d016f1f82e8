//! Status line and body writer.

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::protocol::{Protocol, Status};

/// Writes responses in one protocol's numeric convention.
#[derive(Debug, Clone, Copy)]
pub struct ResponseEmitter {
    protocol: Protocol,
}

impl ResponseEmitter {
    pub fn new(protocol: Protocol) -> Self {
        Self { protocol }
    }

    /// Format `"<code> <meta>\r\n"`.
    pub fn status_line(&self, status: Status, meta: &str) -> String {
        format!("{} {}\r\n", status.wire_code(self.protocol), meta)
    }

    pub async fn header<W>(&self, sink: &mut W, status: Status, meta: &str) -> std::io::Result<()>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        sink.write_all(self.status_line(status, meta).as_bytes()).await
    }

    /// Copy a resource body to the sink.
    ///
    /// Best effort: a failed copy is logged and the byte count reported as
    /// zero. The caller closes the connection either way.
    pub async fn body<W, R>(&self, sink: &mut W, body: &mut R) -> u64
    where
        W: AsyncWrite + Unpin + ?Sized,
        R: AsyncRead + Unpin + ?Sized,
    {
        match tokio::io::copy(body, sink).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::debug!(error = %e, "Body copy aborted");
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gemini_writes_two_digits() {
        let emitter = ResponseEmitter::new(Protocol::Gemini);
        assert_eq!(emitter.status_line(Status::NotFound, "not found"), "51 not found\r\n");
    }

    #[test]
    fn spartan_writes_class_digit() {
        let emitter = ResponseEmitter::new(Protocol::Spartan);
        assert_eq!(emitter.status_line(Status::NotFound, "not found"), "5 not found\r\n");
        assert_eq!(emitter.status_line(Status::REDIRECT, "/docs/"), "3 /docs/\r\n");
    }

    #[tokio::test]
    async fn header_then_body() {
        let emitter = ResponseEmitter::new(Protocol::Gemini);
        let mut sink = Vec::new();
        let mut body: &[u8] = b"# hello\n";

        emitter.header(&mut sink, Status::Success, "text/gemini").await.unwrap();
        let copied = emitter.body(&mut sink, &mut body).await;

        assert_eq!(copied, 8);
        assert_eq!(sink, b"20 text/gemini\r\n# hello\n");
    }
}
