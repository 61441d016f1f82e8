//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use capsule_engine::capsule::{CgiError, DynamicHandler};
use capsule_engine::net::load_tls_acceptor;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

/// A capsule root with a small, known tree.
///
/// ```text
/// README.gmi      index.gmi      notes.txt      blob
/// about.gmi       docs/index.gmi app.cgi
/// ```
pub fn capsule_root() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    std::fs::write(root.join("README.gmi"), "# README\n\nHello, capsule.\n").unwrap();
    std::fs::write(root.join("index.gmi"), "# Home\n").unwrap();
    std::fs::write(root.join("about.gmi"), "# About\n").unwrap();
    std::fs::write(root.join("notes.txt"), "plain notes\n").unwrap();
    std::fs::write(root.join("blob"), [0u8, 159, 146, 150]).unwrap();
    std::fs::write(root.join("app.cgi"), "#!/bin/sh\n").unwrap();
    std::fs::create_dir(root.join("docs")).unwrap();
    std::fs::write(root.join("docs").join("index.gmi"), "# Docs\n").unwrap();
    dir
}

/// Self-signed certificate files for `names` (DNS names or IP literals).
pub struct TestCert {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    pub der: Vec<u8>,
}

pub fn write_cert(dir: &Path, names: &[&str]) -> TestCert {
    write_cert_with(dir, names, None)
}

/// Like `write_cert`, with an explicit validity window.
pub fn write_cert_with(
    dir: &Path,
    names: &[&str],
    validity: Option<((i32, u8, u8), (i32, u8, u8))>,
) -> TestCert {
    let mut params = rcgen::CertificateParams::default();
    params.subject_alt_names = names
        .iter()
        .map(|name| match name.parse::<IpAddr>() {
            Ok(ip) => rcgen::SanType::IpAddress(ip),
            Err(_) => rcgen::SanType::DnsName(name.to_string()),
        })
        .collect();
    if let Some((from, to)) = validity {
        params.not_before = rcgen::date_time_ymd(from.0, from.1, from.2);
        params.not_after = rcgen::date_time_ymd(to.0, to.1, to.2);
    }
    let cert = rcgen::Certificate::from_params(params).unwrap();

    let cert_path = dir.join("cert.pem");
    let key_path = dir.join("key.pem");
    // rcgen re-signs on every serialize call, so derive the DER from the PEM
    // actually written rather than serializing a second time.
    let pem = cert.serialize_pem().unwrap();
    std::fs::write(&cert_path, &pem).unwrap();
    std::fs::write(&key_path, cert.serialize_private_key_pem()).unwrap();
    let der = rustls_pemfile::certs(&mut pem.as_bytes())
        .next()
        .unwrap()
        .unwrap()
        .to_vec();

    TestCert {
        cert_path,
        key_path,
        der,
    }
}

pub fn acceptor(cert: &TestCert) -> TlsAcceptor {
    load_tls_acceptor(&cert.cert_path, &cert.key_path).unwrap()
}

/// What a mock server saw.
#[derive(Debug, Clone, Default)]
pub struct MockLog {
    connections: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<String>>>,
    uploads: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl MockLog {
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Request lines, terminator stripped.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    /// Spartan data blocks, one per request.
    pub fn uploads(&self) -> Vec<Vec<u8>> {
        self.uploads.lock().unwrap().clone()
    }
}

/// Start a mock capsule on 127.0.0.1 that answers each request line with
/// whatever `respond` returns.
///
/// With an acceptor it speaks TLS (Gemini); without, plain TCP (Spartan). For
/// Spartan requests the data block announced in the request line is read and
/// logged before responding.
pub async fn start_mock_server<F>(tls: Option<TlsAcceptor>, respond: F) -> (SocketAddr, MockLog)
where
    F: Fn(&str) -> String + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let log = MockLog::default();
    let respond = Arc::new(respond);

    let server_log = log.clone();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            server_log.connections.fetch_add(1, Ordering::SeqCst);
            let log = server_log.clone();
            let respond = Arc::clone(&respond);
            let tls = tls.clone();
            tokio::spawn(async move {
                match tls {
                    Some(acceptor) => {
                        if let Ok(stream) = acceptor.accept(socket).await {
                            exchange(stream, &log, respond.as_ref()).await;
                        }
                    }
                    None => exchange(socket, &log, respond.as_ref()).await,
                }
            });
        }
    });

    (addr, log)
}

async fn exchange<S, F>(stream: S, log: &MockLog, respond: &F)
where
    S: AsyncRead + AsyncWrite + Unpin,
    F: Fn(&str) -> String + ?Sized,
{
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    match tokio::io::AsyncBufReadExt::read_line(&mut reader, &mut line).await {
        Ok(0) | Err(_) => return,
        Ok(_) => {}
    }
    let line = line.trim_end().to_string();

    let declared = line
        .rsplit(' ')
        .next()
        .and_then(|n| n.parse::<usize>().ok())
        .unwrap_or(0);
    if declared > 0 {
        let mut data = vec![0u8; declared];
        if reader.read_exact(&mut data).await.is_ok() {
            log.uploads.lock().unwrap().push(data);
        }
    }
    log.requests.lock().unwrap().push(line.clone());

    let response = respond(&line);
    let mut stream = reader.into_inner();
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

/// Dynamic handler that records invocations and writes a canned response,
/// optionally failing afterwards.
#[derive(Debug, Default)]
pub struct FakeHandler {
    pub output: Vec<u8>,
    pub fail: bool,
    pub calls: Mutex<Vec<(PathBuf, Vec<String>, Vec<(String, String)>)>>,
}

impl FakeHandler {
    pub fn writing(output: &str) -> Self {
        Self {
            output: output.as_bytes().to_vec(),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn env_of(&self, call: usize, key: &str) -> Option<String> {
        let calls = self.calls.lock().unwrap();
        calls[call]
            .2
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }
}

#[async_trait]
impl DynamicHandler for FakeHandler {
    async fn invoke(
        &self,
        program: &Path,
        argv: &[String],
        env: &[(String, String)],
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<(), CgiError> {
        self.calls
            .lock()
            .unwrap()
            .push((program.to_path_buf(), argv.to_vec(), env.to_vec()));
        sink.write_all(&self.output)
            .await
            .map_err(|e| CgiError::Other(e.to_string()))?;
        if self.fail {
            return Err(CgiError::Other("fake failure".to_string()));
        }
        Ok(())
    }
}
