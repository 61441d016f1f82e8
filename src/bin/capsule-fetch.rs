//! Command-line Gemini and Spartan client.
//!
//! Fetches each URL in turn. Bodies go to stdout, diagnostics to stderr.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use tokio::io::AsyncWriteExt;

use capsule_engine::client::{Data, Requester, Response};
use capsule_engine::observability::logging;
use capsule_engine::{Protocol, StatusClass};

#[derive(Parser, Debug)]
#[command(name = "capsule-fetch", version, about = "Fetch Gemini and Spartan URLs")]
struct Cli {
    /// Print the status line to stderr
    #[arg(short = 's', long = "status")]
    status: bool,

    /// Print the server certificate's SHA-512 fingerprint to stderr
    #[arg(long)]
    fingerprint: bool,

    /// Upload this file as the Spartan data block
    #[arg(long)]
    data: Option<PathBuf>,

    /// Connect timeout in seconds, TLS handshake included
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    /// Treat bare hosts as Spartan
    #[arg(long)]
    spartan: bool,

    /// URLs or bare hosts
    #[arg(required = true)]
    urls: Vec<String>,
}

impl Cli {
    fn default_scheme(&self) -> Protocol {
        if self.spartan {
            Protocol::Spartan
        } else {
            Protocol::Gemini
        }
    }
}

/// Prefix a scheme when the argument has none.
fn qualify(raw: &str, protocol: Protocol) -> String {
    if raw.contains("://") {
        raw.to_string()
    } else {
        format!("{}://{}", protocol.name(), raw)
    }
}

async fn upload(path: &Path) -> std::io::Result<Data> {
    let file = tokio::fs::File::open(path).await?;
    let length = file.metadata().await?.len();
    Ok(Data::from_reader(length, file))
}

/// Print a response the way a terminal user expects. Returns `false` for
/// responses that were not successful.
async fn report(cli: &Cli, mut response: Response) -> Result<bool, Box<dyn std::error::Error>> {
    if cli.fingerprint {
        if let Some(fingerprint) = response.fingerprint() {
            eprintln!("{}", fingerprint);
        }
    }

    let ok = match response.class() {
        StatusClass::Input => {
            eprintln!("input requests not supported");
            false
        }
        StatusClass::ClientCertificate => {
            eprintln!("client certificates not supported");
            false
        }
        StatusClass::ClientError | StatusClass::ServerError | StatusClass::Redirect => {
            eprintln!("{} {}", response.status(), response.meta());
            false
        }
        StatusClass::Success => {
            if cli.status {
                eprintln!("{} {}", response.status(), response.meta());
            }
            if response.protocol() == Protocol::Spartan || response.meta().starts_with("text/") {
                let mut stdout = tokio::io::stdout();
                tokio::io::copy(&mut response, &mut stdout).await?;
                stdout.flush().await?;
            } else {
                eprintln!("only text responses supported ({})", response.meta());
            }
            true
        }
    };

    response.close().await?;
    Ok(ok)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    logging::init_logging("warn")?;

    let requester = Requester::new()?.with_connect_timeout(Duration::from_secs(cli.timeout));
    let mut failures = 0;

    for raw in &cli.urls {
        let url = qualify(raw, cli.default_scheme());
        let data = match &cli.data {
            Some(path) => Some(upload(path).await?),
            None => None,
        };

        match requester.request(&url, data).await {
            Ok(response) => {
                tracing::debug!(%url, redirects = response.redirects(), "Fetched");
                if !report(&cli, response).await? {
                    failures += 1;
                }
            }
            Err(e) => {
                eprintln!("{}: {}", url, e);
                failures += 1;
            }
        }
    }

    if failures > 0 {
        std::process::exit(1);
    }
    Ok(())
}
