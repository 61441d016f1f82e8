//! Capsule server.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────────┐
//!                     │                  CAPSULE SERVER                  │
//!                     │                                                  │
//!   Request line      │  ┌──────────┐   ┌──────────┐   ┌─────────────┐  │
//!   ──────────────────┼─▶│   net    │──▶│ protocol │──▶│  resolver   │  │
//!                     │  │ listener │   │  parser  │   │ (root only) │  │
//!                     │  │  + tls   │   └──────────┘   └──────┬──────┘  │
//!                     │  └──────────┘                         │         │
//!                     │                                ┌──────┴──────┐  │
//!   Status + body     │  ┌──────────┐                  │ static file │  │
//!   ◀─────────────────┼──│ emitter  │◀─────────────────│  or CGI     │  │
//!                     │  └──────────┘                  └─────────────┘  │
//!                     │                                                  │
//!                     │  config · lifecycle · observability              │
//!                     └──────────────────────────────────────────────────┘
//! ```
//!
//! Configuration comes from an optional TOML file; flags override it. With
//! `--stdio` a single request is read from stdin and answered on stdout.

use std::path::PathBuf;

use clap::Parser;

use capsule_engine::config::{self, ServerConfig, TlsConfig};
use capsule_engine::lifecycle::{self, Shutdown};
use capsule_engine::net::{serve_stdio, CapsuleServer};
use capsule_engine::observability::logging;
use capsule_engine::Protocol;

#[derive(Parser, Debug)]
#[command(name = "capsule", version, about = "Serve a directory over Gemini or Spartan")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Root directory
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// Listen address (default 0.0.0.0:1965, or 0.0.0.0:300 with --spartan)
    #[arg(short, long)]
    address: Option<String>,

    /// Serve Spartan instead of Gemini
    #[arg(short, long)]
    spartan: bool,

    /// TLS certificate chain (PEM)
    #[arg(long, requires = "key")]
    cert: Option<PathBuf>,

    /// TLS private key (PEM)
    #[arg(long, requires = "cert")]
    key: Option<PathBuf>,

    /// Answer a single request on stdin/stdout
    #[arg(long)]
    stdio: bool,
}

impl Cli {
    fn apply(&self, config: &mut ServerConfig) {
        if let Some(root) = &self.root {
            config.capsule.root = root.clone();
        }
        if self.spartan {
            config.capsule.protocol = Protocol::Spartan;
        }
        if let Some(address) = &self.address {
            config.listener.bind_address = Some(address.clone());
        }
        if let (Some(cert), Some(key)) = (&self.cert, &self.key) {
            config.listener.tls = Some(TlsConfig {
                cert_path: cert.clone(),
                key_path: key.clone(),
            });
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => config::read_config(path)?,
        None => ServerConfig::default(),
    };
    cli.apply(&mut config);

    logging::init_logging(&config.observability.log_level)?;

    if cli.stdio {
        // Transport security belongs to whatever spawned us.
        config.listener.tls = None;
        let capsule = CapsuleServer::from_config(&config)?;
        serve_stdio(capsule.capsule()).await?;
        return Ok(());
    }

    if let Err(errors) = config::validate_config(&config) {
        for error in &errors {
            tracing::error!(%error, "Invalid configuration");
        }
        return Err(config::ConfigError::Validation(errors).into());
    }

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "capsule starting");

    let (server, listener) = lifecycle::start(&config).await?;

    let shutdown = Shutdown::new();
    let shutdown_rx = shutdown.subscribe();
    lifecycle::spawn_signal_handler(shutdown);

    server.run(listener, shutdown_rx).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
