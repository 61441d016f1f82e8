//! Dynamic resources.
//!
//! # Responsibilities
//! - Define the narrow `DynamicHandler` capability the responder calls
//! - Provide `ProcessHandler`, which runs the program with `tokio::process`
//!
//! # Design Decisions
//! - The handler writes the whole response itself, status line included
//! - A handler failure is only reported when nothing reached the sink, so the
//!   responder can still write its own status line
//! - No timeout: a hung program only holds its own connection

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncWrite;
use tokio::process::Command;

/// Dynamic handler failures.
#[derive(Debug, Error)]
pub enum CgiError {
    #[error("failed to start {}: {source}", .program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} exited with {status} without writing a response", .program.display())]
    Exit { program: PathBuf, status: ExitStatus },

    #[error("handler error: {0}")]
    Other(String),
}

/// Capability to run an external program for a request.
#[async_trait]
pub trait DynamicHandler: Send + Sync + std::fmt::Debug {
    /// Run `program` with `argv` and `env`, writing its output to `sink`.
    async fn invoke(
        &self,
        program: &Path,
        argv: &[String],
        env: &[(String, String)],
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<(), CgiError>;
}

/// Runs dynamic resources as child processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessHandler;

#[async_trait]
impl DynamicHandler for ProcessHandler {
    async fn invoke(
        &self,
        program: &Path,
        argv: &[String],
        env: &[(String, String)],
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<(), CgiError> {
        let mut command = Command::new(program);
        command
            .args(argv.iter().skip(1))
            .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(dir) = program.parent() {
            command.current_dir(dir);
        }
        #[cfg(unix)]
        if let Some(arg0) = argv.first() {
            command.arg0(arg0);
        }

        let mut child = command.spawn().map_err(|source| CgiError::Spawn {
            program: program.to_path_buf(),
            source,
        })?;

        let copied = match child.stdout.take() {
            Some(mut stdout) => tokio::io::copy(&mut stdout, sink).await,
            None => Ok(0),
        };

        let status = child.wait().await.map_err(|source| CgiError::Spawn {
            program: program.to_path_buf(),
            source,
        })?;

        match copied {
            Ok(0) if !status.success() => Err(CgiError::Exit {
                program: program.to_path_buf(),
                status,
            }),
            Ok(bytes) => {
                if !status.success() {
                    tracing::warn!(
                        program = %program.display(),
                        %status,
                        bytes,
                        "Dynamic handler exited unsuccessfully after writing a response"
                    );
                }
                tracing::debug!(program = %program.display(), bytes, "Dynamic handler finished");
                Ok(())
            }
            Err(e) => {
                tracing::debug!(
                    program = %program.display(),
                    error = %e,
                    "Dynamic handler output copy aborted"
                );
                Ok(())
            }
        }
    }
}
