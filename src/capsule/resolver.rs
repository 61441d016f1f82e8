//! Request path → served resource.
//!
//! # Responsibilities
//! - Expand `dir/` to `dir/index.gmi`, strip the leading slash
//! - Keep every lookup inside the capsule root
//! - Classify the hit as static, dynamic (`.cgi`) or a Spartan directory
//!
//! # Design Decisions
//! - `..` components are refused before touching the filesystem
//! - The canonical path must still sit under the canonical root, which also
//!   catches symlinks pointing outside
//! - Spartan retries `<path>.gmi` when the exact path is absent; Gemini does not

use std::fs::Metadata;
use std::path::{Path, PathBuf};

use crate::protocol::{mime, Protocol};

/// What a request path resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    /// A regular file streamed as-is.
    Static { path: PathBuf, mime: &'static str },
    /// A program run through the dynamic handler.
    Dynamic { path: PathBuf },
    /// A Spartan directory; the client is redirected to `location`.
    Directory { location: String },
    Missing,
}

/// Resolves request paths against one capsule root.
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
    protocol: Protocol,
}

impl PathResolver {
    /// Create a resolver for `root`. The root is canonicalised once here.
    pub fn new(root: impl AsRef<Path>, protocol: Protocol) -> std::io::Result<Self> {
        let root = std::fs::canonicalize(root.as_ref())?;
        if !root.is_dir() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("capsule root {} is not a directory", root.display()),
            ));
        }
        Ok(Self { root, protocol })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn resolve(&self, request_path: &str) -> Resource {
        let relative = normalize(request_path);

        match self.locate(&relative).await {
            Some((_, meta)) if meta.is_dir() => match self.protocol {
                Protocol::Spartan => Resource::Directory {
                    location: format!("/{}/", relative),
                },
                Protocol::Gemini => Resource::Missing,
            },
            Some((path, _)) => classify(path),
            None if self.protocol == Protocol::Spartan => {
                match self.locate(&format!("{}.gmi", relative)).await {
                    Some((path, meta)) if meta.is_file() => Resource::Static {
                        path,
                        mime: mime::GEMTEXT,
                    },
                    _ => Resource::Missing,
                }
            }
            None => Resource::Missing,
        }
    }

    /// Find `relative` under the root, returning its canonical path.
    async fn locate(&self, relative: &str) -> Option<(PathBuf, Metadata)> {
        let candidate = self.join(relative)?;
        let canonical = tokio::fs::canonicalize(&candidate).await.ok()?;

        if !canonical.starts_with(&self.root) {
            tracing::warn!(
                path = %candidate.display(),
                target = %canonical.display(),
                "Refusing path outside capsule root"
            );
            return None;
        }

        let meta = tokio::fs::metadata(&canonical).await.ok()?;
        Some((canonical, meta))
    }

    /// Join a relative request path onto the root, component by component.
    fn join(&self, relative: &str) -> Option<PathBuf> {
        let mut path = self.root.clone();
        for component in relative.split('/') {
            match component {
                "" | "." => continue,
                ".." => return None,
                c if c.contains(['\\', '\0']) => return None,
                c => path.push(c),
            }
        }
        Some(path)
    }
}

/// Apply index expansion and drop leading slashes.
///
/// ```
/// use capsule_engine::capsule::resolver::normalize;
/// assert_eq!(normalize(""), "index.gmi");
/// assert_eq!(normalize("/docs/"), "docs/index.gmi");
/// assert_eq!(normalize("/a.txt"), "a.txt");
/// ```
pub fn normalize(path: &str) -> String {
    let mut path = if path.is_empty() {
        String::from("/")
    } else {
        path.to_string()
    };
    if path.ends_with('/') {
        path.push_str("index.gmi");
    }
    path.trim_start_matches('/').to_string()
}

fn classify(path: PathBuf) -> Resource {
    match mime::lookup(&path) {
        mime::CGI => Resource::Dynamic { path },
        mime => Resource::Static { path, mime },
    }
}
