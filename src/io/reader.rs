//! Reader capability and the local filesystem implementation.

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Component, Path, PathBuf};

/// Fetches the content of a named file.
///
/// Supplied per review call; the pipeline treats it as stateless.
#[async_trait]
pub trait ReadFile: Send + Sync {
    async fn read(&self, path: &str) -> Result<Bytes>;
}

/// Reads files relative to a root directory.
#[derive(Debug, Clone)]
pub struct LocalReader {
    root: PathBuf,
}

impl LocalReader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `path` under the root, refusing anything that would leave it.
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));

        if path.is_empty() || escapes {
            anyhow::bail!("path '{}' is not inside the review root", path);
        }

        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ReadFile for LocalReader {
    async fn read(&self, path: &str) -> Result<Bytes> {
        let full_path = self.resolve(path)?;
        tracing::trace!("reading {}", full_path.display());

        let content = tokio::fs::read(&full_path)
            .await
            .with_context(|| format!("failed to open {}", full_path.display()))?;

        Ok(Bytes::from(content))
    }
}
