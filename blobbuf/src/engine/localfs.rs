//! Local-disk implementation of Engine
//!
//! Paths are resolved relative to a root directory:
//!
//! ```text
//! {root}/
//!   {context}/
//!     part-0001.json
//!     part-0002.json
//! ```

use std::path::{Component, Path, PathBuf};

use tokio::fs;

use super::types::Engine;
use crate::error::EngineError;

/// Engine backed by `tokio::fs` under a root directory.
#[derive(Debug, Clone)]
pub struct LocalFs {
    root: PathBuf,
}

impl LocalFs {
    /// The root directory is created during the session handshake.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map `path` under the root; `..` segments are rejected.
    fn resolve(&self, path: &str) -> Result<PathBuf, EngineError> {
        let relative = Path::new(path.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(EngineError::backend(format!(
                "path '{path}' escapes the storage root"
            )));
        }
        Ok(self.root.join(relative))
    }

    async fn ensure_parent(&self, full: &Path, path: &str) -> Result<(), EngineError> {
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| EngineError::from_io(path, e))?;
        }
        Ok(())
    }
}

impl Engine for LocalFs {
    async fn exists(&self, path: &str) -> Result<bool, EngineError> {
        fs::try_exists(self.resolve(path)?)
            .await
            .map_err(|e| EngineError::from_io(path, e))
    }

    async fn mkdir(&self, path: &str) -> Result<(), EngineError> {
        fs::create_dir(self.resolve(path)?)
            .await
            .map_err(|e| EngineError::from_io(path, e))
    }

    async fn touch(&self, path: &str) -> Result<(), EngineError> {
        let full = self.resolve(path)?;
        self.ensure_parent(&full, path).await?;
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&full)
            .await
            .map(drop)
            .map_err(|e| EngineError::from_io(path, e))
    }

    async fn read_all(&self, path: &str) -> Result<Vec<u8>, EngineError> {
        fs::read(self.resolve(path)?)
            .await
            .map_err(|e| EngineError::from_io(path, e))
    }

    async fn write_all(&self, path: &str, content: &[u8]) -> Result<(), EngineError> {
        let full = self.resolve(path)?;
        self.ensure_parent(&full, path).await?;
        fs::write(&full, content)
            .await
            .map_err(|e| EngineError::from_io(path, e))
    }

    async fn establish_session(&self) -> Result<(), EngineError> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| EngineError::from_io(self.root.to_string_lossy(), e))
    }
}
