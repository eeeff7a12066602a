//! In-memory implementation of Engine

use std::collections::{BTreeMap, BTreeSet};

use parking_lot::Mutex;

use super::types::Engine;
use crate::error::EngineError;

#[derive(Default)]
struct MemFsState {
    files: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
}

impl MemFsState {
    fn is_dir(&self, path: &str) -> bool {
        if self.dirs.contains(path) {
            return true;
        }
        let prefix = format!("{path}/");
        self.files.keys().any(|p| p.starts_with(&prefix))
            || self.dirs.iter().any(|d| d.starts_with(&prefix))
    }

    fn exists(&self, path: &str) -> bool {
        self.files.contains_key(path) || self.is_dir(path)
    }
}

/// In-memory implementation of Engine
///
/// Simple map based storage, useful for testing and single-process use.
/// Directories are explicit (via `mkdir`) or implied by the files below them.
pub struct MemFs {
    state: Mutex<MemFsState>,
}

impl MemFs {
    /// Create a new empty MemFs store
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemFsState::default()),
        }
    }

    /// Paths of all files, sorted
    #[must_use]
    pub fn files(&self) -> Vec<String> {
        self.state.lock().files.keys().cloned().collect()
    }

    /// Contents of a file, if present
    #[must_use]
    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.state.lock().files.get(path).cloned()
    }

    /// Whether path is an explicit or implied directory
    #[must_use]
    pub fn is_dir(&self, path: &str) -> bool {
        self.state.lock().is_dir(path)
    }
}

impl Default for MemFs {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine for MemFs {
    async fn exists(&self, path: &str) -> Result<bool, EngineError> {
        Ok(self.state.lock().exists(path))
    }

    async fn mkdir(&self, path: &str) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        if state.exists(path) {
            return Err(EngineError::AlreadyExists(path.to_string()));
        }
        state.dirs.insert(path.to_string());
        Ok(())
    }

    async fn touch(&self, path: &str) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        if state.is_dir(path) {
            return Err(EngineError::AlreadyExists(path.to_string()));
        }
        state.files.entry(path.to_string()).or_default();
        Ok(())
    }

    async fn read_all(&self, path: &str) -> Result<Vec<u8>, EngineError> {
        self.state
            .lock()
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(path.to_string()))
    }

    async fn write_all(&self, path: &str, content: &[u8]) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        if state.is_dir(path) {
            return Err(EngineError::AlreadyExists(path.to_string()));
        }
        state.files.insert(path.to_string(), content.to_vec());
        Ok(())
    }

    async fn establish_session(&self) -> Result<(), EngineError> {
        // No handshake for in-memory storage
        Ok(())
    }
}
