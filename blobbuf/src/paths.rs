//! Path existence checks with optional auto-creation.

use tracing::debug;

use crate::engine::Engine;
use crate::error::{BlobResult, EngineError};

/// Outcome of [`check_path`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathState {
    /// The path existed before the call
    Present,
    /// The path is missing and was left alone
    Missing,
    /// The path was missing and has been created
    Created,
}

impl PathState {
    /// The "needs creation" indicator: true unless the path already existed.
    #[must_use]
    pub fn was_missing(self) -> bool {
        !matches!(self, Self::Present)
    }
}

/// Check a path, creating it when missing and `autocreate` is set.
///
/// Without `autocreate` there are no side effects.
///
/// # Errors
///
/// Engine errors from the existence check or from [`mk_path`].
pub async fn check_path<E: Engine>(engine: &E, path: &str, autocreate: bool) -> BlobResult<PathState> {
    if engine.exists(path).await? {
        return Ok(PathState::Present);
    }
    if !autocreate {
        return Ok(PathState::Missing);
    }
    mk_path(engine, path).await?;
    Ok(PathState::Created)
}

/// Create a path in the backend.
///
/// For multi-segment paths the first segment is created as a directory,
/// tolerating an existing one, then the full path is touched.
///
/// # Errors
///
/// Any engine error except `AlreadyExists` on the first segment.
pub async fn mk_path<E: Engine>(engine: &E, path: &str) -> BlobResult<()> {
    let trimmed = path.trim_start_matches('/');
    if let Some((first, _)) = trimmed.split_once('/') {
        match engine.mkdir(first).await {
            Ok(()) => debug!(dir = %first, "created directory"),
            Err(EngineError::AlreadyExists(_)) => {}
            Err(e) => return Err(e.into()),
        }
    }
    engine.touch(path).await?;
    Ok(())
}
