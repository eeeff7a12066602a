//! Error types for engines and the buffering layer.

use std::time::Duration;

use thiserror::Error;

use crate::DataObject;

/// Errors reported by an [`Engine`](crate::engine::Engine) implementation.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Path was not found in the backend
    #[error("path not found: {0}")]
    NotFound(String),

    /// Something already occupies the path
    #[error("path already exists: {0}")]
    AlreadyExists(String),

    /// I/O error with path context
    #[error("I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Backend-specific failure
    #[error("backend error: {0}")]
    Backend(String),
}

impl EngineError {
    /// Map an I/O error, keeping `NotFound` and `AlreadyExists` distinguishable.
    pub fn from_io(path: impl Into<String>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(path),
            std::io::ErrorKind::AlreadyExists => Self::AlreadyExists(path),
            _ => Self::Io { path, source },
        }
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }
}

/// A queued entry that was not written because its flush batch aborted.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingEntry {
    pub path: String,
    pub data: DataObject,
}

/// Errors of the buffering layer.
#[derive(Debug, Error)]
pub enum BlobError {
    /// Handshake did not complete in time; the manager stays disconnected.
    #[error("session was not established within {0:?}")]
    ConnectionTimeout(Duration),

    #[error("path not found: {0}")]
    NotFound(String),

    /// The protocol is registered, but only as a synchronous engine.
    #[error("engine for protocol '{0}' does not support asynchronous operations")]
    UnsupportedEngine(String),

    #[error("no engine registered for protocol '{0}'")]
    UnknownProtocol(String),

    #[error("no codec registered for format '{0}'")]
    UnknownFormat(String),

    /// Format inference needs a file extension.
    #[error("cannot infer format, path has no extension: {0}")]
    MissingExtension(String),

    #[error("serialization to '{format}' failed: {message}")]
    Serialization { format: String, message: String },

    #[error("deserialization from '{format}' failed: {message}")]
    Deserialization { format: String, message: String },

    /// A flush batch aborted after `written` entries. The live queue was
    /// already reset; the entries never written are handed back in `remainder`.
    #[error("flush aborted at {failed_path} after {written} written entries: {source}")]
    PartialFlush {
        written: usize,
        failed_path: String,
        #[source]
        source: Box<BlobError>,
        remainder: Vec<PendingEntry>,
    },

    #[error("write to {path} did not complete within {timeout:?}")]
    WriteTimeout { path: String, timeout: Duration },

    /// Transfer operation attempted before `launch_session` succeeded.
    #[error("storage session is not established")]
    NotConnected,

    /// The manager was built without an engine.
    #[error("storage manager has no engine configured")]
    Unconfigured,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Engine(EngineError),
}

impl BlobError {
    pub fn serialization(format: impl Into<String>, message: impl ToString) -> Self {
        Self::Serialization {
            format: format.into(),
            message: message.to_string(),
        }
    }

    pub fn deserialization(format: impl Into<String>, message: impl ToString) -> Self {
        Self::Deserialization {
            format: format.into(),
            message: message.to_string(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

impl From<EngineError> for BlobError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::NotFound(path) => Self::NotFound(path),
            other => Self::Engine(other),
        }
    }
}

/// Convenience type alias for buffering-layer results.
pub type BlobResult<T> = Result<T, BlobError>;
