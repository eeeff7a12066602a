//! Engine trait and its object-safe wrapper

use std::future::Future;

use futures::future::BoxFuture;

use crate::error::EngineError;

/// Trait for remote filesystem-like storage backends
///
/// Provides async operations over whole files identified by string paths.
/// Segments are separated by '/'.
pub trait Engine: Send + Sync {
    /// Check whether a file or directory exists at path.
    fn exists(&self, path: &str) -> impl Future<Output = Result<bool, EngineError>> + Send;

    /// Create a single directory.
    ///
    /// Fails with `AlreadyExists` if anything is present at path.
    fn mkdir(&self, path: &str) -> impl Future<Output = Result<(), EngineError>> + Send;

    /// Create an empty file, or leave an existing one untouched.
    fn touch(&self, path: &str) -> impl Future<Output = Result<(), EngineError>> + Send;

    /// Read the whole file, `NotFound` if missing.
    fn read_all(&self, path: &str) -> impl Future<Output = Result<Vec<u8>, EngineError>> + Send;

    /// Replace the whole file with content.
    fn write_all(
        &self,
        path: &str,
        content: &[u8],
    ) -> impl Future<Output = Result<(), EngineError>> + Send;

    /// Perform the session handshake with the backend.
    fn establish_session(&self) -> impl Future<Output = Result<(), EngineError>> + Send;
}

/// Object-safe mirror of [`Engine`], implemented for every engine.
pub trait DynEngine: Send + Sync {
    fn dyn_exists<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<bool, EngineError>>;
    fn dyn_mkdir<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<(), EngineError>>;
    fn dyn_touch<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<(), EngineError>>;
    fn dyn_read_all<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<Vec<u8>, EngineError>>;
    fn dyn_write_all<'a>(
        &'a self,
        path: &'a str,
        content: &'a [u8],
    ) -> BoxFuture<'a, Result<(), EngineError>>;
    fn dyn_establish_session(&self) -> BoxFuture<'_, Result<(), EngineError>>;
}

impl<E: Engine> DynEngine for E {
    fn dyn_exists<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<bool, EngineError>> {
        Box::pin(self.exists(path))
    }

    fn dyn_mkdir<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<(), EngineError>> {
        Box::pin(self.mkdir(path))
    }

    fn dyn_touch<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<(), EngineError>> {
        Box::pin(self.touch(path))
    }

    fn dyn_read_all<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<Vec<u8>, EngineError>> {
        Box::pin(self.read_all(path))
    }

    fn dyn_write_all<'a>(
        &'a self,
        path: &'a str,
        content: &'a [u8],
    ) -> BoxFuture<'a, Result<(), EngineError>> {
        Box::pin(self.write_all(path, content))
    }

    fn dyn_establish_session(&self) -> BoxFuture<'_, Result<(), EngineError>> {
        Box::pin(self.establish_session())
    }
}

/// Type-erased engine as returned by the engine factory
pub struct BoxedEngine(Box<dyn DynEngine>);

impl BoxedEngine {
    pub fn new<E: Engine + 'static>(engine: E) -> Self {
        Self(Box::new(engine))
    }
}

impl std::fmt::Debug for BoxedEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxedEngine").finish_non_exhaustive()
    }
}

impl Engine for BoxedEngine {
    async fn exists(&self, path: &str) -> Result<bool, EngineError> {
        self.0.dyn_exists(path).await
    }

    async fn mkdir(&self, path: &str) -> Result<(), EngineError> {
        self.0.dyn_mkdir(path).await
    }

    async fn touch(&self, path: &str) -> Result<(), EngineError> {
        self.0.dyn_touch(path).await
    }

    async fn read_all(&self, path: &str) -> Result<Vec<u8>, EngineError> {
        self.0.dyn_read_all(path).await
    }

    async fn write_all(&self, path: &str, content: &[u8]) -> Result<(), EngineError> {
        self.0.dyn_write_all(path, content).await
    }

    async fn establish_session(&self) -> Result<(), EngineError> {
        self.0.dyn_establish_session().await
    }
}
