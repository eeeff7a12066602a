//! Engine factory
//!
//! Maps protocol names to engine constructors. The registry is an ordinary
//! value: build it at startup, pass it where engines are created.

use std::collections::HashMap;

use tracing::debug;

use crate::engine::{BoxedEngine, LocalFs, MemFs};
use crate::error::{BlobError, BlobResult};

/// Engine parameters, passed through to the constructor
pub type EngineOptions = HashMap<String, String>;

/// Constructor of an asynchronous engine
pub type EngineCtor = fn(&EngineOptions) -> BlobResult<BoxedEngine>;

/// What is known about a registered protocol
#[derive(Clone, Copy)]
pub enum EngineKind {
    /// Engine with asynchronous operations
    Async(EngineCtor),
    /// Synchronous-only engine; never constructed
    Blocking,
}

/// Registry mapping protocol names to engine implementations
pub struct EngineRegistry {
    engines: HashMap<String, EngineKind>,
}

impl EngineRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            engines: HashMap::new(),
        }
    }

    /// Registry with the `memory` and `file` protocols
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_async("memory", create_memfs);
        registry.register_async("file", create_localfs);
        registry
    }

    /// Register an asynchronous engine constructor
    pub fn register_async(&mut self, protocol: impl Into<String>, ctor: EngineCtor) {
        self.engines.insert(protocol.into(), EngineKind::Async(ctor));
    }

    /// Declare a protocol whose implementation is synchronous only
    pub fn register_blocking(&mut self, protocol: impl Into<String>) {
        self.engines.insert(protocol.into(), EngineKind::Blocking);
    }

    /// Registered protocol names, sorted
    #[must_use]
    pub fn protocols(&self) -> Vec<String> {
        let mut names: Vec<String> = self.engines.keys().cloned().collect();
        names.sort();
        names
    }

    /// Construct the engine registered for `protocol`.
    ///
    /// # Errors
    ///
    /// - `UnknownProtocol` if nothing is registered under the name
    /// - `UnsupportedEngine` if the implementation is synchronous only
    /// - whatever the constructor reports for bad options
    pub fn create_engine(&self, protocol: &str, options: &EngineOptions) -> BlobResult<BoxedEngine> {
        match self.engines.get(protocol) {
            None => Err(BlobError::UnknownProtocol(protocol.to_string())),
            Some(EngineKind::Blocking) => Err(BlobError::UnsupportedEngine(protocol.to_string())),
            Some(EngineKind::Async(ctor)) => {
                debug!(protocol = %protocol, "creating engine");
                ctor(options)
            }
        }
    }
}

impl Default for EngineRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn create_memfs(_options: &EngineOptions) -> BlobResult<BoxedEngine> {
    Ok(BoxedEngine::new(MemFs::new()))
}

fn create_localfs(options: &EngineOptions) -> BlobResult<BoxedEngine> {
    let root = options.get("root").map_or(".", String::as_str);
    Ok(BoxedEngine::new(LocalFs::new(root)))
}
