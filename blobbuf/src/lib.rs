//! Buffered blob storage
//!
//! Accumulates data objects in memory per I/O context and flushes them to a
//! pluggable filesystem-like engine, serializing each object by the format of
//! its destination path.
//!
//! ```
//! use blobbuf::{MemFs, StorageConfig, StorageManager};
//! use serde_json::json;
//!
//! # tokio_test();
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn tokio_test() {
//! let manager = StorageManager::new(MemFs::new(), StorageConfig::default()).unwrap();
//! manager.launch_session().await.unwrap();
//!
//! manager.write("run-1", "run-1/a.json", json!({"x": 1})).await.unwrap();
//! manager.flush("run-1").await.unwrap();
//!
//! assert_eq!(manager.read("run-1/a.json").await.unwrap(), json!({"x": 1}));
//! # }
//! ```

pub mod buffering;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod factory;
pub mod limit;
pub mod manager;
pub mod paths;
pub mod queue;
pub mod transfer;

/// Structured data object buffered and stored by this crate
pub type DataObject = serde_json::Value;

pub use buffering::BufferedStorage;
pub use codec::{format_of, FormatRegistry};
pub use config::StorageConfig;
pub use engine::{BoxedEngine, Engine, LocalFs, MemFs};
pub use error::{BlobError, BlobResult, EngineError, PendingEntry};
pub use factory::{EngineKind, EngineOptions, EngineRegistry};
pub use limit::{LimitPolicy, LimitType, QueueUsage};
pub use manager::{FlushReport, StorageManager, WriteOutcome};
pub use paths::{check_path, mk_path, PathState};
pub use queue::{ContentQueue, DrainGuard, QueueSnapshot};
pub use transfer::{download, read, upload};
