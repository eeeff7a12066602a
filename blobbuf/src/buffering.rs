//! Buffering capability
//!
//! Storage front-ends that want write buffering depend on this trait and hold
//! a buffered storage value, instead of inheriting the buffering behavior.

use std::future::Future;

use crate::engine::Engine;
use crate::error::BlobResult;
use crate::manager::{FlushReport, StorageManager, WriteOutcome};
use crate::DataObject;

/// Narrow interface to a write buffer with flush control
pub trait BufferedStorage: Send + Sync {
    /// Accept an object for `path` within `context`; may flush.
    fn enqueue(
        &self,
        context: &str,
        path: &str,
        data: DataObject,
    ) -> impl Future<Output = BlobResult<WriteOutcome>> + Send;

    /// Flush the queue of one context.
    fn flush(&self, context: &str) -> impl Future<Output = BlobResult<FlushReport>> + Send;

    /// Flush all queues.
    fn flush_all(&self) -> impl Future<Output = BlobResult<FlushReport>> + Send;

    /// Whether the limit policy currently asks for a flush.
    fn limit_exceeded(&self) -> bool;
}

impl<E: Engine> BufferedStorage for StorageManager<E> {
    async fn enqueue(&self, context: &str, path: &str, data: DataObject) -> BlobResult<WriteOutcome> {
        StorageManager::write(self, context, path, data).await
    }

    async fn flush(&self, context: &str) -> BlobResult<FlushReport> {
        StorageManager::flush(self, context).await
    }

    async fn flush_all(&self) -> BlobResult<FlushReport> {
        StorageManager::flush_all(self).await
    }

    fn limit_exceeded(&self) -> bool {
        StorageManager::limit_exceeded(self)
    }
}
