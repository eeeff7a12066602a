//! Content queue with internal locking
//!
//! Holds objects pending upload, keyed by destination path, for one I/O context.
//!
//! # Locking
//!
//! Two locks with different jobs:
//! - the entries lock (`parking_lot::Mutex`) is held only for the duration of a
//!   single enqueue or snapshot, never across an await;
//! - the drain lock (`tokio::sync::Mutex`) is held by a flush for its whole
//!   duration and serializes flushes of the same queue.
//!
//! Producers only take the entries lock, so they never wait for a flush to finish.
//! A flush takes the snapshot and resets the entries in one step; everything
//! enqueued afterwards lands in the emptied queue and waits for the next flush.

use linked_hash_map::LinkedHashMap;
use parking_lot::Mutex;
use tokio::sync::MutexGuard;
use tokio::time::Instant;

use crate::error::PendingEntry;
use crate::limit::QueueUsage;
use crate::DataObject;

struct QueuedObject {
    data: DataObject,
    size: usize,
}

#[derive(Default)]
struct QueueState {
    entries: LinkedHashMap<String, QueuedObject>,
    bytes: usize,
    oldest: Option<Instant>,
}

impl QueueState {
    fn usage(&self) -> QueueUsage {
        QueueUsage {
            bytes: self.bytes,
            items: self.entries.len(),
            oldest: self.oldest,
        }
    }
}

/// Estimated in-memory footprint of an object: its compact JSON length.
fn estimate_size(data: &DataObject) -> usize {
    serde_json::to_vec(data).map_or(0, |bytes| bytes.len())
}

/// Content queue for one I/O context
///
/// Entries are kept in write order. Writing a path that is already queued
/// replaces the object (last write wins) and moves it to the back.
///
/// # Example
///
/// ```
/// use blobbuf::ContentQueue;
/// use serde_json::json;
///
/// let queue = ContentQueue::new("json");
/// queue.enqueue("a.json", json!({"x": 1}));
/// queue.enqueue("a.json", json!({"x": 2}));
///
/// assert_eq!(queue.len(), 1);
/// assert_eq!(queue.get("a.json"), Some(json!({"x": 2})));
/// ```
pub struct ContentQueue {
    out_format: String,
    state: Mutex<QueueState>,
    drain_lock: tokio::sync::Mutex<()>,
}

impl ContentQueue {
    /// Create an empty queue serializing to `out_format`
    #[must_use]
    pub fn new(out_format: impl Into<String>) -> Self {
        Self {
            out_format: out_format.into(),
            state: Mutex::new(QueueState::default()),
            drain_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Output serialization format of every entry
    #[must_use]
    pub fn out_format(&self) -> &str {
        &self.out_format
    }

    /// Add or replace the object for `path`, returning the usage afterwards
    pub fn enqueue(&self, path: impl Into<String>, data: DataObject) -> QueueUsage {
        let size = estimate_size(&data);
        let mut state = self.state.lock();
        if let Some(previous) = state.entries.insert(path.into(), QueuedObject { data, size }) {
            state.bytes -= previous.size;
        }
        state.bytes += size;
        if state.oldest.is_none() {
            state.oldest = Some(Instant::now());
        }
        state.usage()
    }

    /// Add the object for `path` unless the path is already queued.
    ///
    /// Returns whether it was added. Used to put back entries of a failed
    /// flush without overwriting newer writes.
    pub fn enqueue_if_absent(&self, path: impl Into<String>, data: DataObject) -> bool {
        let path = path.into();
        let mut state = self.state.lock();
        if state.entries.contains_key(&path) {
            return false;
        }
        let size = estimate_size(&data);
        state.entries.insert(path, QueuedObject { data, size });
        state.bytes += size;
        if state.oldest.is_none() {
            state.oldest = Some(Instant::now());
        }
        true
    }

    #[must_use]
    pub fn usage(&self) -> QueueUsage {
        self.state.lock().usage()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// Queued paths in iteration order
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        self.state.lock().entries.keys().cloned().collect()
    }

    /// Copy of the object queued for `path`
    #[must_use]
    pub fn get(&self, path: &str) -> Option<DataObject> {
        self.state.lock().entries.get(path).map(|queued| queued.data.clone())
    }

    /// Whether a flush currently holds the drain lock
    #[must_use]
    pub fn is_draining(&self) -> bool {
        self.drain_lock.try_lock().is_err()
    }

    /// Acquire the drain lock for the duration of a flush.
    ///
    /// The lock is released when the guard is dropped, on every exit path.
    pub async fn block_state(&self) -> DrainGuard<'_> {
        let lock = self.drain_lock.lock().await;
        DrainGuard { queue: self, _lock: lock }
    }
}

impl std::fmt::Debug for ContentQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentQueue")
            .field("out_format", &self.out_format)
            .field("usage", &self.usage())
            .finish_non_exhaustive()
    }
}

/// Snapshot of a queue taken by a flush
#[derive(Debug)]
pub struct QueueSnapshot {
    pub out_format: String,
    pub entries: Vec<PendingEntry>,
}

/// Exclusive drain access to a [`ContentQueue`]
///
/// Reset and snapshot are only reachable through this guard.
pub struct DrainGuard<'a> {
    queue: &'a ContentQueue,
    _lock: MutexGuard<'a, ()>,
}

impl DrainGuard<'_> {
    /// Clear all queued entries and counters
    pub fn reset(&self) {
        let mut state = self.queue.state.lock();
        *state = QueueState::default();
    }

    /// Move the current entries out, leaving the live queue empty
    #[must_use]
    pub fn take_snapshot(&self) -> QueueSnapshot {
        let previous = std::mem::take(&mut *self.queue.state.lock());
        let entries = previous
            .entries
            .into_iter()
            .map(|(path, queued)| PendingEntry {
                path,
                data: queued.data,
            })
            .collect();
        QueueSnapshot {
            out_format: self.queue.out_format.clone(),
            entries,
        }
    }

    #[must_use]
    pub fn queue(&self) -> &ContentQueue {
        self.queue
    }
}
