//! Storage manager: session lifecycle, transfers and buffer-to-backend flushes.
//!
//! # Flush
//!
//! ```text
//! producers ──enqueue──► ContentQueue (live)
//!                             │ merge_to_backend:
//!                             │  1. take drain lock
//!                             │  2-3. snapshot + reset live queue
//!                             │  4. recalc counters
//!                             ▼
//!                        snapshot ──► check_path ─► serialize ─► write_all
//! ```
//!
//! A flush batch is not atomic across destinations. If a write fails, entries
//! already written stay written and the rest of the batch is returned to the
//! caller inside [`BlobError::PartialFlush`]; the live queue stays empty.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use linked_hash_map::LinkedHashMap;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::codec::{format_of, FormatRegistry};
use crate::config::StorageConfig;
use crate::engine::{BoxedEngine, Engine};
use crate::error::{BlobError, BlobResult, PendingEntry};
use crate::factory::{EngineOptions, EngineRegistry};
use crate::limit::{LimitPolicy, QueueUsage};
use crate::paths::{self, PathState};
use crate::queue::{ContentQueue, QueueSnapshot};
use crate::transfer;
use crate::DataObject;

/// Result of a flush
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Paths written, in write order
    pub paths: Vec<String>,
}

impl FlushReport {
    #[must_use]
    pub fn written(&self) -> usize {
        self.paths.len()
    }

    fn absorb(&mut self, other: FlushReport) {
        self.paths.extend(other.paths);
    }
}

/// What happened to an accepted write
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome {
    /// Buffering is off; the object went straight to the backend
    Written,
    /// The object is queued; usage across all queues afterwards
    Buffered(QueueUsage),
    /// The write pushed usage over the limit and all queues were flushed
    Flushed(FlushReport),
}

/// Buffered storage manager over an [`Engine`]
///
/// Long-lived: construct once, call [`launch_session`](Self::launch_session),
/// then write and flush for as many cycles as needed.
pub struct StorageManager<E: Engine> {
    engine: Option<E>,
    config: StorageConfig,
    policy: LimitPolicy,
    handshake_timeout: Duration,
    write_timeout: Option<Duration>,
    formats: FormatRegistry,
    registered_types: Vec<String>,
    session_lock: tokio::sync::Mutex<()>,
    active_session: AtomicBool,
    /// Content queues keyed by I/O context, in first-write order
    queues: Mutex<LinkedHashMap<String, Arc<ContentQueue>>>,
    /// Usage across all queues as of the last recalculation
    stats: Mutex<QueueUsage>,
}

impl<E: Engine> StorageManager<E> {
    /// Create a manager that owns `engine`.
    ///
    /// # Errors
    ///
    /// `Config` if the configuration does not validate.
    pub fn new(engine: E, config: StorageConfig) -> BlobResult<Self> {
        let mut manager = Self::unconfigured(config)?;
        manager.engine = Some(engine);
        Ok(manager)
    }

    /// Create a manager without an engine; see [`set_engine`](Self::set_engine).
    ///
    /// # Errors
    ///
    /// `Config` if the configuration does not validate.
    pub fn unconfigured(config: StorageConfig) -> BlobResult<Self> {
        config.validate()?;
        Ok(Self {
            engine: None,
            policy: config.limit_policy()?,
            handshake_timeout: config.handshake_timeout()?,
            write_timeout: config.write_timeout()?,
            config,
            formats: FormatRegistry::with_defaults(),
            registered_types: Vec::new(),
            session_lock: tokio::sync::Mutex::new(()),
            active_session: AtomicBool::new(false),
            queues: Mutex::new(LinkedHashMap::new()),
            stats: Mutex::new(QueueUsage::default()),
        })
    }

    /// Replace the format registry
    #[must_use]
    pub fn with_formats(mut self, formats: FormatRegistry) -> Self {
        self.formats = formats;
        self
    }

    /// Install an engine. The session must be launched again.
    pub fn set_engine(&mut self, engine: E) {
        self.engine = Some(engine);
        self.active_session.store(false, Ordering::Release);
    }

    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.engine.is_some()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.active_session.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    #[must_use]
    pub fn formats(&self) -> &FormatRegistry {
        &self.formats
    }

    /// Protocols of the registry the engine came from, if any
    #[must_use]
    pub fn registered_types(&self) -> &[String] {
        &self.registered_types
    }

    /// # Errors
    ///
    /// `Unconfigured` if no engine is installed.
    pub fn engine(&self) -> BlobResult<&E> {
        self.engine.as_ref().ok_or(BlobError::Unconfigured)
    }

    fn connected_engine(&self) -> BlobResult<&E> {
        let engine = self.engine()?;
        if self.is_connected() {
            Ok(engine)
        } else {
            Err(BlobError::NotConnected)
        }
    }

    /// Establish the engine session, bounded by the handshake timeout.
    ///
    /// Concurrent callers are serialized; a caller arriving after a successful
    /// handshake returns immediately. Nothing is retried.
    ///
    /// # Errors
    ///
    /// `ConnectionTimeout` if the handshake does not finish in time, engine
    /// errors from the handshake, `Unconfigured` without an engine.
    pub async fn launch_session(&self) -> BlobResult<()> {
        let engine = self.engine()?;
        let _session = self.session_lock.lock().await;
        if self.is_connected() {
            return Ok(());
        }

        match tokio::time::timeout(self.handshake_timeout, engine.establish_session()).await {
            Ok(Ok(())) => {
                self.active_session.store(true, Ordering::Release);
                info!("storage session established");
                Ok(())
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_) => {
                warn!(timeout = ?self.handshake_timeout, "storage session handshake timed out");
                Err(BlobError::ConnectionTimeout(self.handshake_timeout))
            }
        }
    }

    /// See [`paths::check_path`].
    ///
    /// # Errors
    ///
    /// `NotConnected`, or engine errors.
    pub async fn check_path(&self, path: &str, autocreate: bool) -> BlobResult<PathState> {
        paths::check_path(self.connected_engine()?, path, autocreate).await
    }

    /// # Errors
    ///
    /// `NotConnected`, or the engine's write error.
    pub async fn upload(&self, content: &[u8], path: &str) -> BlobResult<()> {
        transfer::upload(self.connected_engine()?, content, path).await
    }

    /// # Errors
    ///
    /// `NotConnected`, `NotFound`.
    pub async fn download(&self, path: &str) -> BlobResult<Vec<u8>> {
        transfer::download(self.connected_engine()?, path).await
    }

    /// Download and deserialize by the path's extension.
    ///
    /// Reads the backend only; objects still queued are not visible.
    ///
    /// # Errors
    ///
    /// `NotConnected`, `NotFound`, `MissingExtension`, `UnknownFormat`, `Deserialization`.
    pub async fn read(&self, path: &str) -> BlobResult<DataObject> {
        transfer::read(self.connected_engine()?, &self.formats, path).await
    }

    /// Get or create the queue for `context` with an explicit output format.
    ///
    /// An existing queue keeps its format.
    ///
    /// # Errors
    ///
    /// `UnknownFormat` if the format is not registered.
    pub fn open_queue(&self, context: &str, out_format: &str) -> BlobResult<Arc<ContentQueue>> {
        let out_format = out_format.to_lowercase();
        if !self.formats.contains(&out_format) {
            return Err(BlobError::UnknownFormat(out_format));
        }
        let mut queues = self.queues.lock();
        if let Some(queue) = queues.get(context) {
            return Ok(Arc::clone(queue));
        }
        debug!(context = %context, format = %out_format, "opening content queue");
        let queue = Arc::new(ContentQueue::new(out_format));
        queues.insert(context.to_string(), Arc::clone(&queue));
        Ok(queue)
    }

    /// The live queue of `context`, if any write created it
    #[must_use]
    pub fn queue(&self, context: &str) -> Option<Arc<ContentQueue>> {
        self.queues.lock().get(context).cloned()
    }

    /// Known contexts in first-write order
    #[must_use]
    pub fn contexts(&self) -> Vec<String> {
        self.queues.lock().keys().cloned().collect()
    }

    fn live_queues(&self) -> Vec<Arc<ContentQueue>> {
        self.queues.lock().values().cloned().collect()
    }

    /// Recompute usage across all queues
    pub fn recalc_counters(&self) -> QueueUsage {
        let usage = self
            .live_queues()
            .iter()
            .fold(QueueUsage::default(), |acc, queue| acc.merge(queue.usage()));
        *self.stats.lock() = usage;
        usage
    }

    /// Usage as of the last recalculation
    #[must_use]
    pub fn buffer_stats(&self) -> QueueUsage {
        *self.stats.lock()
    }

    /// Whether current usage is over the configured limit
    #[must_use]
    pub fn limit_exceeded(&self) -> bool {
        self.policy.is_exceeded(&self.recalc_counters(), Instant::now())
    }

    /// Accept an object destined for `path` within `context`.
    ///
    /// The queue of a new context takes the format of the first path written to it.
    ///
    /// # Errors
    ///
    /// `NotConnected`, `MissingExtension`/`UnknownFormat` for a new context,
    /// serialization and engine errors when writing through or flushing.
    pub async fn write(
        &self,
        context: &str,
        path: &str,
        data: DataObject,
    ) -> BlobResult<WriteOutcome> {
        let engine = self.connected_engine()?;

        if !self.config.bufferize {
            let format = format_of(path)?;
            let content = self.formats.serialize(&data, &format)?;
            paths::check_path(engine, path, true).await?;
            transfer::upload(engine, &content, path).await?;
            return Ok(WriteOutcome::Written);
        }

        let queue = match self.queue(context) {
            Some(queue) => queue,
            None => self.open_queue(context, &format_of(path)?)?,
        };
        queue.enqueue(path, data);

        let usage = self.recalc_counters();
        if self.policy.is_exceeded(&usage, Instant::now()) {
            debug!(
                context = %context,
                bytes = usage.bytes,
                items = usage.items,
                "buffer limit exceeded, flushing"
            );
            return Ok(WriteOutcome::Flushed(self.flush_all().await?));
        }
        Ok(WriteOutcome::Buffered(usage))
    }

    /// Put entries back into the queue of `context`, e.g. the remainder of a
    /// [`BlobError::PartialFlush`]. Paths written again since the failed flush
    /// keep their newer object. Does not trigger a flush.
    ///
    /// # Errors
    ///
    /// `MissingExtension`/`UnknownFormat` if the context has no queue yet.
    pub fn requeue(&self, context: &str, entries: Vec<PendingEntry>) -> BlobResult<QueueUsage> {
        let Some(first) = entries.first() else {
            return Ok(self.recalc_counters());
        };
        let queue = match self.queue(context) {
            Some(queue) => queue,
            None => self.open_queue(context, &format_of(&first.path)?)?,
        };
        for entry in entries {
            if !queue.enqueue_if_absent(entry.path.clone(), entry.data) {
                debug!(path = %entry.path, "newer object already queued, dropping stale entry");
            }
        }
        Ok(self.recalc_counters())
    }

    /// Flush the queue of one context. Unknown contexts flush nothing.
    ///
    /// # Errors
    ///
    /// See [`merge_to_backend`](Self::merge_to_backend).
    pub async fn flush(&self, context: &str) -> BlobResult<FlushReport> {
        match self.queue(context) {
            Some(queue) => self.merge_to_backend(&queue).await,
            None => Ok(FlushReport::default()),
        }
    }

    /// Flush every queue in first-write order, stopping at the first failure.
    ///
    /// Queues after a failed one keep their content.
    ///
    /// # Errors
    ///
    /// See [`merge_to_backend`](Self::merge_to_backend).
    pub async fn flush_all(&self) -> BlobResult<FlushReport> {
        let mut report = FlushReport::default();
        for queue in self.live_queues() {
            report.absorb(self.merge_to_backend(&queue).await?);
        }
        Ok(report)
    }

    /// Drain `queue` into the backend.
    ///
    /// The drain lock is held for the whole batch and released on every exit.
    /// The live queue is reset before the first write, so concurrent producers
    /// keep writing into it and their objects wait for the next flush.
    ///
    /// # Errors
    ///
    /// `NotConnected`, or `PartialFlush` carrying the unwritten entries.
    pub async fn merge_to_backend(&self, queue: &ContentQueue) -> BlobResult<FlushReport> {
        let engine = self.connected_engine()?;
        debug!(
            format = %queue.out_format(),
            already_draining = queue.is_draining(),
            "start merging to backend"
        );

        let guard = queue.block_state().await;
        let QueueSnapshot {
            out_format,
            entries,
        } = guard.take_snapshot();
        self.recalc_counters();
        debug!(entries = entries.len(), "queue reset after snapshot, uploading");

        let mut report = FlushReport::default();
        let mut pending = entries.into_iter();
        while let Some(entry) = pending.next() {
            if let Err(source) = self.store_entry(engine, &out_format, &entry).await {
                let failed_path = entry.path.clone();
                let remainder: Vec<PendingEntry> = std::iter::once(entry).chain(pending).collect();
                warn!(
                    path = %failed_path,
                    written = report.written(),
                    unwritten = remainder.len(),
                    error = %source,
                    "flush aborted"
                );
                return Err(BlobError::PartialFlush {
                    written: report.written(),
                    failed_path,
                    source: Box::new(source),
                    remainder,
                });
            }
            report.paths.push(entry.path);
        }
        drop(guard);

        debug!(written = report.written(), "merge to backend completed");
        Ok(report)
    }

    async fn store_entry(&self, engine: &E, format: &str, entry: &PendingEntry) -> BlobResult<()> {
        let content = self.formats.serialize(&entry.data, format)?;
        paths::check_path(engine, &entry.path, true).await?;
        let upload = transfer::upload(engine, &content, &entry.path);
        match self.write_timeout {
            Some(limit) => tokio::time::timeout(limit, upload).await.map_err(|_| {
                BlobError::WriteTimeout {
                    path: entry.path.clone(),
                    timeout: limit,
                }
            })?,
            None => upload.await,
        }
    }
}

impl StorageManager<BoxedEngine> {
    /// Create the engine for `protocol` from `registry` and wrap it.
    ///
    /// # Errors
    ///
    /// Factory errors (`UnknownProtocol`, `UnsupportedEngine`) or `Config`.
    pub fn from_registry(
        registry: &EngineRegistry,
        protocol: &str,
        options: &EngineOptions,
        config: StorageConfig,
    ) -> BlobResult<Self> {
        let engine = registry.create_engine(protocol, options)?;
        let mut manager = Self::new(engine, config)?;
        manager.registered_types = registry.protocols();
        Ok(manager)
    }
}
