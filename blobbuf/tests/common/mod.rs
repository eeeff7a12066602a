//! Shared test engine with failure and timing knobs

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use blobbuf::{Engine, EngineError, MemFs};
use parking_lot::Mutex;
use tokio::sync::{Notify, Semaphore};

/// MemFs wrapper that can delay handshakes, fail or hold writes
#[derive(Default)]
pub struct TestEngine {
    pub fs: MemFs,
    pub handshake_delay: Duration,
    pub handshakes: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    failing: Mutex<HashSet<String>>,
    /// When set, each write waits for a permit
    write_gate: Option<Arc<Semaphore>>,
    pub write_started: Arc<Notify>,
    pub writes: AtomicUsize,
}

impl TestEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_handshake_delay(delay: Duration) -> Self {
        Self {
            handshake_delay: delay,
            ..Self::default()
        }
    }

    pub fn with_write_gate(gate: Arc<Semaphore>) -> Self {
        Self {
            write_gate: Some(gate),
            ..Self::default()
        }
    }

    pub fn fail_writes_to(&self, path: &str) {
        self.failing.lock().insert(path.to_string());
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.fs.file(path)
    }

    pub fn json(&self, path: &str) -> Option<serde_json::Value> {
        self.fs
            .file(path)
            .map(|bytes| serde_json::from_slice(&bytes).expect("valid json"))
    }
}

impl Engine for TestEngine {
    async fn exists(&self, path: &str) -> Result<bool, EngineError> {
        self.fs.exists(path).await
    }

    async fn mkdir(&self, path: &str) -> Result<(), EngineError> {
        self.fs.mkdir(path).await
    }

    async fn touch(&self, path: &str) -> Result<(), EngineError> {
        self.fs.touch(path).await
    }

    async fn read_all(&self, path: &str) -> Result<Vec<u8>, EngineError> {
        self.fs.read_all(path).await
    }

    async fn write_all(&self, path: &str, content: &[u8]) -> Result<(), EngineError> {
        self.write_started.notify_one();
        if let Some(gate) = &self.write_gate {
            gate.acquire().await.expect("gate open").forget();
        }
        if self.failing.lock().contains(path) {
            return Err(EngineError::backend(format!("injected failure for {path}")));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.fs.write_all(path, content).await
    }

    async fn establish_session(&self) -> Result<(), EngineError> {
        self.handshakes.fetch_add(1, Ordering::SeqCst);
        let _in_flight = InFlight::enter(&self.in_flight, &self.max_in_flight);
        tokio::time::sleep(self.handshake_delay).await;
        Ok(())
    }
}

/// Counts a handshake as in flight until dropped, including on cancellation
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize, max: &AtomicUsize) -> Self {
        let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
        max.fetch_max(now, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
