//! Buffer-to-backend flush behavior

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use blobbuf::{BlobError, StorageConfig, StorageManager, WriteOutcome};
use common::TestEngine;
use serde_json::json;
use tokio::sync::Semaphore;

async fn connected(engine: TestEngine, config: StorageConfig) -> Arc<StorageManager<TestEngine>> {
    let manager = StorageManager::new(engine, config).unwrap();
    manager.launch_session().await.unwrap();
    Arc::new(manager)
}

#[tokio::test]
async fn test_flush_writes_each_entry() {
    let manager = connected(TestEngine::new(), StorageConfig::default()).await;

    manager.write("ctx", "a.json", json!({"x": 1})).await.unwrap();
    manager.write("ctx", "b.json", json!({"x": 2})).await.unwrap();

    let queue = manager.queue("ctx").unwrap();
    let report = manager.merge_to_backend(&queue).await.unwrap();

    assert_eq!(report.paths, vec!["a.json", "b.json"]);
    let engine = manager.engine().unwrap();
    assert_eq!(engine.json("a.json"), Some(json!({"x": 1})));
    assert_eq!(engine.json("b.json"), Some(json!({"x": 2})));
    assert!(queue.is_empty());
    assert_eq!(manager.buffer_stats().items, 0);
}

#[tokio::test]
async fn test_last_write_wins_per_path() {
    let manager = connected(TestEngine::new(), StorageConfig::default()).await;

    manager.write("ctx", "dir/a.json", json!(1)).await.unwrap();
    manager.write("ctx", "dir/a.json", json!(2)).await.unwrap();
    manager.flush("ctx").await.unwrap();

    let engine = manager.engine().unwrap();
    assert_eq!(engine.json("dir/a.json"), Some(json!(2)));
    assert_eq!(engine.writes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_nested_destination_is_created() {
    let manager = connected(TestEngine::new(), StorageConfig::default()).await;

    manager
        .write("ctx", "runs/7/out.jsonl", json!([{"a": 1}, {"a": 2}]))
        .await
        .unwrap();
    manager.flush_all().await.unwrap();

    let engine = manager.engine().unwrap();
    assert!(engine.fs.is_dir("runs"));
    assert_eq!(
        engine.file("runs/7/out.jsonl").unwrap(),
        b"{\"a\":1}\n{\"a\":2}\n"
    );
}

#[tokio::test]
async fn test_writes_during_flush_go_to_next_cycle() {
    let gate = Arc::new(Semaphore::new(0));
    let manager = connected(
        TestEngine::with_write_gate(Arc::clone(&gate)),
        StorageConfig::default(),
    )
    .await;

    manager.write("ctx", "a.json", json!({"x": 1})).await.unwrap();

    let flusher = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.flush("ctx").await })
    };

    // snapshot is taken before the first write starts
    let started = Arc::clone(&manager.engine().unwrap().write_started);
    started.notified().await;

    let outcome = manager.write("ctx", "b.json", json!({"x": 2})).await.unwrap();
    assert!(matches!(outcome, WriteOutcome::Buffered(usage) if usage.items == 1));

    gate.add_permits(1);
    let report = flusher.await.unwrap().unwrap();
    assert_eq!(report.paths, vec!["a.json"]);

    let queue = manager.queue("ctx").unwrap();
    assert_eq!(queue.paths(), vec!["b.json"]);

    gate.add_permits(1);
    let report = manager.flush("ctx").await.unwrap();
    assert_eq!(report.paths, vec!["b.json"]);
    assert!(queue.is_empty());
}

#[tokio::test]
async fn test_partial_failure_returns_remainder() {
    let engine = TestEngine::new();
    engine.fail_writes_to("b.json");
    let manager = connected(engine, StorageConfig::default()).await;

    for (path, x) in [("a.json", 1), ("b.json", 2), ("c.json", 3)] {
        manager.write("ctx", path, json!({"x": x})).await.unwrap();
    }

    let (written, failed_path, remainder) = match manager.flush("ctx").await {
        Err(BlobError::PartialFlush {
            written,
            failed_path,
            remainder,
            ..
        }) => (written, failed_path, remainder),
        other => panic!("Expected PartialFlush, got {other:?}"),
    };

    assert_eq!(written, 1);
    assert_eq!(failed_path, "b.json");
    let unwritten: Vec<&str> = remainder.iter().map(|e| e.path.as_str()).collect();
    assert_eq!(unwritten, vec!["b.json", "c.json"]);

    // already written entries stay, the live queue is empty regardless
    let engine = manager.engine().unwrap();
    assert_eq!(engine.json("a.json"), Some(json!({"x": 1})));
    assert_eq!(engine.json("c.json"), None);
    let queue = manager.queue("ctx").unwrap();
    assert!(queue.is_empty());
    assert!(!queue.is_draining());

    // the caller may put the remainder back
    let usage = manager.requeue("ctx", remainder).unwrap();
    assert_eq!(usage.items, 2);
    assert_eq!(queue.get("c.json"), Some(json!({"x": 3})));
}

#[tokio::test]
async fn test_requeue_keeps_newer_writes() {
    let engine = TestEngine::new();
    engine.fail_writes_to("a.json");
    let manager = connected(engine, StorageConfig::default()).await;

    manager.write("ctx", "a.json", json!({"v": "old"})).await.unwrap();
    manager.write("ctx", "b.json", json!({"v": "kept"})).await.unwrap();

    let remainder = match manager.flush("ctx").await {
        Err(BlobError::PartialFlush { remainder, .. }) => remainder,
        other => panic!("Expected PartialFlush, got {other:?}"),
    };
    assert_eq!(remainder.len(), 2);

    // a producer writes the same path again before the caller retries
    manager.write("ctx", "a.json", json!({"v": "new"})).await.unwrap();
    let usage = manager.requeue("ctx", remainder).unwrap();

    let queue = manager.queue("ctx").unwrap();
    assert_eq!(usage.items, 2);
    assert_eq!(queue.get("a.json"), Some(json!({"v": "new"})));
    assert_eq!(queue.get("b.json"), Some(json!({"v": "kept"})));
    assert_eq!(usage.bytes, queue.usage().bytes);
}

#[tokio::test]
async fn test_serialization_error_aborts_batch() {
    let manager = connected(TestEngine::new(), StorageConfig::default()).await;
    let queue = manager.open_queue("notes", "txt").unwrap();

    manager.write("notes", "a.txt", json!("fine")).await.unwrap();
    manager.write("notes", "b.txt", json!({"not": "text"})).await.unwrap();

    let err = manager.merge_to_backend(&queue).await.unwrap_err();
    assert!(matches!(
        err,
        BlobError::PartialFlush { written: 1, ref source, .. }
            if matches!(**source, BlobError::Serialization { .. })
    ));
    // no stray empty file for the rejected object
    assert!(manager.engine().unwrap().file("b.txt").is_none());
}

#[tokio::test(start_paused = true)]
async fn test_write_timeout() {
    let gate = Arc::new(Semaphore::new(0));
    let config = StorageConfig::default().with_write_timeout(Duration::from_secs(2));
    let manager = connected(TestEngine::with_write_gate(gate), config).await;

    manager.write("ctx", "slow.json", json!(1)).await.unwrap();

    let err = manager.flush("ctx").await.unwrap_err();
    assert!(matches!(
        err,
        BlobError::PartialFlush { ref source, .. }
            if matches!(**source, BlobError::WriteTimeout { .. })
    ));
    assert!(manager.queue("ctx").unwrap().is_empty());
}

#[tokio::test]
async fn test_flush_all_keeps_later_queues_on_failure() {
    let engine = TestEngine::new();
    engine.fail_writes_to("first/a.json");
    let manager = connected(engine, StorageConfig::default()).await;

    manager.write("first", "first/a.json", json!(1)).await.unwrap();
    manager.write("second", "second/b.json", json!(2)).await.unwrap();

    assert!(manager.flush_all().await.is_err());
    assert_eq!(manager.queue("second").unwrap().len(), 1);
    assert_eq!(manager.contexts(), vec!["first", "second"]);
}

#[tokio::test]
async fn test_write_through_without_buffering() {
    let config = StorageConfig::default().with_bufferize(false);
    let manager = connected(TestEngine::new(), config).await;

    let outcome = manager.write("ctx", "out/a.json", json!({"x": 1})).await.unwrap();

    assert_eq!(outcome, WriteOutcome::Written);
    assert!(manager.contexts().is_empty());
    assert_eq!(manager.read("out/a.json").await.unwrap(), json!({"x": 1}));
}
