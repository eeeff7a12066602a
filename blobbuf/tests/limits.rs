//! Automatic flushes driven by the limit policy

#[macro_use]
extern crate hamcrest;

mod common;

use std::time::Duration;

use blobbuf::{BufferedStorage, LimitType, StorageConfig, StorageManager, WriteOutcome};
use common::TestEngine;
use hamcrest::prelude::*;
use serde_json::json;

async fn connected(config: StorageConfig) -> StorageManager<TestEngine> {
    let manager = StorageManager::new(TestEngine::new(), config).unwrap();
    manager.launch_session().await.unwrap();
    manager
}

#[tokio::test]
async fn test_none_policy_never_flushes() {
    let manager = connected(StorageConfig::default()).await;

    for i in 0..50 {
        let outcome = manager
            .write("ctx", &format!("item-{i}.json"), json!({"i": i}))
            .await
            .unwrap();
        assert!(matches!(outcome, WriteOutcome::Buffered(_)));
    }

    assert_that!(manager.buffer_stats().items, is(equal_to(50)));
    assert!(manager.engine().unwrap().fs.files().is_empty());
}

#[tokio::test]
async fn test_count_limit_flushes_all_queues() {
    let manager = connected(StorageConfig::default().with_limit(LimitType::Count, 2.0)).await;

    manager.write("left", "left/1.json", json!(1)).await.unwrap();
    manager.write("right", "right/1.json", json!(2)).await.unwrap();
    let outcome = manager.write("left", "left/2.json", json!(3)).await.unwrap();

    let WriteOutcome::Flushed(report) = outcome else {
        panic!("Expected a flush on the third item");
    };
    assert_that!(report.written(), is(equal_to(3)));
    assert_that!(
        report.paths,
        is(equal_to(vec![
            "left/1.json".to_string(),
            "left/2.json".to_string(),
            "right/1.json".to_string(),
        ]))
    );
    assert_that!(manager.buffer_stats().items, is(equal_to(0)));
}

#[tokio::test]
async fn test_memory_limit() {
    // 0.0001 MB is about 104 bytes
    let manager = connected(StorageConfig::default().with_limit(LimitType::Memory, 0.0001)).await;
    let payload = json!({"blob": "x".repeat(60)});

    let first = manager.write("ctx", "a.json", payload.clone()).await.unwrap();
    assert!(matches!(first, WriteOutcome::Buffered(usage) if usage.bytes > 60));

    let second = manager.write("ctx", "b.json", payload).await.unwrap();
    assert!(matches!(second, WriteOutcome::Flushed(ref report) if report.written() == 2));
}

#[tokio::test(start_paused = true)]
async fn test_time_limit_checked_on_write() {
    let manager = connected(StorageConfig::default().with_limit(LimitType::Time, 5.0)).await;

    let first = manager.write("ctx", "a.json", json!(1)).await.unwrap();
    assert!(matches!(first, WriteOutcome::Buffered(_)));
    assert!(!manager.limit_exceeded());

    tokio::time::advance(Duration::from_secs(6)).await;
    assert!(manager.limit_exceeded());

    let second = manager.write("ctx", "b.json", json!(2)).await.unwrap();
    assert!(matches!(second, WriteOutcome::Flushed(ref report) if report.written() == 2));
    assert!(!manager.limit_exceeded());
}

async fn ingest<S: BufferedStorage>(storage: &S, items: usize) -> usize {
    let mut flushed = 0;
    for i in 0..items {
        let outcome = storage
            .enqueue("ctx", &format!("{i}.json"), json!(i))
            .await
            .unwrap();
        if let WriteOutcome::Flushed(report) = outcome {
            flushed += report.written();
        }
    }
    flushed + storage.flush_all().await.unwrap().written()
}

#[tokio::test]
async fn test_buffered_storage_capability() {
    let manager = connected(StorageConfig::default().with_limit(LimitType::Count, 3.0)).await;

    let written = ingest(&manager, 10).await;

    assert_that!(written, is(equal_to(10)));
    assert_that!(manager.engine().unwrap().fs.files().len(), is(equal_to(10)));
    assert!(!manager.limit_exceeded());
}
