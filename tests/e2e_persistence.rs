mod common;

use std::sync::Arc;

use portal_sync::{
    BatchPersistenceEngine, MemoryStore, Record, RecordStore, RetryConfig, RunStatus, SqliteStore,
    StoreError, TableName,
};
use tempfile::TempDir;

use common::{FaultyStore, records};

fn fast_retry() -> RetryConfig {
    RetryConfig::new(3, 1)
}

#[tokio::test]
async fn test_posts_scenario() {
    let engine = BatchPersistenceEngine::new(Arc::new(MemoryStore::new()));

    let first = engine
        .persist("Posts", records([1, 2]))
        .await
        .expect("first persist");
    assert_eq!(first.successful, 2);
    assert_eq!(first.failed, 0);

    let second = engine
        .persist("Posts", records([1, 3]))
        .await
        .expect("second persist");
    assert_eq!(second.successful, 1);
    assert_eq!(second.failed, 0);
    assert_eq!(second.already_existed(), 1);
}

#[tokio::test]
async fn test_persisting_twice_is_idempotent() {
    let tmp_dir = TempDir::new().expect("create temp dir");
    let store = SqliteStore::new(tmp_dir.path().join("sync.db")).expect("create store");
    let engine = BatchPersistenceEngine::new(Arc::new(store));

    let input: Vec<Record> = (1..=40)
        .map(|id| Record::with_id(id).attr("title", format!("post {id}")))
        .collect();

    let first = engine
        .persist("Posts", input.clone())
        .await
        .expect("first persist");
    assert_eq!(first.successful, 40);
    assert_eq!(first.failed, 0);

    let second = engine.persist("Posts", input).await.expect("second persist");
    assert_eq!(second.successful, 0);
    assert_eq!(second.failed, 0);
    assert_eq!(second.already_existed(), 40);
}

#[tokio::test]
async fn test_thirty_records_make_two_groups() {
    let store = Arc::new(FaultyStore::new());
    let engine = BatchPersistenceEngine::new(store.clone());

    let result = engine
        .persist("Events", records(1..=30))
        .await
        .expect("persist");

    assert_eq!(store.ensure_calls(), 2);
    assert_eq!(store.total_write_calls(), 30);
    assert!((1..=30).all(|id| store.write_calls(id) == 1));
    assert_eq!(result.successful, 30);
}

#[tokio::test]
async fn test_writes_fan_out_within_a_group_only() {
    let store = Arc::new(FaultyStore::new());
    let engine = BatchPersistenceEngine::new(store.clone());

    engine
        .persist("Events", records(1..=60))
        .await
        .expect("persist");

    assert_eq!(store.max_in_flight(), 25);
}

#[tokio::test]
async fn test_smaller_groups() {
    let store = Arc::new(FaultyStore::new());
    let engine = BatchPersistenceEngine::new(store.clone()).with_batch_size(10);

    engine
        .persist("Events", records(1..=25))
        .await
        .expect("persist");

    assert_eq!(store.ensure_calls(), 3);
    assert_eq!(store.max_in_flight(), 10);
}

#[tokio::test]
async fn test_failing_record_is_reported_after_retries() {
    let store = Arc::new(FaultyStore::new().fail_id(5));
    let engine = BatchPersistenceEngine::new(store.clone()).with_retry(fast_retry());

    let result = engine
        .persist("Grades", records([4, 5, 6]))
        .await
        .expect("persist");

    assert_eq!(store.write_calls(5), 3);
    assert_eq!(result.successful, 2);
    assert_eq!(result.failed, 1);
    assert_eq!(result.failed_items, vec![Record::with_id(5)]);
    assert!(result.failed_items[0].ttl().is_none());
}

#[tokio::test]
async fn test_counts_always_add_up() {
    let store = Arc::new(FaultyStore::new().fail_id(3).fail_id(17));
    let engine = BatchPersistenceEngine::new(store).with_retry(fast_retry());

    engine
        .persist("Posts", records([1, 2, 10]))
        .await
        .expect("seed");

    let mut input = records(1..=27);
    input.push(Record::new().attr("title", "missing id"));
    let total = input.len();

    let result = engine.persist("Posts", input).await.expect("persist");

    assert_eq!(result.attempted, total);
    assert_eq!(result.failed, 3);
    assert_eq!(result.already_existed(), 3);
    assert_eq!(
        result.successful + result.failed + result.already_existed(),
        total
    );
}

#[tokio::test]
async fn test_malformed_record_is_not_retried() {
    let store = Arc::new(FaultyStore::new());
    let engine = BatchPersistenceEngine::new(store.clone()).with_retry(fast_retry());

    let result = engine
        .persist("Posts", vec![Record::new().attr("Id", true)])
        .await
        .expect("persist");

    assert_eq!(result.failed, 1);
    assert_eq!(store.total_write_calls(), 1);
}

#[tokio::test]
async fn test_group_failure_keeps_partial_counts() {
    let store = Arc::new(FaultyStore::new().fail_ensure_after(1));
    let engine = BatchPersistenceEngine::new(store.clone());

    let err = engine
        .persist("Events", records(1..=30))
        .await
        .expect_err("second group cannot be attempted");

    assert!(matches!(err.source, StoreError::Unavailable(_)));
    assert_eq!(err.table, "Events");
    assert_eq!(err.partial.attempted, 25);
    assert_eq!(err.partial.successful, 25);
    assert_eq!(store.total_write_calls(), 25);

    let events = TableName::new("Events").unwrap();
    assert!(
        store
            .get(&events, &portal_sync::RecordId::Int(30))
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_persist_all_classifies_run() {
    let store = Arc::new(FaultyStore::new().fail_id(2));
    let engine = BatchPersistenceEngine::new(store).with_retry(fast_retry());

    let report = engine
        .persist_all(vec![
            ("Posts".to_string(), records([1, 2])),
            ("Events".to_string(), records([1])),
        ])
        .await;

    assert_eq!(report.successful(), 2);
    assert_eq!(report.failed(), 1);
    assert_eq!(report.status(), RunStatus::PartialSuccess);
    assert_eq!(report.result_for("Events").map(|r| r.successful), Some(1));
}
