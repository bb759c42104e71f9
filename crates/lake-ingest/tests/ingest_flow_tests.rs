//! End-to-end ingestion flows against in-memory services
//!
//! A temporary directory stands in for the watched location; every external
//! service is replaced by its `services::memory` counterpart.

use lake_common::types::{RecordOutcome, ResourceStatus, StreamRecord};
use lake_ingest::arrival::{ArrivalOutcome, S3Event};
use lake_ingest::config::IngestConfig;
use lake_ingest::engine::{Engine, Services};
use lake_ingest::pipeline::StageState;
use lake_ingest::services::memory::{
    MemoryDeliveryBuffer, MemoryDiscovery, MemoryObjectStore, MemoryRecordStream, MemoryTransformJobs,
    StatusScript,
};
use lake_ingest::services::ObjectStore;
use lake_ingest::snapshot::DirectorySnapshotter;
use lake_ingest::stream::ProduceMode;
use lake_ingest::watcher::Watcher;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const RAW: &str = "raw-zone";

// ============================================================================
// Test Helpers
// ============================================================================

struct Harness {
    _dir: TempDir,
    engine: Engine,
    store: Arc<MemoryObjectStore>,
    discovery: Arc<MemoryDiscovery>,
    jobs: Arc<MemoryTransformJobs>,
    stream: Arc<MemoryRecordStream>,
    cancel: CancellationToken,
}

fn harness_with(discovery: MemoryDiscovery) -> Harness {
    let dir = TempDir::new().expect("Failed to create temp dir");

    let mut config = IngestConfig::default();
    config.watch.dir = dir.path().to_path_buf();
    config.lake.raw_bucket = RAW.to_string();
    config.lake.key_prefix = String::new();
    config.discovery.interval_secs = 1;
    config.discovery.max_wait_secs = 10;
    config.stream.interval_secs = 1;
    config.stream.max_wait_secs = 10;
    config.stream.delivery_stream_name = None;

    let store = Arc::new(MemoryObjectStore::with_buckets([RAW]));
    let discovery = Arc::new(discovery);
    let jobs = Arc::new(MemoryTransformJobs::new());
    let stream = Arc::new(MemoryRecordStream::new(StatusScript::active()));

    let services = Services {
        objects: store.clone(),
        discovery: discovery.clone(),
        jobs: jobs.clone(),
        stream: stream.clone(),
        delivery: Arc::new(MemoryDeliveryBuffer::new(StatusScript::active())),
    };
    let cancel = CancellationToken::new();

    Harness {
        _dir: dir,
        engine: Engine::new(config, services, cancel.clone()),
        store,
        discovery,
        jobs,
        stream,
        cancel,
    }
}

fn harness() -> Harness {
    harness_with(MemoryDiscovery::new(StatusScript::active()))
}

fn write_file(dir: &Path, name: &str, contents: &str) {
    std::fs::write(dir.join(name), contents).expect("Failed to write fixture file");
}

// ============================================================================
// Directory -> raw zone -> pipeline
// ============================================================================

#[tokio::test]
async fn test_identical_files_keep_earlier_and_delete_later() {
    let h = harness();
    let dir = h.engine.config().watch.dir.clone();
    write_file(&dir, "flight_IND_SGP_20240101_120000.csv", "id,fare\n1,200\n");
    write_file(&dir, "flight_IND_SGP_20240102_120000.csv", "id,fare\n1,200\n");

    let mut watcher = Watcher::new(
        Arc::new(DirectorySnapshotter::new(dir.clone())),
        Arc::new(h.engine.ingester()),
        Duration::from_secs(1),
    );
    let batch = watcher.poll().await.expect("existing files form the first batch");
    assert_eq!(batch.len(), 2);

    let report = h.engine.ingester().ingest(&batch).await;

    assert_eq!(report.uploaded, 2);
    assert_eq!(report.duplicates, 1);
    assert_eq!(report.triggered, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(h.store.keys(RAW).await, vec!["flight_IND_SGP_20240101_120000.csv"]);
    assert_eq!(
        h.store.deleted().await,
        vec![format!("{RAW}/flight_IND_SGP_20240102_120000.csv")]
    );
    assert_eq!(h.discovery.starts().await.len(), 1);
    assert_eq!(h.jobs.runs().await.len(), 1);
}

#[tokio::test]
async fn test_only_new_files_are_ingested_on_later_ticks() {
    let h = harness();
    let dir = h.engine.config().watch.dir.clone();
    write_file(&dir, "flight_IND_SGP_20240101_120000.csv", "a\n");

    let mut watcher = Watcher::new(
        Arc::new(DirectorySnapshotter::new(dir.clone())),
        Arc::new(h.engine.ingester()),
        Duration::from_secs(1),
    );
    let first = watcher.poll().await.expect("first batch");
    h.engine.ingester().ingest(&first).await;

    assert!(watcher.poll().await.is_none());

    write_file(&dir, "hotel_USA_NYC_20240103_093000.txt", "b\n");
    write_file(&dir, "notes.md", "ignored\n");
    let second = watcher.poll().await.expect("second batch");

    assert_eq!(second.names(), ["hotel_USA_NYC_20240103_093000.txt"]);
    let report = h.engine.ingester().ingest(&second).await;
    assert_eq!(report.triggered, 1);
    assert_eq!(
        h.store.keys(RAW).await,
        vec!["flight_IND_SGP_20240101_120000.csv", "hotel_USA_NYC_20240103_093000.txt"]
    );
}

#[tokio::test]
async fn test_leap_day_file_is_ingested_and_invalid_date_is_ignored() {
    let h = harness();
    let dir = h.engine.config().watch.dir.clone();
    write_file(&dir, "flight_IND_SGP_20240229_235959.csv", "leap\n");
    write_file(&dir, "flight_IND_SGP_20230229_235959.csv", "not leap\n");

    let mut watcher = Watcher::new(
        Arc::new(DirectorySnapshotter::new(dir.clone())),
        Arc::new(h.engine.ingester()),
        Duration::from_secs(1),
    );
    let batch = watcher.poll().await.expect("first batch");

    assert_eq!(batch.names(), ["flight_IND_SGP_20240229_235959.csv"]);
}

#[tokio::test]
async fn test_watch_loop_dispatches_and_stops_on_cancel() {
    let h = harness();
    let dir = h.engine.config().watch.dir.clone();

    let watcher = Watcher::new(
        Arc::new(DirectorySnapshotter::new(dir.clone())),
        Arc::new(h.engine.ingester()),
        Duration::from_millis(20),
    );
    let handle = watcher.start(h.cancel.clone());

    tokio::time::sleep(Duration::from_millis(60)).await;
    write_file(&dir, "sales_EUR_PAR_20240105_101500.csv", "id\n7\n");

    let mut uploaded = false;
    for _ in 0..100 {
        if !h.jobs.runs().await.is_empty() {
            uploaded = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    h.cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("watch loop did not stop")
        .expect("watch loop panicked");

    assert!(uploaded, "new file never reached the transform stage");
    assert_eq!(h.store.keys(RAW).await, vec!["sales_EUR_PAR_20240105_101500.csv"]);
}

// ============================================================================
// Event notifications
// ============================================================================

#[tokio::test]
async fn test_event_notification_with_duplicate_pair() {
    let h = harness();
    h.store.put(RAW, "first.csv", b"same".to_vec(), None).await.unwrap();
    h.store.put(RAW, "second.csv", b"same".to_vec(), None).await.unwrap();

    let event = S3Event::parse(
        r#"{"Records": [
            {"s3": {"bucket": {"name": "raw-zone"}, "object": {"key": "first.csv"}}},
            {"s3": {"bucket": {"name": "raw-zone"}, "object": {"key": "second.csv"}}}
        ]}"#,
    )
    .unwrap();

    let results = h.engine.arrival_handler().handle_event(&event).await.unwrap();

    assert_eq!(results.len(), 2);
    match &results[0].1 {
        Ok(ArrivalOutcome::Triggered(run)) => {
            assert_eq!(run.file_key, "first.csv");
            assert_eq!(run.discovery, StageState::Ready);
            assert_eq!(run.transform, StageState::Running);
        }
        other => panic!("expected a pipeline run, got {other:?}"),
    }
    assert!(matches!(
        &results[1].1,
        Ok(ArrivalOutcome::Duplicate { original, .. }) if original == "first.csv"
    ));
    assert_eq!(h.store.keys(RAW).await, vec!["first.csv"]);
}

#[tokio::test]
async fn test_one_event_per_object_keeps_the_earlier_upload() {
    let h = harness();
    h.store.put(RAW, "first.csv", b"same".to_vec(), None).await.unwrap();
    h.store.put(RAW, "second.csv", b"same".to_vec(), None).await.unwrap();
    let event_for = |key: &str| {
        S3Event::parse(&format!(
            r#"{{"Records": [{{"s3": {{"bucket": {{"name": "{RAW}"}}, "object": {{"key": "{key}"}}}}}}]}}"#
        ))
        .unwrap()
    };
    let handler = h.engine.arrival_handler();

    // Notifications may be delivered out of upload order
    let second = handler.handle_event(&event_for("second.csv")).await.unwrap();
    let first = handler.handle_event(&event_for("first.csv")).await.unwrap();

    assert!(matches!(
        &second[0].1,
        Ok(ArrivalOutcome::Duplicate { key, original }) if key == "second.csv" && original == "first.csv"
    ));
    assert!(matches!(
        &first[0].1,
        Ok(ArrivalOutcome::Triggered(run)) if run.file_key == "first.csv"
    ));
    assert_eq!(h.store.keys(RAW).await, vec!["first.csv"]);
    assert_eq!(h.store.deleted().await, vec![format!("{RAW}/second.csv")]);
    assert_eq!(h.jobs.runs().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_crawler_stops_before_transform() {
    let h = harness_with(MemoryDiscovery::new(StatusScript::new([
        ResourceStatus::Starting,
        ResourceStatus::Error,
    ])));
    h.store.put(RAW, "a.csv", b"one".to_vec(), None).await.unwrap();

    let failure = h.engine.pipeline().trigger("a.csv").await.unwrap_err();

    assert_eq!(failure.run.discovery, StageState::Failed);
    assert_eq!(failure.run.transform, StageState::NotStarted);
    assert!(h.jobs.runs().await.is_empty());
}

// ============================================================================
// Record stream
// ============================================================================

#[tokio::test]
async fn test_stream_batch_resends_rejected_records() {
    let h = harness();
    h.stream
        .script_batch(vec![
            RecordOutcome::Success,
            RecordOutcome::failed("ProvisionedThroughputExceededException"),
            RecordOutcome::Success,
        ])
        .await;
    let records: Vec<StreamRecord> = ["a", "b", "c"]
        .into_iter()
        .map(|payload| StreamRecord::new(payload, "lake-ingest"))
        .collect();

    let ingress = h.engine.stream_ingress();
    ingress.wait_until_ready().await.unwrap();
    let report = ingress.produce(&records, ProduceMode::Batch).await.unwrap();

    assert_eq!(report.sent, 3);
    assert_eq!(report.failed, 0);
    assert_eq!(report.resent, 1);
    let puts = h.stream.puts().await;
    assert_eq!(puts.len(), 1);
    assert_eq!(puts[0].payload, b"b".to_vec());
}
