//! Moves newly detected files into the raw zone
//!
//! Every name in a batch is read from the watched directory and put under
//! `{key_prefix}{name}`. The uploaded keys are then handled together by the
//! [`ArrivalHandler`], so duplicates within one batch resolve in batch order.

use async_trait::async_trait;
use lake_common::{LakeError, Result};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use crate::arrival::{ArrivalHandler, ArrivalOutcome};
use crate::naming;
use crate::services::ObjectStore;
use crate::snapshot::ArrivalBatch;
use crate::watcher::ArrivalSink;

/// Counts for one ingested batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub uploaded: usize,
    /// Files that disappeared before they could be read
    pub vanished: usize,
    pub duplicates: usize,
    pub triggered: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct FileIngester {
    store: Arc<dyn ObjectStore>,
    source_dir: PathBuf,
    bucket: String,
    key_prefix: String,
    handler: ArrivalHandler,
}

impl FileIngester {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        source_dir: impl Into<PathBuf>,
        bucket: impl Into<String>,
        key_prefix: impl Into<String>,
        handler: ArrivalHandler,
    ) -> Self {
        Self {
            store,
            source_dir: source_dir.into(),
            bucket: bucket.into(),
            key_prefix: key_prefix.into(),
            handler,
        }
    }

    /// Upload one file; `Ok(None)` when it is no longer there
    pub async fn upload_file(&self, name: &str) -> Result<Option<String>> {
        let path = self.source_dir.join(name);
        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                warn!(file = name, "File vanished before upload");
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };

        let content_type = naming::classify(name)
            .ok()
            .map(|descriptor| descriptor.extension.content_type());
        let key = format!("{}{}", self.key_prefix, name);

        self.store.put(&self.bucket, &key, data, content_type).await?;
        debug!(file = name, key = %key, "File uploaded");
        Ok(Some(key))
    }

    /// Upload every file of `batch`, then process the uploaded keys
    #[instrument(skip(self, batch), fields(bucket = %self.bucket, files = batch.len()))]
    pub async fn ingest(&self, batch: &ArrivalBatch) -> IngestReport {
        let mut report = IngestReport::default();
        let mut keys = Vec::with_capacity(batch.len());

        for name in batch.names() {
            match self.upload_file(name).await {
                Ok(Some(key)) => {
                    report.uploaded += 1;
                    keys.push(key);
                }
                Ok(None) => report.vanished += 1,
                Err(err) => {
                    error!(file = %name, error = %err, "Upload failed");
                    report.failed += 1;
                }
            }
        }

        for (_, outcome) in self.handler.handle_batch(&keys).await {
            match outcome {
                Ok(ArrivalOutcome::Duplicate { .. }) => report.duplicates += 1,
                Ok(ArrivalOutcome::Triggered(_)) => report.triggered += 1,
                Err(_) => report.failed += 1,
            }
        }

        info!(
            uploaded = report.uploaded,
            vanished = report.vanished,
            duplicates = report.duplicates,
            triggered = report.triggered,
            failed = report.failed,
            "Batch ingested"
        );
        report
    }
}

#[async_trait]
impl ArrivalSink for FileIngester {
    async fn dispatch(&self, batch: ArrivalBatch) -> Result<()> {
        let report = self.ingest(&batch).await;
        if report.failed > 0 {
            return Err(LakeError::service(
                "ingest",
                format!("{} of {} files failed", report.failed, batch.len()),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::dedup::DuplicateSuppressor;
    use crate::pipeline::{PipelineSettings, PipelineTrigger};
    use crate::services::memory::{MemoryDiscovery, MemoryObjectStore, MemoryTransformJobs, StatusScript};
    use crate::wait::WaitPolicy;

    const A: &str = "flight_IND_SGP_20240101_120000.csv";
    const B: &str = "flight_IND_SGP_20240102_120000.csv";
    const C: &str = "hotel_USA_NYC_20240103_093000.txt";

    fn ingester(
        store: &Arc<MemoryObjectStore>,
        jobs: &Arc<MemoryTransformJobs>,
        dir: &std::path::Path,
    ) -> FileIngester {
        let handler = ArrivalHandler::new(
            DuplicateSuppressor::new(store.clone(), "raw", "incoming/"),
            PipelineTrigger::new(
                Arc::new(MemoryDiscovery::new(StatusScript::active())),
                jobs.clone(),
                PipelineSettings {
                    crawler_name: "raw-zone-crawler".to_string(),
                    job_name: "raw-to-trusted".to_string(),
                    discovery_wait: WaitPolicy::from_secs(1, 10),
                },
            ),
        );
        FileIngester::new(store.clone(), dir, "raw", "incoming/", handler)
    }

    #[tokio::test]
    async fn test_ingest_uploads_with_prefix_and_content_type() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(A), "a,1\n").unwrap();
        std::fs::write(dir.path().join(C), "hello").unwrap();
        let store = Arc::new(MemoryObjectStore::with_buckets(["raw"]));
        let jobs = Arc::new(MemoryTransformJobs::new());

        let batch: ArrivalBatch = [A, C].into_iter().collect();
        let report = ingester(&store, &jobs, dir.path()).ingest(&batch).await;

        assert_eq!(report.uploaded, 2);
        assert_eq!(report.triggered, 2);
        let csv = store.head("raw", &format!("incoming/{A}")).await.unwrap().unwrap();
        assert_eq!(csv.content_type.as_deref(), Some("text/csv"));
        let txt = store.head("raw", &format!("incoming/{C}")).await.unwrap().unwrap();
        assert_eq!(txt.content_type.as_deref(), Some("text/plain"));
    }

    #[tokio::test]
    async fn test_vanished_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(A), "a").unwrap();
        let store = Arc::new(MemoryObjectStore::with_buckets(["raw"]));
        let jobs = Arc::new(MemoryTransformJobs::new());

        let batch: ArrivalBatch = [A, B].into_iter().collect();
        let ingester = ingester(&store, &jobs, dir.path());
        let report = ingester.ingest(&batch).await;

        assert_eq!(report.uploaded, 1);
        assert_eq!(report.vanished, 1);
        assert_eq!(report.failed, 0);
        ingester.dispatch(batch).await.unwrap();
    }

    #[tokio::test]
    async fn test_identical_files_in_one_batch() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(A), "same").unwrap();
        std::fs::write(dir.path().join(B), "same").unwrap();
        let store = Arc::new(MemoryObjectStore::with_buckets(["raw"]));
        let jobs = Arc::new(MemoryTransformJobs::new());

        let batch: ArrivalBatch = [A, B].into_iter().collect();
        let report = ingester(&store, &jobs, dir.path()).ingest(&batch).await;

        assert_eq!(report.triggered, 1);
        assert_eq!(report.duplicates, 1);
        assert_eq!(store.keys("raw").await, vec![format!("incoming/{A}")]);
        assert_eq!(jobs.runs().await.len(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_reports_upload_failures() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(A), "a").unwrap();
        let store = Arc::new(MemoryObjectStore::with_buckets(["other"]));
        let jobs = Arc::new(MemoryTransformJobs::new());

        let batch: ArrivalBatch = [A].into_iter().collect();
        let err = ingester(&store, &jobs, dir.path()).dispatch(batch).await.unwrap_err();

        assert!(err.to_string().contains("1 of 1 files failed"));
    }
}
