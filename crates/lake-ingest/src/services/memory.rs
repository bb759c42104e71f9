//! In-memory implementations of the service traits
//!
//! Used by the test suites and for dry runs. The object store behaves like a
//! small S3 (MD5 ETags, idempotent deletes, missing buckets). The status
//! services replay a scripted sequence of statuses and then keep repeating
//! the last one.

use async_trait::async_trait;
use chrono::Utc;
use lake_common::checksum::etag;
use lake_common::types::{
    ObjectMetadata, RecordOutcome, ResourceStatus, StoredObject, StreamRecord,
};
use lake_common::{LakeError, Result};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::Mutex;

use super::{DeliveryBuffer, ObjectStore, RecordStream, SchemaDiscovery, TransformJobs};

// ============================================================================
// Object Store
// ============================================================================

#[derive(Debug, Clone)]
struct MemoryObject {
    data: Vec<u8>,
    etag: String,
    content_type: Option<String>,
    last_modified: chrono::DateTime<Utc>,
}

/// Bucket name -> key -> object
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    buckets: Mutex<BTreeMap<String, BTreeMap<String, MemoryObject>>>,
    deleted: Mutex<Vec<String>>,
    /// Time of the latest put; every put lands strictly after the one before
    last_write: Mutex<Option<chrono::DateTime<Utc>>>,
}

impl MemoryObjectStore {
    /// Store with the given buckets already created
    pub fn with_buckets<I, S>(buckets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let buckets = buckets
            .into_iter()
            .map(|name| (name.into(), BTreeMap::new()))
            .collect();
        Self {
            buckets: Mutex::new(buckets),
            deleted: Mutex::new(Vec::new()),
            last_write: Mutex::new(None),
        }
    }

    pub async fn create_bucket(&self, bucket: &str) {
        self.buckets
            .lock()
            .await
            .entry(bucket.to_string())
            .or_default();
    }

    /// Keys currently stored in `bucket`, in order
    pub async fn keys(&self, bucket: &str) -> Vec<String> {
        self.buckets
            .lock()
            .await
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn contents(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.buckets
            .lock()
            .await
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .map(|object| object.data.clone())
    }

    /// Every successful delete call, as `bucket/key`, in call order
    pub async fn deleted(&self) -> Vec<String> {
        self.deleted.lock().await.clone()
    }
}

fn no_such_bucket(operation: &str, bucket: &str) -> LakeError {
    LakeError::service(operation, format!("NoSuchBucket: {bucket}"))
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<StoredObject>> {
        let buckets = self.buckets.lock().await;
        let objects = buckets
            .get(bucket)
            .ok_or_else(|| no_such_bucket("memory:list", bucket))?;

        Ok(objects
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, object)| StoredObject {
                bucket: bucket.to_string(),
                key: key.clone(),
                etag: object.etag.clone(),
                size_bytes: object.data.len() as i64,
                last_modified: Some(object.last_modified),
            })
            .collect())
    }

    async fn head(&self, bucket: &str, key: &str) -> Result<Option<ObjectMetadata>> {
        let buckets = self.buckets.lock().await;
        let objects = buckets
            .get(bucket)
            .ok_or_else(|| no_such_bucket("memory:head", bucket))?;

        Ok(objects.get(key).map(|object| ObjectMetadata {
            key: key.to_string(),
            etag: object.etag.clone(),
            size_bytes: object.data.len() as i64,
            content_type: object.content_type.clone(),
            last_modified: Some(object.last_modified),
        }))
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        let mut buckets = self.buckets.lock().await;
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| no_such_bucket("memory:delete", bucket))?;

        objects.remove(key);
        self.deleted.lock().await.push(format!("{bucket}/{key}"));
        Ok(())
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<()> {
        let mut buckets = self.buckets.lock().await;
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| no_such_bucket("memory:put", bucket))?;

        let last_modified = {
            let mut last_write = self.last_write.lock().await;
            let now = match *last_write {
                Some(previous) => Utc::now().max(previous + chrono::Duration::milliseconds(1)),
                None => Utc::now(),
            };
            *last_write = Some(now);
            now
        };

        objects.insert(
            key.to_string(),
            MemoryObject {
                etag: etag(&data),
                data,
                content_type: content_type.map(str::to_string),
                last_modified,
            },
        );
        Ok(())
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        Ok(self.buckets.lock().await.contains_key(bucket))
    }
}

// ============================================================================
// Scripted Status
// ============================================================================

/// Replays a fixed sequence of statuses, then repeats the last one forever
#[derive(Debug)]
pub struct StatusScript {
    queue: Mutex<VecDeque<ResourceStatus>>,
    last: Mutex<ResourceStatus>,
    polls: AtomicU32,
}

impl StatusScript {
    pub fn new(statuses: impl IntoIterator<Item = ResourceStatus>) -> Self {
        Self {
            queue: Mutex::new(statuses.into_iter().collect()),
            last: Mutex::new(ResourceStatus::Starting),
            polls: AtomicU32::new(0),
        }
    }

    /// Always active
    pub fn active() -> Self {
        Self::new([ResourceStatus::Active])
    }

    async fn next(&self) -> ResourceStatus {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let mut last = self.last.lock().await;
        if let Some(next) = self.queue.lock().await.pop_front() {
            *last = next;
        }
        *last
    }

    /// Number of status calls served so far
    pub fn polls(&self) -> u32 {
        self.polls.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Schema Discovery / Transform Jobs
// ============================================================================

#[derive(Debug)]
pub struct MemoryDiscovery {
    script: StatusScript,
    starts: Mutex<Vec<String>>,
    start_error: Option<String>,
}

impl MemoryDiscovery {
    pub fn new(script: StatusScript) -> Self {
        Self {
            script,
            starts: Mutex::new(Vec::new()),
            start_error: None,
        }
    }

    /// Every start call fails with `message`
    pub fn failing_start(mut self, message: impl Into<String>) -> Self {
        self.start_error = Some(message.into());
        self
    }

    /// Names passed to accepted start calls, in call order
    pub async fn starts(&self) -> Vec<String> {
        self.starts.lock().await.clone()
    }

    pub fn polls(&self) -> u32 {
        self.script.polls()
    }
}

#[async_trait]
impl SchemaDiscovery for MemoryDiscovery {
    async fn start(&self, name: &str) -> Result<()> {
        if let Some(message) = &self.start_error {
            return Err(LakeError::service("memory:start_crawler", message));
        }
        self.starts.lock().await.push(name.to_string());
        Ok(())
    }

    async fn status(&self, _name: &str) -> Result<ResourceStatus> {
        Ok(self.script.next().await)
    }
}

#[derive(Debug, Default)]
pub struct MemoryTransformJobs {
    runs: Mutex<Vec<(String, String)>>,
    start_error: Option<String>,
}

impl MemoryTransformJobs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_start(mut self, message: impl Into<String>) -> Self {
        self.start_error = Some(message.into());
        self
    }

    /// `(job_name, run_id)` for every started run
    pub async fn runs(&self) -> Vec<(String, String)> {
        self.runs.lock().await.clone()
    }
}

#[async_trait]
impl TransformJobs for MemoryTransformJobs {
    async fn start(&self, job_name: &str) -> Result<String> {
        if let Some(message) = &self.start_error {
            return Err(LakeError::service("memory:start_job_run", message));
        }
        let mut runs = self.runs.lock().await;
        let run_id = format!("jr_{:04}", runs.len() + 1);
        runs.push((job_name.to_string(), run_id.clone()));
        Ok(run_id)
    }
}

// ============================================================================
// Streams
// ============================================================================

#[derive(Debug)]
pub struct MemoryRecordStream {
    script: StatusScript,
    batch_outcomes: Mutex<VecDeque<Vec<RecordOutcome>>>,
    put_failures: AtomicU32,
    puts: Mutex<Vec<StreamRecord>>,
    batches: Mutex<Vec<Vec<StreamRecord>>>,
}

impl MemoryRecordStream {
    pub fn new(script: StatusScript) -> Self {
        Self {
            script,
            batch_outcomes: Mutex::new(VecDeque::new()),
            put_failures: AtomicU32::new(0),
            puts: Mutex::new(Vec::new()),
            batches: Mutex::new(Vec::new()),
        }
    }

    /// Queue the outcomes for the next batch call. Batch calls with nothing
    /// queued report every record as stored.
    pub async fn script_batch(&self, outcomes: Vec<RecordOutcome>) {
        self.batch_outcomes.lock().await.push_back(outcomes);
    }

    /// Make the next `count` single puts fail
    pub fn fail_next_puts(&self, count: u32) {
        self.put_failures.store(count, Ordering::SeqCst);
    }

    /// Records accepted by single puts, in call order
    pub async fn puts(&self) -> Vec<StreamRecord> {
        self.puts.lock().await.clone()
    }

    /// Every batch call's records, in call order
    pub async fn batches(&self) -> Vec<Vec<StreamRecord>> {
        self.batches.lock().await.clone()
    }

    pub fn polls(&self) -> u32 {
        self.script.polls()
    }
}

#[async_trait]
impl RecordStream for MemoryRecordStream {
    async fn status(&self, _stream: &str) -> Result<ResourceStatus> {
        Ok(self.script.next().await)
    }

    async fn put(&self, _stream: &str, record: &StreamRecord) -> Result<()> {
        let remaining = self.put_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.put_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(LakeError::service(
                "memory:put_record",
                "ProvisionedThroughputExceededException",
            ));
        }
        self.puts.lock().await.push(record.clone());
        Ok(())
    }

    async fn put_batch(
        &self,
        _stream: &str,
        records: &[StreamRecord],
    ) -> Result<Vec<RecordOutcome>> {
        self.batches.lock().await.push(records.to_vec());
        let outcomes = self
            .batch_outcomes
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| vec![RecordOutcome::Success; records.len()]);
        Ok(outcomes)
    }
}

#[derive(Debug)]
pub struct MemoryDeliveryBuffer {
    script: StatusScript,
}

impl MemoryDeliveryBuffer {
    pub fn new(script: StatusScript) -> Self {
        Self { script }
    }

    pub fn polls(&self) -> u32 {
        self.script.polls()
    }
}

#[async_trait]
impl DeliveryBuffer for MemoryDeliveryBuffer {
    async fn status(&self, _name: &str) -> Result<ResourceStatus> {
        Ok(self.script.next().await)
    }
}
