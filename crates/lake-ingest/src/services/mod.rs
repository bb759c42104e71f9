//! Managed service interfaces
//!
//! The engine only talks to the outside world through these traits. Each has
//! an AWS implementation in [`aws`] and an in-memory one in [`memory`].
//! Handles are built once at startup and injected as `Arc<dyn Trait>`.

use async_trait::async_trait;
use lake_common::types::{
    ObjectMetadata, RecordOutcome, ResourceStatus, StoredObject, StreamRecord,
};
use lake_common::Result;

pub mod aws;
pub mod memory;

/// Object store holding the lake zones
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Every object under `prefix`, in key order
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<StoredObject>>;

    /// Metadata for one object; `None` when it does not exist
    async fn head(&self, bucket: &str, key: &str) -> Result<Option<ObjectMetadata>>;

    /// Remove an object. Removing a missing key succeeds.
    async fn delete(&self, bucket: &str, key: &str) -> Result<()>;

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<()>;

    async fn bucket_exists(&self, bucket: &str) -> Result<bool>;
}

/// Schema discovery (catalog crawler)
#[async_trait]
pub trait SchemaDiscovery: Send + Sync {
    /// Ask the service to start a discovery run. Returning `Ok` only means
    /// the request was accepted.
    async fn start(&self, name: &str) -> Result<()>;

    async fn status(&self, name: &str) -> Result<ResourceStatus>;
}

/// Transform job runner
#[async_trait]
pub trait TransformJobs: Send + Sync {
    /// Start a run of `job_name` and return its run id
    async fn start(&self, job_name: &str) -> Result<String>;
}

/// Record stream
#[async_trait]
pub trait RecordStream: Send + Sync {
    async fn status(&self, stream: &str) -> Result<ResourceStatus>;

    async fn put(&self, stream: &str, record: &StreamRecord) -> Result<()>;

    /// Submit `records` in one call. The result has one outcome per input
    /// record, in input order.
    async fn put_batch(&self, stream: &str, records: &[StreamRecord])
        -> Result<Vec<RecordOutcome>>;
}

/// Delivery buffer draining a stream into the lake
#[async_trait]
pub trait DeliveryBuffer: Send + Sync {
    async fn status(&self, name: &str) -> Result<ResourceStatus>;
}
