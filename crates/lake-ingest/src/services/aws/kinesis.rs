use async_trait::async_trait;
use aws_sdk_kinesis::primitives::Blob;
use aws_sdk_kinesis::types::{PutRecordsRequestEntry, StreamStatus};
use aws_sdk_kinesis::Client;
use lake_common::types::{RecordOutcome, ResourceStatus, StreamRecord};
use lake_common::{LakeError, Result};
use tracing::{debug, instrument, warn};

use super::service_error;
use crate::services::RecordStream;

/// [`RecordStream`] backed by a Kinesis data stream
#[derive(Clone)]
pub struct KinesisStream {
    client: Client,
}

impl KinesisStream {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// Kinesis keeps accepting writes while a stream is `UPDATING`
fn stream_status(status: &StreamStatus) -> ResourceStatus {
    match status {
        StreamStatus::Active | StreamStatus::Updating => ResourceStatus::Active,
        StreamStatus::Deleting => ResourceStatus::Deleting,
        _ => ResourceStatus::Starting,
    }
}

#[async_trait]
impl RecordStream for KinesisStream {
    #[instrument(skip(self))]
    async fn status(&self, stream: &str) -> Result<ResourceStatus> {
        let response = self
            .client
            .describe_stream_summary()
            .stream_name(stream)
            .send()
            .await
            .map_err(|e| service_error("kinesis:describe_stream_summary", e))?;

        let summary = response.stream_description_summary().ok_or_else(|| {
            LakeError::service(
                "kinesis:describe_stream_summary",
                format!("stream {stream} missing from response"),
            )
        })?;

        Ok(stream_status(summary.stream_status()))
    }

    #[instrument(skip(self, record), fields(partition_key = %record.partition_key))]
    async fn put(&self, stream: &str, record: &StreamRecord) -> Result<()> {
        let response = self
            .client
            .put_record()
            .stream_name(stream)
            .partition_key(&record.partition_key)
            .data(Blob::new(record.payload.clone()))
            .send()
            .await
            .map_err(|e| service_error("kinesis:put_record", e))?;

        debug!(shard = response.shard_id(), sequence = response.sequence_number(), "Record stored");
        Ok(())
    }

    #[instrument(skip(self, records), fields(records = records.len()))]
    async fn put_batch(
        &self,
        stream: &str,
        records: &[StreamRecord],
    ) -> Result<Vec<RecordOutcome>> {
        let entries = records
            .iter()
            .map(|record| {
                PutRecordsRequestEntry::builder()
                    .data(Blob::new(record.payload.clone()))
                    .partition_key(&record.partition_key)
                    .build()
                    .map_err(|e| LakeError::service("kinesis:put_records", e))
            })
            .collect::<Result<Vec<_>>>()?;

        let response = self
            .client
            .put_records()
            .stream_name(stream)
            .set_records(Some(entries))
            .send()
            .await
            .map_err(|e| service_error("kinesis:put_records", e))?;

        let outcomes: Vec<RecordOutcome> = response
            .records()
            .iter()
            .map(|entry| match entry.error_code() {
                Some(code) => RecordOutcome::failed(code),
                None => RecordOutcome::Success,
            })
            .collect();

        let failed = response.failed_record_count().unwrap_or_default();
        if failed > 0 {
            warn!(failed, total = records.len(), "Batch partially rejected");
        }

        Ok(outcomes)
    }
}
