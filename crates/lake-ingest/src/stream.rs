//! Stream ingress
//!
//! Records go into the stream one at a time or in batch calls. A batch call
//! can partially fail: every entry the service flags as failed is resent on
//! its own, up to a fixed number of attempts. The batch as a whole is never
//! resubmitted, so entries that were stored are not duplicated by a retry.

use lake_common::types::{RecordOutcome, ResourceStatus, StreamRecord};
use lake_common::{LakeError, Result};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::StreamConfig;
use crate::services::{DeliveryBuffer, RecordStream};
use crate::wait::{wait_until_active, Activated, WaitPolicy};

/// Most records the stream service takes in one batch call
pub const MAX_BATCH_RECORDS: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSettings {
    pub stream_name: String,
    pub delivery_stream_name: Option<String>,
    pub wait: WaitPolicy,
    pub max_resend_attempts: u32,
    pub batch_size: usize,
}

impl StreamSettings {
    pub fn from_config(config: &StreamConfig) -> Self {
        Self {
            stream_name: config.stream_name.clone(),
            delivery_stream_name: config.delivery_stream_name.clone(),
            wait: config.wait(),
            max_resend_attempts: config.max_resend_attempts,
            batch_size: config.batch_size,
        }
    }
}

/// Final outcome of one batch call after resends
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// One outcome per input record, in input order
    pub outcomes: Vec<RecordOutcome>,
    /// Indices the batch call flagged as failed and that were resent, in
    /// the order they were resent
    pub resent: Vec<usize>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.is_failed()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failed()).count()
    }
}

/// How [`StreamIngress::produce`] sends records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProduceMode {
    Single,
    Batch,
}

/// Totals for a [`StreamIngress::produce`] call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProduceReport {
    pub sent: usize,
    pub failed: usize,
    pub resent: usize,
}

#[derive(Clone)]
pub struct StreamIngress {
    stream: Arc<dyn RecordStream>,
    delivery: Option<Arc<dyn DeliveryBuffer>>,
    settings: StreamSettings,
    cancel: CancellationToken,
}

impl StreamIngress {
    pub fn new(stream: Arc<dyn RecordStream>, settings: StreamSettings) -> Self {
        Self {
            stream,
            delivery: None,
            settings,
            cancel: CancellationToken::new(),
        }
    }

    /// Delivery buffer to wait for; only consulted when a delivery stream name is configured
    pub fn with_delivery(mut self, delivery: Arc<dyn DeliveryBuffer>) -> Self {
        self.delivery = Some(delivery);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn settings(&self) -> &StreamSettings {
        &self.settings
    }

    /// Put one record. Service errors are returned as is.
    pub async fn put_one(&self, record: &StreamRecord) -> Result<()> {
        self.stream.put(&self.settings.stream_name, record).await
    }

    /// Submit `records` in a single batch call and resend the entries it flags.
    #[instrument(skip(self, records), fields(stream = %self.settings.stream_name, records = records.len()))]
    pub async fn put_batch(&self, records: &[StreamRecord]) -> Result<BatchReport> {
        if records.is_empty() {
            return Ok(BatchReport::default());
        }
        if records.len() > MAX_BATCH_RECORDS {
            return Err(LakeError::validation(format!(
                "batch of {} records exceeds the limit of {}",
                records.len(),
                MAX_BATCH_RECORDS
            )));
        }

        let mut outcomes = self
            .stream
            .put_batch(&self.settings.stream_name, records)
            .await?;

        if outcomes.len() != records.len() {
            return Err(LakeError::service(
                "stream:put_batch",
                format!("{} outcomes for {} records", outcomes.len(), records.len()),
            ));
        }

        let flagged: Vec<usize> = outcomes
            .iter()
            .enumerate()
            .filter(|(_, outcome)| outcome.is_failed())
            .map(|(index, _)| index)
            .collect();

        let resent = if self.settings.max_resend_attempts == 0 {
            if !flagged.is_empty() {
                warn!(failed = flagged.len(), "Resends disabled; keeping failed entries as reported");
            }
            Vec::new()
        } else {
            flagged
        };

        for &index in &resent {
            outcomes[index] = self.resend(index, &records[index]).await;
        }

        let report = BatchReport { outcomes, resent };
        debug!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            resent = report.resent.len(),
            "Batch finished"
        );
        Ok(report)
    }

    /// Put `record` on its own until it is stored or the attempts run out.
    /// Call only with `max_resend_attempts > 0`.
    async fn resend(&self, index: usize, record: &StreamRecord) -> RecordOutcome {
        let mut last_error = String::new();

        for attempt in 1..=self.settings.max_resend_attempts {
            match self.put_one(record).await {
                Ok(()) => {
                    debug!(index, attempt, "Record resent");
                    return RecordOutcome::Success;
                }
                Err(err) => {
                    warn!(index, attempt, error = %err, "Resend failed");
                    last_error = err.to_string();
                }
            }
        }

        RecordOutcome::failed(last_error)
    }

    /// Send every record, one call each or in batches of `batch_size`
    pub async fn produce(&self, records: &[StreamRecord], mode: ProduceMode) -> Result<ProduceReport> {
        let mut report = ProduceReport::default();

        match mode {
            ProduceMode::Single => {
                for record in records {
                    self.put_one(record).await?;
                    report.sent += 1;
                }
            }
            ProduceMode::Batch => {
                let size = self.settings.batch_size.clamp(1, MAX_BATCH_RECORDS);
                for chunk in records.chunks(size) {
                    let batch = self.put_batch(chunk).await?;
                    report.sent += batch.succeeded();
                    report.failed += batch.failed();
                    report.resent += batch.resent.len();
                }
            }
        }

        info!(
            stream = %self.settings.stream_name,
            sent = report.sent,
            failed = report.failed,
            resent = report.resent,
            "Records produced"
        );
        Ok(report)
    }

    pub async fn wait_for_stream_active(&self) -> Result<Activated<ResourceStatus>> {
        let name = &self.settings.stream_name;
        wait_until_active(&format!("stream {name}"), self.settings.wait, &self.cancel, || {
            self.stream.status(name)
        })
        .await
    }

    /// `None` when no delivery buffer is configured
    pub async fn wait_for_delivery_active(&self) -> Result<Option<Activated<ResourceStatus>>> {
        let (Some(delivery), Some(name)) = (&self.delivery, &self.settings.delivery_stream_name)
        else {
            return Ok(None);
        };

        let activated = wait_until_active(
            &format!("delivery stream {name}"),
            self.settings.wait,
            &self.cancel,
            || delivery.status(name),
        )
        .await?;
        Ok(Some(activated))
    }

    /// Wait for the stream, then the delivery buffer if there is one
    pub async fn wait_until_ready(&self) -> Result<()> {
        self.wait_for_stream_active().await?;
        self.wait_for_delivery_active().await?;
        Ok(())
    }
}

/// One record per line of `path`, line terminators kept
pub async fn read_records(path: &Path, partition_key: &str) -> Result<Vec<StreamRecord>> {
    let content = tokio::fs::read(path).await?;
    Ok(content
        .split_inclusive(|b| *b == b'\n')
        .filter(|line| !line.iter().all(u8::is_ascii_whitespace))
        .map(|line| StreamRecord::new(line.to_vec(), partition_key))
        .collect())
}
