//! Handling of objects that landed in the raw zone
//!
//! Each arrival is checked for content duplicates first. A duplicate is
//! removed and goes no further; anything kept starts a pipeline run.

use lake_common::types::StoredObject;
use lake_common::{LakeError, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::dedup::{DuplicateSuppressor, Suppression};
use crate::pipeline::{PipelineFailure, PipelineRun, PipelineTrigger};

/// What happened to one arrived object
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ArrivalOutcome {
    Duplicate { key: String, original: String },
    Triggered(PipelineRun),
}

#[derive(Debug, Error)]
pub enum ArrivalError {
    #[error(transparent)]
    Suppression(#[from] LakeError),

    #[error(transparent)]
    Pipeline(#[from] PipelineFailure),
}

pub type ArrivalResult = std::result::Result<ArrivalOutcome, ArrivalError>;

// ============================================================================
// S3 Event Notifications
// ============================================================================

/// The parts of an S3 event notification this handler reads
#[derive(Debug, Clone, Deserialize)]
pub struct S3Event {
    #[serde(rename = "Records", default)]
    pub records: Vec<S3EventRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3EventRecord {
    pub s3: S3Entity,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3Entity {
    pub bucket: S3BucketEntity,
    pub object: S3ObjectEntity,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3BucketEntity {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3ObjectEntity {
    /// URL-encoded, with spaces as `+`
    pub key: String,
}

impl S3Event {
    pub fn parse(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// `(bucket, decoded key)` for every record, in order
    pub fn objects(&self) -> Result<Vec<(String, String)>> {
        self.records
            .iter()
            .map(|record| {
                let key = decode_key(&record.s3.object.key)?;
                Ok((record.s3.bucket.name.clone(), key))
            })
            .collect()
    }
}

/// Decode an event object key: `+` is a space, then percent-decoding
pub fn decode_key(raw: &str) -> Result<String> {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|key| key.into_owned())
        .map_err(|e| LakeError::validation(format!("object key {raw} is not valid UTF-8: {e}")))
}

// ============================================================================
// Handler
// ============================================================================

#[derive(Clone)]
pub struct ArrivalHandler {
    suppressor: DuplicateSuppressor,
    trigger: PipelineTrigger,
}

impl ArrivalHandler {
    pub fn new(suppressor: DuplicateSuppressor, trigger: PipelineTrigger) -> Self {
        Self { suppressor, trigger }
    }

    /// Handle a single arrival against the whole current population.
    ///
    /// The arrival is removed only when an identical object landed before it,
    /// so separate notifications for an identical pair keep the older key
    /// whatever order they are handled in.
    pub async fn handle(&self, key: &str) -> ArrivalResult {
        let suppression = self.suppressor.check(key).await?;
        self.finish(key, suppression).await
    }

    /// Handle arrivals that showed up together, in order.
    ///
    /// Each key is compared against the population minus the keys after it in
    /// the batch, with the keys before it counted as older, so of two
    /// identical arrivals the first is kept and the second removed. Every key
    /// gets an independent result.
    pub async fn handle_batch(&self, keys: &[String]) -> Vec<(String, ArrivalResult)> {
        if keys.is_empty() {
            return Vec::new();
        }

        let population = match self.suppressor.population().await {
            Ok(population) => population,
            Err(err) => {
                warn!(error = %err, "Could not list the raw zone");
                let message = err.to_string();
                return keys
                    .iter()
                    .map(|key| {
                        let err = LakeError::service("object_store:list", &message);
                        (key.clone(), Err(err.into()))
                    })
                    .collect();
            }
        };

        let mut results = Vec::with_capacity(keys.len());
        for (index, key) in keys.iter().enumerate() {
            let (earlier, rest) = keys.split_at(index);
            let later = &rest[1..];
            let visible: Vec<StoredObject> = population
                .iter()
                .filter(|o| !later.contains(&o.key))
                .cloned()
                .collect();

            let outcome = match self.suppressor.check_against(key, &visible, earlier).await {
                Ok(suppression) => self.finish(key, suppression).await,
                Err(err) => Err(err.into()),
            };
            if let Err(err) = &outcome {
                warn!(key = %key, error = %err, "Arrival not processed");
            }
            results.push((key.clone(), outcome));
        }
        results
    }

    /// Handle every record of an S3 event notification as one batch.
    ///
    /// Records for other buckets are skipped.
    pub async fn handle_event(&self, event: &S3Event) -> Result<Vec<(String, ArrivalResult)>> {
        let mut keys = Vec::new();
        for (bucket, key) in event.objects()? {
            if bucket == self.suppressor.bucket() {
                keys.push(key);
            } else {
                warn!(bucket = %bucket, key = %key, "Ignoring event for another bucket");
            }
        }
        Ok(self.handle_batch(&keys).await)
    }

    async fn finish(&self, key: &str, suppression: Suppression) -> ArrivalResult {
        match suppression {
            Suppression::Removed { duplicate, original } => Ok(ArrivalOutcome::Duplicate {
                key: duplicate.key,
                original,
            }),
            Suppression::Kept(_) => {
                let run = self.trigger.trigger(key).await?;
                info!(
                    key,
                    run_id = run.transform_run_id.as_deref().unwrap_or_default(),
                    "Arrival processed"
                );
                Ok(ArrivalOutcome::Triggered(run))
            }
        }
    }
}
