//! Common types exchanged with the managed services

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::checksum::etags_match;

// ============================================================================
// Object Store Types
// ============================================================================

/// Identity of an object in the store, as far as duplicate detection cares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    pub bucket: String,
    pub key: String,
    /// Content fingerprint reported by the store (quoted or not)
    pub etag: String,
    pub size_bytes: i64,
    /// Orders copies of the same content; the oldest copy is the one kept
    pub last_modified: Option<DateTime<Utc>>,
}

impl StoredObject {
    pub fn new(
        bucket: impl Into<String>,
        key: impl Into<String>,
        etag: impl Into<String>,
        size_bytes: i64,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            etag: etag.into(),
            size_bytes,
            last_modified: None,
        }
    }

    /// Same content under a different key
    pub fn is_content_duplicate_of(&self, other: &StoredObject) -> bool {
        self.key != other.key
            && self.size_bytes == other.size_bytes
            && etags_match(&self.etag, &other.etag)
    }

    /// Whether `self` landed before `other`.
    ///
    /// Modification times decide when both are known and differ; otherwise
    /// the smaller key counts as older.
    pub fn landed_before(&self, other: &StoredObject) -> bool {
        match (self.last_modified, other.last_modified) {
            (Some(mine), Some(theirs)) if mine != theirs => mine < theirs,
            _ => self.key < other.key,
        }
    }
}

/// Metadata returned by a single-object lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    pub key: String,
    pub etag: String,
    pub size_bytes: i64,
    pub content_type: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
}

impl ObjectMetadata {
    pub fn into_stored(self, bucket: impl Into<String>) -> StoredObject {
        StoredObject {
            last_modified: self.last_modified,
            ..StoredObject::new(bucket, self.key, self.etag, self.size_bytes)
        }
    }
}

// ============================================================================
// Managed Resource Types
// ============================================================================

/// Lifecycle status of an asynchronously activated resource
/// (crawler, stream, delivery buffer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceStatus {
    /// Accepted but not usable yet
    Starting,
    /// Ready to be used
    Active,
    /// Going away; will never become active again
    Deleting,
    /// Failed; will never become active again
    Error,
}

impl ResourceStatus {
    pub fn is_active(self) -> bool {
        matches!(self, ResourceStatus::Active)
    }

    pub fn is_terminal_failure(self) -> bool {
        matches!(self, ResourceStatus::Deleting | ResourceStatus::Error)
    }
}

impl std::fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceStatus::Starting => write!(f, "STARTING"),
            ResourceStatus::Active => write!(f, "ACTIVE"),
            ResourceStatus::Deleting => write!(f, "DELETING"),
            ResourceStatus::Error => write!(f, "ERROR"),
        }
    }
}

// ============================================================================
// Stream Types
// ============================================================================

/// One record pushed into a stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamRecord {
    pub payload: Vec<u8>,
    pub partition_key: String,
}

impl StreamRecord {
    pub fn new(payload: impl Into<Vec<u8>>, partition_key: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            partition_key: partition_key.into(),
        }
    }
}

/// Per-record result of a batch put
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RecordOutcome {
    Success,
    Failed { error_code: String },
}

impl RecordOutcome {
    pub fn failed(error_code: impl Into<String>) -> Self {
        RecordOutcome::Failed {
            error_code: error_code.into(),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, RecordOutcome::Failed { .. })
    }
}
