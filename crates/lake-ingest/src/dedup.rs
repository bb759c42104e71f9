//! Content-based duplicate suppression
//!
//! An object is a content duplicate when another object under a different
//! key has the same ETag and size and landed before it. Only the newer copy
//! is ever removed, so two handlers racing over the same pair both keep the
//! older one.
//!
//! Each check walks the whole population, so cost grows linearly with the
//! number of objects under the prefix.

use lake_common::types::StoredObject;
use lake_common::{LakeError, Result};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::services::ObjectStore;

/// Decision for one arrived object
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DedupAction {
    Keep,
    Delete(StoredObject),
}

/// First older object in `population` that `arrived` duplicates
pub fn find_original<'a>(
    arrived: &StoredObject,
    population: &'a [StoredObject],
) -> Option<&'a StoredObject> {
    find_original_after(arrived, population, &[])
}

/// Like [`find_original`], with `earlier` keys counted as older than
/// `arrived` whatever their timestamps say
fn find_original_after<'a>(
    arrived: &StoredObject,
    population: &'a [StoredObject],
    earlier: &[String],
) -> Option<&'a StoredObject> {
    population.iter().find(|existing| {
        arrived.is_content_duplicate_of(existing)
            && (earlier.contains(&existing.key) || existing.landed_before(arrived))
    })
}

/// Decide whether `arrived` should be removed
pub fn suppress_if_duplicate(arrived: &StoredObject, population: &[StoredObject]) -> DedupAction {
    match find_original(arrived, population) {
        Some(_) => DedupAction::Delete(arrived.clone()),
        None => DedupAction::Keep,
    }
}

/// Result of checking one key against the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Suppression {
    Kept(StoredObject),
    Removed {
        duplicate: StoredObject,
        original: String,
    },
}

/// Applies [`suppress_if_duplicate`] to objects in one bucket and prefix
#[derive(Clone)]
pub struct DuplicateSuppressor {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    prefix: String,
}

impl DuplicateSuppressor {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            prefix: prefix.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Current objects under the prefix
    pub async fn population(&self) -> Result<Vec<StoredObject>> {
        self.store.list(&self.bucket, &self.prefix).await
    }

    /// Check `key` against everything currently in the store
    pub async fn check(&self, key: &str) -> Result<Suppression> {
        let population = self.population().await?;
        self.check_against(key, &population, &[]).await
    }

    /// Check `key` against `population`, deleting it if it is a duplicate.
    ///
    /// `earlier` names keys that arrived before `key` in the same batch; they
    /// count as older even when the store's timestamps tie or disagree. The
    /// arrived object's identity comes from `population` when listed there,
    /// otherwise from a direct lookup.
    #[instrument(skip(self, population, earlier), fields(bucket = %self.bucket, population = population.len()))]
    pub async fn check_against(
        &self,
        key: &str,
        population: &[StoredObject],
        earlier: &[String],
    ) -> Result<Suppression> {
        let arrived = self.locate(key, population).await?;

        match find_original_after(&arrived, population, earlier) {
            None => {
                debug!(key, "No older content duplicate found");
                Ok(Suppression::Kept(arrived))
            }
            Some(original) => {
                let original = original.key.clone();
                self.store.delete(&self.bucket, &arrived.key).await?;
                warn!(key, original = %original, "Removed content duplicate");
                Ok(Suppression::Removed {
                    duplicate: arrived,
                    original,
                })
            }
        }
    }

    async fn locate(&self, key: &str, population: &[StoredObject]) -> Result<StoredObject> {
        if let Some(listed) = population.iter().find(|o| o.key == key) {
            return Ok(listed.clone());
        }

        // Listings can lag behind a fresh put
        match self.store.head(&self.bucket, key).await? {
            Some(metadata) => Ok(metadata.into_stored(self.bucket.as_str())),
            None => Err(LakeError::service(
                "object_store:head",
                format!("{key} is not visible in {}", self.bucket),
            )),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::services::memory::MemoryObjectStore;

    fn object(key: &str, etag: &str, size: i64) -> StoredObject {
        StoredObject::new("raw", key, etag, size)
    }

    #[test]
    fn test_identical_content_under_other_key_is_deleted() {
        let population = vec![object("k1", "e1", 100), object("k2", "e1", 100)];
        let arrived = object("k2", "e1", 100);

        assert_eq!(
            suppress_if_duplicate(&arrived, &population),
            DedupAction::Delete(arrived.clone())
        );
    }

    #[test]
    fn test_different_etag_is_kept() {
        let population = vec![object("k1", "e1", 100), object("k2", "e2", 100)];
        assert_eq!(
            suppress_if_duplicate(&object("k2", "e2", 100), &population),
            DedupAction::Keep
        );
    }

    #[test]
    fn test_different_size_is_kept() {
        let population = vec![object("k1", "e1", 100)];
        assert_eq!(
            suppress_if_duplicate(&object("k2", "e1", 99), &population),
            DedupAction::Keep
        );
    }

    #[test]
    fn test_object_is_never_its_own_duplicate() {
        let population = vec![object("k1", "e1", 100)];
        assert_eq!(
            suppress_if_duplicate(&object("k1", "e1", 100), &population),
            DedupAction::Keep
        );
    }

    #[test]
    fn test_quoting_does_not_matter() {
        let population = vec![object("k1", "\"e1\"", 100)];
        assert!(matches!(
            suppress_if_duplicate(&object("k2", "e1", 100), &population),
            DedupAction::Delete(_)
        ));
    }

    #[test]
    fn test_first_match_is_reported_as_original() {
        let population = vec![
            object("k0", "e9", 100),
            object("k1", "e1", 100),
            object("k3", "e1", 100),
        ];
        let arrived = object("k2", "e1", 100);
        assert_eq!(find_original(&arrived, &population).unwrap().key, "k1");
    }

    #[test]
    fn test_older_copy_is_kept_when_it_arrives_second() {
        use chrono::{TimeZone, Utc};

        let mut older = object("z_first.csv", "e1", 100);
        older.last_modified = Utc.timestamp_opt(1_704_100_000, 0).single();
        let mut newer = object("a_second.csv", "e1", 100);
        newer.last_modified = Utc.timestamp_opt(1_704_100_060, 0).single();
        let population = vec![newer.clone(), older.clone()];

        assert_eq!(suppress_if_duplicate(&older, &population), DedupAction::Keep);
        assert_eq!(
            suppress_if_duplicate(&newer, &population),
            DedupAction::Delete(newer.clone())
        );
    }

    #[tokio::test]
    async fn test_checking_the_older_copy_leaves_both_in_place() {
        let store = Arc::new(MemoryObjectStore::with_buckets(["raw"]));
        store.put("raw", "first.csv", b"same".to_vec(), None).await.unwrap();
        store.put("raw", "second.csv", b"same".to_vec(), None).await.unwrap();
        let suppressor = DuplicateSuppressor::new(store.clone(), "raw", "");

        let outcome = suppressor.check("first.csv").await.unwrap();

        assert!(matches!(outcome, Suppression::Kept(ref o) if o.key == "first.csv"));
        assert_eq!(store.keys("raw").await, vec!["first.csv", "second.csv"]);
    }

    #[tokio::test]
    async fn test_earlier_batch_key_wins_a_timestamp_tie() {
        let store = Arc::new(MemoryObjectStore::with_buckets(["raw"]));
        let suppressor = DuplicateSuppressor::new(store.clone(), "raw", "");
        store.put("raw", "z.csv", b"same".to_vec(), None).await.unwrap();
        store.put("raw", "a.csv", b"same".to_vec(), None).await.unwrap();
        let mut population = store.list("raw", "").await.unwrap();
        for object in &mut population {
            object.last_modified = None;
        }

        let outcome = suppressor
            .check_against("a.csv", &population, &["z.csv".to_string()])
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            Suppression::Removed { ref original, .. } if original == "z.csv"
        ));
        assert_eq!(store.keys("raw").await, vec!["z.csv"]);
    }

    #[tokio::test]
    async fn test_check_deletes_duplicate_from_store() {
        let store = Arc::new(MemoryObjectStore::with_buckets(["raw"]));
        store.put("raw", "a.csv", b"same".to_vec(), None).await.unwrap();
        store.put("raw", "b.csv", b"same".to_vec(), None).await.unwrap();
        store.put("raw", "c.csv", b"other".to_vec(), None).await.unwrap();
        let suppressor = DuplicateSuppressor::new(store.clone(), "raw", "");

        let outcome = suppressor.check("b.csv").await.unwrap();

        assert!(matches!(
            outcome,
            Suppression::Removed { ref original, .. } if original == "a.csv"
        ));
        assert_eq!(store.keys("raw").await, vec!["a.csv", "c.csv"]);
    }

    #[tokio::test]
    async fn test_check_keeps_unique_object() {
        let store = Arc::new(MemoryObjectStore::with_buckets(["raw"]));
        store.put("raw", "a.csv", b"one".to_vec(), None).await.unwrap();
        store.put("raw", "b.csv", b"two".to_vec(), None).await.unwrap();
        let suppressor = DuplicateSuppressor::new(store.clone(), "raw", "");

        let outcome = suppressor.check("b.csv").await.unwrap();

        assert!(matches!(outcome, Suppression::Kept(ref o) if o.key == "b.csv"));
        assert!(store.deleted().await.is_empty());
    }

    #[tokio::test]
    async fn test_check_falls_back_to_head_when_listing_lags() {
        let store = Arc::new(MemoryObjectStore::with_buckets(["raw"]));
        store.put("raw", "a.csv", b"same".to_vec(), None).await.unwrap();
        let stale_population = store.list("raw", "").await.unwrap();
        store.put("raw", "b.csv", b"same".to_vec(), None).await.unwrap();
        let suppressor = DuplicateSuppressor::new(store.clone(), "raw", "");

        let outcome = suppressor
            .check_against("b.csv", &stale_population, &[])
            .await
            .unwrap();

        assert!(matches!(outcome, Suppression::Removed { .. }));
        assert_eq!(store.keys("raw").await, vec!["a.csv"]);
    }

    #[tokio::test]
    async fn test_check_missing_object_is_an_error() {
        let store = Arc::new(MemoryObjectStore::with_buckets(["raw"]));
        let suppressor = DuplicateSuppressor::new(store, "raw", "");

        let err = suppressor.check("ghost.csv").await.unwrap_err();
        assert!(err.is_service_failure());
    }
}
