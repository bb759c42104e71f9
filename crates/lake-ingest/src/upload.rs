//! One-off dataset upload with pre-flight checks
//!
//! Checks run in order and the first failure stops the upload:
//!
//! 1. the path is absolute
//! 2. it exists and is a regular file
//! 3. its name has exactly one extension, one of csv, tsv, xlsx or txt
//! 4. it is not empty, unless empty files are allowed
//! 5. the target bucket exists
//!
//! The object key is the file's base name unless one is given.

use lake_common::checksum::etag;
use lake_common::{LakeError, Result};
use serde::Serialize;
use std::path::Path;
use tracing::{info, instrument};

use crate::services::ObjectStore;

/// Extensions accepted for dataset uploads
pub const UPLOAD_EXTENSIONS: [&str; 4] = ["csv", "tsv", "xlsx", "txt"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadOptions {
    pub allow_empty: bool,
    /// Object key; defaults to the file's base name
    pub key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadReceipt {
    pub bucket: String,
    pub key: String,
    pub size_bytes: i64,
    pub etag: String,
}

fn content_type(extension: &str) -> &'static str {
    match extension {
        "csv" => "text/csv",
        "tsv" => "text/tab-separated-values",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        _ => "text/plain",
    }
}

/// Check that `name` carries a single accepted extension and return it
pub fn check_extension(name: &str) -> Result<&str> {
    let path = Path::new(name);
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();

    if Path::new(stem).extension().is_some() {
        return Err(LakeError::validation(format!("{name} has more than one extension")));
    }

    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if UPLOAD_EXTENSIONS.contains(&ext) => Ok(ext),
        Some(ext) => Err(LakeError::validation(format!(
            "extension .{ext} is not accepted (expected one of {})",
            UPLOAD_EXTENSIONS.join(", ")
        ))),
        None => Err(LakeError::validation(format!("{name} has no extension"))),
    }
}

/// Upload the file at `path` into `bucket` after the pre-flight checks
#[instrument(skip(store, path, options), fields(path = %path.display()))]
pub async fn upload_dataset(
    store: &dyn ObjectStore,
    path: &Path,
    bucket: &str,
    options: &UploadOptions,
) -> Result<UploadReceipt> {
    if !path.is_absolute() {
        return Err(LakeError::validation(format!(
            "{} is not an absolute path",
            path.display()
        )));
    }

    let metadata = match tokio::fs::metadata(path).await {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(LakeError::validation(format!(
                "no file exists at {}",
                path.display()
            )));
        }
        Err(err) => return Err(err.into()),
    };
    if metadata.is_dir() {
        return Err(LakeError::validation(format!("{} is a directory", path.display())));
    }
    if !metadata.is_file() {
        return Err(LakeError::validation(format!(
            "{} is not a regular file",
            path.display()
        )));
    }

    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| LakeError::validation(format!("{} has no usable file name", path.display())))?;
    let extension = check_extension(name)?;

    if metadata.len() == 0 && !options.allow_empty {
        return Err(LakeError::validation(format!("{name} is empty")));
    }

    if !store.bucket_exists(bucket).await? {
        return Err(LakeError::validation(format!("bucket {bucket} was not found")));
    }

    let key = options.key.clone().unwrap_or_else(|| name.to_string());
    let data = tokio::fs::read(path).await?;
    let receipt = UploadReceipt {
        bucket: bucket.to_string(),
        key,
        size_bytes: data.len() as i64,
        etag: etag(&data),
    };

    store
        .put(bucket, &receipt.key, data, Some(content_type(extension)))
        .await?;

    info!(bucket, key = %receipt.key, size = receipt.size_bytes, "Dataset uploaded");
    Ok(receipt)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::services::memory::MemoryObjectStore;

    fn message(err: LakeError) -> String {
        match err {
            LakeError::Validation(message) => message,
            other => panic!("expected a validation error, got {other}"),
        }
    }

    #[test]
    fn test_check_extension() {
        assert_eq!(check_extension("sales.csv").unwrap(), "csv");
        assert_eq!(check_extension("sales.xlsx").unwrap(), "xlsx");
        assert!(message(check_extension("sales.tar.csv").unwrap_err()).contains("more than one"));
        assert!(message(check_extension("sales.json").unwrap_err()).contains(".json"));
        assert!(message(check_extension("sales").unwrap_err()).contains("no extension"));
    }

    #[tokio::test]
    async fn test_uploads_under_base_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sales.tsv");
        std::fs::write(&path, "a\tb\n").unwrap();
        let store = MemoryObjectStore::with_buckets(["datasets"]);

        let receipt = upload_dataset(&store, &path, "datasets", &UploadOptions::default())
            .await
            .unwrap();

        assert_eq!(receipt.key, "sales.tsv");
        assert_eq!(receipt.size_bytes, 4);
        assert_eq!(receipt.etag, etag(b"a\tb\n"));
        let head = store.head("datasets", "sales.tsv").await.unwrap().unwrap();
        assert_eq!(head.content_type.as_deref(), Some("text/tab-separated-values"));
    }

    #[tokio::test]
    async fn test_relative_path_is_refused() {
        let store = MemoryObjectStore::with_buckets(["datasets"]);
        let err = upload_dataset(&store, Path::new("sales.csv"), "datasets", &UploadOptions::default())
            .await
            .unwrap_err();
        assert!(message(err).contains("absolute"));
    }

    #[tokio::test]
    async fn test_missing_file_and_directory_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryObjectStore::with_buckets(["datasets"]);
        let options = UploadOptions::default();

        let err = upload_dataset(&store, &dir.path().join("gone.csv"), "datasets", &options)
            .await
            .unwrap_err();
        assert!(message(err).contains("no file exists"));

        let err = upload_dataset(&store, dir.path(), "datasets", &options)
            .await
            .unwrap_err();
        assert!(message(err).contains("directory"));
    }

    #[tokio::test]
    async fn test_empty_file_needs_opt_in() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.csv");
        std::fs::write(&path, "").unwrap();
        let store = MemoryObjectStore::with_buckets(["datasets"]);

        let err = upload_dataset(&store, &path, "datasets", &UploadOptions::default())
            .await
            .unwrap_err();
        assert!(message(err).contains("empty"));

        let options = UploadOptions {
            allow_empty: true,
            ..Default::default()
        };
        let receipt = upload_dataset(&store, &path, "datasets", &options).await.unwrap();
        assert_eq!(receipt.size_bytes, 0);
    }

    #[tokio::test]
    async fn test_missing_bucket_is_refused_before_upload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sales.csv");
        std::fs::write(&path, "x").unwrap();
        let store = MemoryObjectStore::with_buckets(["other"]);

        let err = upload_dataset(&store, &path, "datasets", &UploadOptions::default())
            .await
            .unwrap_err();

        assert!(message(err).contains("bucket datasets"));
        assert!(store.keys("other").await.is_empty());
    }

    #[tokio::test]
    async fn test_checks_run_in_order() {
        // bad extension is reported before the empty-file check
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.json");
        std::fs::write(&path, "").unwrap();
        let store = MemoryObjectStore::default();

        let err = upload_dataset(&store, &path, "datasets", &UploadOptions::default())
            .await
            .unwrap_err();
        assert!(message(err).contains(".json"));
    }
}
