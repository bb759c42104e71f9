use async_trait::async_trait;
use aws_sdk_s3::{primitives::ByteStream, Client};
use chrono::{DateTime, Utc};
use lake_common::types::{ObjectMetadata, StoredObject};
use lake_common::Result;
use tracing::{debug, info, instrument};

use super::service_error;
use crate::services::ObjectStore;

/// [`ObjectStore`] backed by S3
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
}

impl S3ObjectStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn to_utc(time: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(time.secs(), time.subsec_nanos())
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[instrument(skip(self))]
    async fn list(&self, bucket: &str, prefix: &str) -> Result<Vec<StoredObject>> {
        let mut objects = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| service_error("s3:list_objects_v2", e))?;

            for object in response.contents() {
                let Some(key) = object.key() else {
                    continue;
                };
                objects.push(StoredObject {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    etag: object.e_tag().unwrap_or_default().to_string(),
                    size_bytes: object.size().unwrap_or_default(),
                    last_modified: object.last_modified().and_then(to_utc),
                });
            }

            match response.next_continuation_token() {
                Some(token) if response.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        debug!("Listed {} objects in s3://{}/{}", objects.len(), bucket, prefix);
        Ok(objects)
    }

    #[instrument(skip(self))]
    async fn head(&self, bucket: &str, key: &str) -> Result<Option<ObjectMetadata>> {
        match self.client.head_object().bucket(bucket).key(key).send().await {
            Ok(response) => Ok(Some(ObjectMetadata {
                key: key.to_string(),
                etag: response.e_tag().unwrap_or_default().to_string(),
                size_bytes: response.content_length().unwrap_or_default(),
                content_type: response.content_type().map(str::to_string),
                last_modified: response.last_modified().and_then(to_utc),
            })),
            Err(err) => {
                if err.as_service_error().is_some_and(|e| e.is_not_found()) {
                    debug!("s3://{}/{} does not exist", bucket, key);
                    Ok(None)
                } else {
                    Err(service_error("s3:head_object", err))
                }
            }
        }
    }

    #[instrument(skip(self))]
    async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        debug!("Deleting s3://{}/{}", bucket, key);

        // DeleteObject succeeds for keys that are already gone
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| service_error("s3:delete_object", e))?;

        info!("Deleted s3://{}/{}", bucket, key);
        Ok(())
    }

    #[instrument(skip(self, data))]
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<()> {
        let size = data.len();
        debug!("Uploading {} bytes to s3://{}/{}", size, bucket, key);

        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(data))
            .set_content_type(content_type.map(str::to_string))
            .send()
            .await
            .map_err(|e| service_error("s3:put_object", e))?;

        info!("Uploaded {} bytes to s3://{}/{}", size, bucket, key);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(true),
            Err(err) => {
                if err.as_service_error().is_some_and(|e| e.is_not_found()) {
                    Ok(false)
                } else {
                    Err(service_error("s3:head_bucket", err))
                }
            }
        }
    }
}
