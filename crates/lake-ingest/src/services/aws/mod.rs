//! AWS implementations of the service traits
//!
//! All clients are built from one shared SDK configuration so region,
//! endpoint and credentials stay consistent across S3, Glue, Kinesis and
//! Firehose.

use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_credential_types::Credentials;
use aws_sdk_s3::error::DisplayErrorContext;
use lake_common::LakeError;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::AwsConfig;

mod firehose;
mod glue;
mod kinesis;
mod s3;

pub use firehose::FirehoseBuffer;
pub use glue::GlueCatalog;
pub use kinesis::KinesisStream;
pub use s3::S3ObjectStore;

/// Every AWS adapter, sharing one SDK configuration
#[derive(Clone)]
pub struct AwsServices {
    pub objects: Arc<S3ObjectStore>,
    pub catalog: Arc<GlueCatalog>,
    pub stream: Arc<KinesisStream>,
    pub delivery: Arc<FirehoseBuffer>,
}

impl AwsServices {
    pub async fn connect(config: &AwsConfig) -> Self {
        let sdk = load_sdk_config(config).await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk)
            .force_path_style(config.path_style)
            .build();

        info!(
            region = %config.region,
            endpoint = config.endpoint.as_deref().unwrap_or("default"),
            "AWS clients initialized"
        );

        Self {
            objects: Arc::new(S3ObjectStore::new(aws_sdk_s3::Client::from_conf(s3_config))),
            catalog: Arc::new(GlueCatalog::new(aws_sdk_glue::Client::new(&sdk))),
            stream: Arc::new(KinesisStream::new(aws_sdk_kinesis::Client::new(&sdk))),
            delivery: Arc::new(FirehoseBuffer::new(aws_sdk_firehose::Client::new(&sdk))),
        }
    }
}

/// Shared SDK configuration: region, optional custom endpoint, optional static keys
pub async fn load_sdk_config(config: &AwsConfig) -> SdkConfig {
    debug!(region = %config.region, "Loading AWS configuration");

    let mut loader =
        aws_config::defaults(BehaviorVersion::latest()).region(Region::new(config.region.clone()));

    if let Some(endpoint) = &config.endpoint {
        loader = loader.endpoint_url(endpoint);
    }

    if let (Some(access_key), Some(secret_key)) = (&config.access_key, &config.secret_key) {
        let credentials = Credentials::new(access_key, secret_key, None, None, "lake-ingest");
        loader = loader.credentials_provider(credentials);
    }

    loader.load().await
}

/// Turn an SDK error into a [`LakeError::Service`] keeping the full error chain
pub(crate) fn service_error<E>(operation: &str, err: E) -> LakeError
where
    E: std::error::Error,
{
    LakeError::service(operation, DisplayErrorContext(err))
}
