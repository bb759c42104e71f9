use async_trait::async_trait;
use aws_sdk_firehose::types::DeliveryStreamStatus;
use aws_sdk_firehose::Client;
use lake_common::types::ResourceStatus;
use lake_common::{LakeError, Result};
use tracing::instrument;

use super::service_error;
use crate::services::DeliveryBuffer;

/// [`DeliveryBuffer`] backed by a Firehose delivery stream
#[derive(Clone)]
pub struct FirehoseBuffer {
    client: Client,
}

impl FirehoseBuffer {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn delivery_status(status: &DeliveryStreamStatus) -> ResourceStatus {
    match status {
        DeliveryStreamStatus::Active => ResourceStatus::Active,
        DeliveryStreamStatus::Deleting => ResourceStatus::Deleting,
        DeliveryStreamStatus::CreatingFailed | DeliveryStreamStatus::DeletingFailed => {
            ResourceStatus::Error
        }
        other if other.as_str() == "SUSPENDED" => ResourceStatus::Error,
        _ => ResourceStatus::Starting,
    }
}

#[async_trait]
impl DeliveryBuffer for FirehoseBuffer {
    #[instrument(skip(self))]
    async fn status(&self, name: &str) -> Result<ResourceStatus> {
        let response = self
            .client
            .describe_delivery_stream()
            .delivery_stream_name(name)
            .send()
            .await
            .map_err(|e| service_error("firehose:describe_delivery_stream", e))?;

        let description = response.delivery_stream_description().ok_or_else(|| {
            LakeError::service(
                "firehose:describe_delivery_stream",
                format!("delivery stream {name} missing from response"),
            )
        })?;

        Ok(delivery_status(description.delivery_stream_status()))
    }
}
