use async_trait::async_trait;
use aws_sdk_glue::types::{CrawlerState, LastCrawlStatus};
use aws_sdk_glue::Client;
use lake_common::types::ResourceStatus;
use lake_common::{LakeError, Result};
use tracing::{debug, info, instrument};

use super::service_error;
use crate::services::{SchemaDiscovery, TransformJobs};

/// Glue crawlers for schema discovery and Glue jobs for transforms
#[derive(Clone)]
pub struct GlueCatalog {
    client: Client,
}

impl GlueCatalog {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// A crawler is usable again once it is back to `READY`, unless that last
/// crawl failed.
fn crawler_status(state: Option<&CrawlerState>, last_crawl: Option<&LastCrawlStatus>) -> ResourceStatus {
    match state {
        Some(CrawlerState::Ready) => match last_crawl {
            Some(LastCrawlStatus::Failed) => ResourceStatus::Error,
            _ => ResourceStatus::Active,
        },
        _ => ResourceStatus::Starting,
    }
}

#[async_trait]
impl SchemaDiscovery for GlueCatalog {
    #[instrument(skip(self))]
    async fn start(&self, name: &str) -> Result<()> {
        self.client
            .start_crawler()
            .name(name)
            .send()
            .await
            .map_err(|e| service_error("glue:start_crawler", e))?;

        info!(crawler = name, "Crawler start accepted");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn status(&self, name: &str) -> Result<ResourceStatus> {
        let response = self
            .client
            .get_crawler()
            .name(name)
            .send()
            .await
            .map_err(|e| service_error("glue:get_crawler", e))?;

        let crawler = response.crawler().ok_or_else(|| {
            LakeError::service("glue:get_crawler", format!("crawler {name} missing from response"))
        })?;

        let status = crawler_status(
            crawler.state(),
            crawler.last_crawl().and_then(|crawl| crawl.status()),
        );
        debug!(crawler = name, state = ?crawler.state(), %status, "Crawler status");
        Ok(status)
    }
}

#[async_trait]
impl TransformJobs for GlueCatalog {
    #[instrument(skip(self))]
    async fn start(&self, job_name: &str) -> Result<String> {
        let response = self
            .client
            .start_job_run()
            .job_name(job_name)
            .send()
            .await
            .map_err(|e| service_error("glue:start_job_run", e))?;

        let run_id = response.job_run_id().map(str::to_string).ok_or_else(|| {
            LakeError::service("glue:start_job_run", format!("no run id returned for {job_name}"))
        })?;

        info!(job = job_name, run_id = %run_id, "Transform job started");
        Ok(run_id)
    }
}
