//! Schema discovery then transform, for one arrived file
//!
//! A run moves through:
//!
//! ```text
//! discovery: NotStarted -> Running -> Ready      (or Failed)
//! transform: NotStarted -> Running               (or Failed)
//! ```
//!
//! The transform only starts once discovery is `Ready`. Service errors end
//! the run and are returned with the run's last state; nothing is retried
//! here.

use lake_common::LakeError;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::config::IngestConfig;
use crate::services::{SchemaDiscovery, TransformJobs};
use crate::wait::{wait_until_active, WaitPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    NotStarted,
    Running,
    Ready,
    Failed,
}

/// Progress of one trigger invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineRun {
    pub file_key: String,
    pub discovery: StageState,
    pub transform: StageState,
    /// Status calls made while waiting for discovery
    pub discovery_polls: u32,
    pub transform_run_id: Option<String>,
}

impl PipelineRun {
    fn new(file_key: &str) -> Self {
        Self {
            file_key: file_key.to_string(),
            discovery: StageState::NotStarted,
            transform: StageState::NotStarted,
            discovery_polls: 0,
            transform_run_id: None,
        }
    }
}

/// A run that stopped early, with the state it reached
#[derive(Debug, Error)]
#[error("pipeline for {} stopped: {source}", .run.file_key)]
pub struct PipelineFailure {
    pub run: PipelineRun,
    #[source]
    pub source: LakeError,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    pub crawler_name: String,
    pub job_name: String,
    pub discovery_wait: WaitPolicy,
}

impl PipelineSettings {
    pub fn from_config(config: &IngestConfig) -> Self {
        Self {
            crawler_name: config.discovery.crawler_name.clone(),
            job_name: config.transform.job_name.clone(),
            discovery_wait: config.discovery_wait(),
        }
    }
}

#[derive(Clone)]
pub struct PipelineTrigger {
    discovery: Arc<dyn SchemaDiscovery>,
    jobs: Arc<dyn TransformJobs>,
    settings: PipelineSettings,
    cancel: CancellationToken,
}

impl PipelineTrigger {
    pub fn new(
        discovery: Arc<dyn SchemaDiscovery>,
        jobs: Arc<dyn TransformJobs>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            discovery,
            jobs,
            settings,
            cancel: CancellationToken::new(),
        }
    }

    /// Abandon waits (and skip starting discovery) once `cancel` fires
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run discovery and transform for `file_key`.
    ///
    /// Cancellation only stops local waiting: a discovery run the service
    /// already accepted keeps going, and the returned run shows it as
    /// `Running`.
    #[instrument(skip(self), fields(crawler = %self.settings.crawler_name, job = %self.settings.job_name))]
    pub async fn trigger(&self, file_key: &str) -> Result<PipelineRun, PipelineFailure> {
        let mut run = PipelineRun::new(file_key);

        if self.cancel.is_cancelled() {
            return Err(PipelineFailure {
                run,
                source: LakeError::Cancelled("about to start discovery".to_string()),
            });
        }

        if let Err(source) = self.discovery.start(&self.settings.crawler_name).await {
            run.discovery = StageState::Failed;
            warn!(file_key, error = %source, "Discovery did not start");
            return Err(PipelineFailure { run, source });
        }
        run.discovery = StageState::Running;

        let resource = format!("crawler {}", self.settings.crawler_name);
        let waited = wait_until_active(&resource, self.settings.discovery_wait, &self.cancel, || {
            self.discovery.status(&self.settings.crawler_name)
        })
        .await;

        match waited {
            Ok(activated) => {
                run.discovery = StageState::Ready;
                run.discovery_polls = activated.polls;
            }
            Err(source) => {
                if !matches!(source, LakeError::Cancelled(_)) {
                    run.discovery = StageState::Failed;
                }
                warn!(file_key, error = %source, "Discovery did not become ready");
                return Err(PipelineFailure { run, source });
            }
        }

        match self.jobs.start(&self.settings.job_name).await {
            Ok(run_id) => {
                run.transform = StageState::Running;
                run.transform_run_id = Some(run_id);
            }
            Err(source) => {
                run.transform = StageState::Failed;
                warn!(file_key, error = %source, "Transform job did not start");
                return Err(PipelineFailure { run, source });
            }
        }

        info!(
            file_key,
            polls = run.discovery_polls,
            run_id = run.transform_run_id.as_deref().unwrap_or_default(),
            "Pipeline started"
        );
        Ok(run)
    }
}
