//! Wiring of the engine components from configuration and service handles

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::arrival::ArrivalHandler;
use crate::config::IngestConfig;
use crate::dedup::DuplicateSuppressor;
use crate::ingester::FileIngester;
use crate::pipeline::{PipelineSettings, PipelineTrigger};
use crate::services::aws::AwsServices;
use crate::services::{DeliveryBuffer, ObjectStore, RecordStream, SchemaDiscovery, TransformJobs};
use crate::snapshot::DirectorySnapshotter;
use crate::stream::{StreamIngress, StreamSettings};
use crate::watcher::Watcher;

/// Service handles the engine depends on
#[derive(Clone)]
pub struct Services {
    pub objects: Arc<dyn ObjectStore>,
    pub discovery: Arc<dyn SchemaDiscovery>,
    pub jobs: Arc<dyn TransformJobs>,
    pub stream: Arc<dyn RecordStream>,
    pub delivery: Arc<dyn DeliveryBuffer>,
}

impl From<AwsServices> for Services {
    fn from(aws: AwsServices) -> Self {
        Self {
            objects: aws.objects,
            discovery: aws.catalog.clone(),
            jobs: aws.catalog,
            stream: aws.stream,
            delivery: aws.delivery,
        }
    }
}

/// Builds the components, all sharing one cancellation token
#[derive(Clone)]
pub struct Engine {
    config: IngestConfig,
    services: Services,
    cancel: CancellationToken,
}

impl Engine {
    pub fn new(config: IngestConfig, services: Services, cancel: CancellationToken) -> Self {
        Self {
            config,
            services,
            cancel,
        }
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn pipeline(&self) -> PipelineTrigger {
        PipelineTrigger::new(
            self.services.discovery.clone(),
            self.services.jobs.clone(),
            PipelineSettings::from_config(&self.config),
        )
        .with_cancellation(self.cancel.clone())
    }

    pub fn suppressor(&self) -> DuplicateSuppressor {
        DuplicateSuppressor::new(
            self.services.objects.clone(),
            self.config.lake.raw_bucket.as_str(),
            self.config.lake.key_prefix.as_str(),
        )
    }

    pub fn arrival_handler(&self) -> ArrivalHandler {
        ArrivalHandler::new(self.suppressor(), self.pipeline())
    }

    pub fn ingester(&self) -> FileIngester {
        FileIngester::new(
            self.services.objects.clone(),
            self.config.watch.dir.clone(),
            self.config.lake.raw_bucket.as_str(),
            self.config.lake.key_prefix.as_str(),
            self.arrival_handler(),
        )
    }

    /// Watch loop over the configured directory, feeding the ingester
    pub fn watcher(&self) -> Watcher {
        Watcher::new(
            Arc::new(DirectorySnapshotter::new(self.config.watch.dir.clone())),
            Arc::new(self.ingester()),
            self.config.watch_interval(),
        )
    }

    pub fn stream_ingress(&self) -> StreamIngress {
        StreamIngress::new(
            self.services.stream.clone(),
            StreamSettings::from_config(&self.config.stream),
        )
        .with_delivery(self.services.delivery.clone())
        .with_cancellation(self.cancel.clone())
    }
}
