//! Lake Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Ingestion orchestration for a multi-zone data lake on AWS.
//!
//! # Overview
//!
//! - **Naming**: validate `label_source_location_YYYYMMDD_HHMMSS.ext` file names
//! - **Watching**: snapshot a directory at a fixed interval and detect new files
//! - **Ingesting**: upload new files into the raw zone
//! - **Deduplication**: remove arrivals whose content already exists under another key
//! - **Pipeline**: start the schema crawler, wait until it is ready, start the transform job
//! - **Streaming**: push records into a stream, resending entries a batch call rejected
//!
//! Every external service sits behind a trait in [`services`], with AWS and
//! in-memory implementations.
//!
//! # Example
//!
//! ```no_run
//! use lake_ingest::config::IngestConfig;
//! use lake_ingest::engine::{Engine, Services};
//! use lake_ingest::services::aws::AwsServices;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = IngestConfig::load(None)?;
//!     let services: Services = AwsServices::connect(&config.aws).await.into();
//!     let cancel = CancellationToken::new();
//!
//!     let engine = Engine::new(config, services, cancel.clone());
//!     engine.watcher().run(cancel).await;
//!     Ok(())
//! }
//! ```

pub mod arrival;
pub mod cli;
pub mod config;
pub mod dedup;
pub mod engine;
pub mod ingester;
pub mod naming;
pub mod pipeline;
pub mod services;
pub mod snapshot;
pub mod stream;
pub mod upload;
pub mod wait;
pub mod watcher;

// Re-export commonly used types
pub use cli::{Cli, Commands};
pub use config::IngestConfig;
pub use engine::{Engine, Services};
