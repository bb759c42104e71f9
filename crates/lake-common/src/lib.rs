//! Lake Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the lake ingestion workspace.
//!
//! # Overview
//!
//! - **Error Handling**: the [`LakeError`] taxonomy and [`Result`] alias
//! - **Logging**: `tracing` subscriber setup shared by every binary
//! - **Checksums**: S3-style content fingerprints for local files and buffers
//! - **Types**: object, stream and resource-status types exchanged with the
//!   managed services
//!
//! # Example
//!
//! ```no_run
//! use lake_common::{checksum, Result};
//!
//! fn fingerprint(path: &str) -> Result<()> {
//!     let etag = checksum::file_etag(path)?;
//!     tracing::info!(%etag, "computed local etag");
//!     Ok(())
//! }
//! ```

pub mod checksum;
pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{LakeError, Result};
