//! Error types for the ingestion engine

use std::time::Duration;
use thiserror::Error;

/// Result type alias for lake operations
pub type Result<T> = std::result::Result<T, LakeError>;

/// Main error type for lake operations
///
/// Validation failures are local and recoverable: callers log them and move
/// on. Every other variant describes something a managed service did (or
/// failed to do) and is returned to the immediate caller.
#[derive(Error, Debug)]
pub enum LakeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Validation rejected: {0}")]
    Validation(String),

    #[error("Service call {operation} failed: {message}")]
    Service { operation: String, message: String },

    #[error("{resource} entered terminal state {status}")]
    TerminalState { resource: String, status: String },

    #[error("Timed out after {waited:?} waiting for {resource}")]
    Timeout { resource: String, waited: Duration },

    #[error("Cancelled while {0}")]
    Cancelled(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl LakeError {
    /// Wrap a failed call to an external service
    pub fn service(operation: impl Into<String>, err: impl std::fmt::Display) -> Self {
        LakeError::Service {
            operation: operation.into(),
            message: err.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        LakeError::Validation(message.into())
    }

    /// True for failures raised by an external service rather than by local checks
    pub fn is_service_failure(&self) -> bool {
        matches!(
            self,
            LakeError::Service { .. } | LakeError::TerminalState { .. } | LakeError::Timeout { .. }
        )
    }
}
