//! Worker error taxonomy
//!
//! Every fallible worker operation returns [`WorkerError`]. Cluster API
//! failures arrive as [`GatewayError`] and are folded into `Operation` unless
//! the caller tolerates them (404s while polling or deleting).

use thiserror::Error;

use crate::cluster::GatewayError;

/// Result type alias for worker operations
pub type Result<T> = std::result::Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    /// Malformed manifest or request; never retried
    #[error("Validation error: {0}")]
    Validation(String),

    /// Workload creation, deletion or exec failed
    #[error("{0}")]
    Operation(String),

    #[error("Session {0} not found")]
    SessionNotFound(String),

    #[error("Session {0} already exists")]
    SessionExists(String),

    /// Pod readiness or command deadline exceeded
    #[error("{0}")]
    Timeout(String),

    /// Cluster connectivity or configuration unusable at initialization
    #[error("Worker not available: {0}")]
    NotAvailable(String),
}

impl WorkerError {
    /// Stable name of the error class, used in structured execution results
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "ValidationError",
            Self::Operation(_) => "WorkerError",
            Self::SessionNotFound(_) => "SessionNotFoundError",
            Self::SessionExists(_) => "SessionExistsError",
            Self::Timeout(_) => "TimeoutError",
            Self::NotAvailable(_) => "WorkerNotAvailableError",
        }
    }
}

impl From<kjob_core::domain::manifest::ManifestError> for WorkerError {
    fn from(err: kjob_core::domain::manifest::ManifestError) -> Self {
        Self::Validation(err.0)
    }
}

impl From<GatewayError> for WorkerError {
    fn from(err: GatewayError) -> Self {
        Self::Operation(format!("Kubernetes API error: {}", err))
    }
}
