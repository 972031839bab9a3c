//! Cluster gateway
//!
//! A thin async facade over the orchestration API. The rest of the worker only
//! sees [`ClusterGateway`], so the session lifecycle can be driven against the
//! scripted fake in tests and against [`KubeGateway`] in production.

mod kubernetes;

#[cfg(test)]
pub mod fake;

pub use kubernetes::KubeGateway;

use async_trait::async_trait;
use thiserror::Error;

use crate::workload::WorkloadSpec;

/// Errors reported by the orchestration API
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// The API answered with an error status
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// The request never got an answer (connection, TLS, decoding)
    #[error("{0}")]
    Transport(String),

    /// The exec channel failed or reported a non-exit failure
    #[error("exec failed: {0}")]
    Exec(String),

    /// The workload document could not be turned into an API object
    #[error("invalid workload: {0}")]
    InvalidWorkload(String),
}

impl GatewayError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Check if this error is a "not found" answer
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Api { status: 404, .. })
    }
}

/// Phase of a pod as reported by the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl PodPhase {
    pub fn parse(phase: Option<&str>) -> Self {
        match phase {
            Some("Pending") => Self::Pending,
            Some("Running") => Self::Running,
            Some("Succeeded") => Self::Succeeded,
            Some("Failed") => Self::Failed,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for PodPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Running => write!(f, "Running"),
            Self::Succeeded => write!(f, "Succeeded"),
            Self::Failed => write!(f, "Failed"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// The parts of a pod the worker cares about
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodSummary {
    pub name: String,
    pub phase: PodPhase,
}

impl PodSummary {
    pub fn new(name: impl Into<String>, phase: PodPhase) -> Self {
        Self {
            name: name.into(),
            phase,
        }
    }
}

/// Captured outcome of a command run through an exec channel
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the channel closed without reporting a status
    pub exit_code: Option<i32>,
}

/// Operations the worker needs from the orchestration API
///
/// Implementations are bound to a single namespace and must be safe to share
/// between concurrently running session operations.
#[async_trait]
pub trait ClusterGateway: Send + Sync {
    /// Submits a batch workload
    async fn create_job(&self, spec: &WorkloadSpec) -> Result<(), GatewayError>;

    /// Lists pods matching a label selector (e.g., "job-name=hypha-job-abc")
    async fn list_pods(&self, label_selector: &str) -> Result<Vec<PodSummary>, GatewayError>;

    /// Deletes a workload, letting the cluster collect its pods in the background
    async fn delete_job(&self, job_name: &str) -> Result<(), GatewayError>;

    /// Reads the current log output of one container
    async fn pod_logs(&self, pod_name: &str, container: &str) -> Result<String, GatewayError>;

    /// Runs a command inside a container and waits for the channel to close
    ///
    /// Implementations must close the channel and stop the remote stream when
    /// the returned future is dropped early; callers enforce deadlines that way.
    async fn exec(
        &self,
        pod_name: &str,
        container: &str,
        command: Vec<String>,
    ) -> Result<ExecOutput, GatewayError>;
}
