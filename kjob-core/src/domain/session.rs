//! Session domain types

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// A worker session
///
/// The worker's logical handle over one workload's lifecycle. Owned by the
/// worker's session registry and handed out as a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub app_id: String,
    pub workspace: String,
    pub client_id: String,
    pub app_type: AppType,
    pub status: SessionStatus,
    pub entry_point: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// The manifest the session was started from
    pub metadata: Map<String, JsonValue>,
    pub error: Option<String>,
}

/// Session lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Starting,
    Running,
    Stopping,
    Stopped,
    Failed,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Starting => write!(f, "starting"),
            Self::Running => write!(f, "running"),
            Self::Stopping => write!(f, "stopping"),
            Self::Stopped => write!(f, "stopped"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Workload shape requested by a manifest's `type` key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AppType {
    /// Generic batch container
    #[default]
    #[serde(rename = "k8s-job", alias = "generic-job")]
    Job,
    /// Long-running agent that registers itself with the service mesh
    #[serde(rename = "claude-agent", alias = "agent-job")]
    Agent,
    /// Runtime-environment worker that registers itself with the service mesh
    #[serde(rename = "conda-worker", alias = "environment-worker-job")]
    EnvironmentWorker,
}

impl AppType {
    /// All supported types, in their wire spelling
    pub const ALL: [AppType; 3] = [AppType::Job, AppType::Agent, AppType::EnvironmentWorker];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Job => "k8s-job",
            Self::Agent => "claude-agent",
            Self::EnvironmentWorker => "conda-worker",
        }
    }

    /// Parses a wire name, accepting the descriptive aliases too
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "k8s-job" | "generic-job" => Some(Self::Job),
            "claude-agent" | "agent-job" => Some(Self::Agent),
            "conda-worker" | "environment-worker-job" => Some(Self::EnvironmentWorker),
            _ => None,
        }
    }
}

impl std::fmt::Display for AppType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
