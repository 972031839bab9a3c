//! Result of a command executed inside a session's container

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Ok,
    Error,
}

/// One captured output stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutput {
    /// Always `"stream"`
    #[serde(rename = "type")]
    pub output_type: String,
    /// `"stdout"` or `"stderr"`
    pub name: String,
    pub text: String,
}

impl ExecutionOutput {
    pub fn stream(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            output_type: "stream".to_string(),
            name: name.into(),
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionError {
    /// Error class, e.g. `CommandError`, `TimeoutError`, `KubernetesApiError`
    pub kind: String,
    pub message: String,
    pub trace: Vec<String>,
}

/// Structured outcome of `execute`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    pub outputs: Vec<ExecutionOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ExecutionError>,
}

impl ExecutionResult {
    /// A failed result carrying no output
    pub fn failure(
        kind: impl Into<String>,
        message: impl Into<String>,
        trace: Vec<String>,
    ) -> Self {
        Self {
            status: ExecutionStatus::Error,
            outputs: Vec::new(),
            error: Some(ExecutionError {
                kind: kind.into(),
                message: message.into(),
                trace,
            }),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ExecutionStatus::Ok
    }
}
