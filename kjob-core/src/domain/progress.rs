//! Progress events emitted while a session starts or a command runs

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressKind {
    Info,
    Success,
    Error,
    Warning,
}

impl ProgressKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Error => "error",
            Self::Warning => "warning",
        }
    }
}

/// A progress event, delivered as `{type, message}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    #[serde(rename = "type")]
    pub kind: ProgressKind,
    pub message: String,
}

impl ProgressEvent {
    pub fn new(kind: ProgressKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(ProgressKind::Info, message)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(ProgressKind::Success, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(ProgressKind::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(ProgressKind::Error, message)
    }

    /// Journal line recorded in a session's `progress` log, e.g. `"INFO: ..."`
    pub fn journal_line(&self) -> String {
        format!("{}: {}", self.kind.as_str().to_uppercase(), self.message)
    }
}
