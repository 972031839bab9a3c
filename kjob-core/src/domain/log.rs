//! Log domain types

use serde::{Deserialize, Serialize};

/// Category of a session log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Stdout,
    Stderr,
    Info,
    Error,
    Progress,
}

impl LogKind {
    /// Categories in the order they are flattened into a log page
    pub const ALL: [LogKind; 5] = [
        LogKind::Stdout,
        LogKind::Stderr,
        LogKind::Info,
        LogKind::Error,
        LogKind::Progress,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
            Self::Info => "info",
            Self::Error => "error",
            Self::Progress => "progress",
        }
    }
}

impl std::fmt::Display for LogKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single flattened log entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogItem {
    #[serde(rename = "type")]
    pub kind: LogKind,
    pub content: String,
}
