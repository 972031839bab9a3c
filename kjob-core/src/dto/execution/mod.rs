//! Execution DTOs

use serde::{Deserialize, Serialize};

/// Options for `execute`; every field falls back to a worker default
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecuteConfig {
    /// Wall-clock limit in seconds
    #[serde(default)]
    pub timeout: Option<u64>,
    /// Target container; defaults to the session's primary container
    #[serde(default)]
    pub container: Option<String>,
    /// Shell used for multi-statement scripts
    #[serde(default)]
    pub shell: Option<String>,
}
