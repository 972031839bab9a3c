//! Session DTOs

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Request to start a new session
///
/// Supplied by the RPC layer on `start`; `id` becomes the session identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartRequest {
    pub id: String,
    pub app_id: String,
    pub workspace: String,
    pub client_id: String,
    /// Mesh URL the caller is connected to; overrides the worker default
    #[serde(default)]
    pub server_url: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub entry_point: Option<String>,
    #[serde(default)]
    pub artifact_id: Option<String>,
    #[serde(default)]
    pub manifest: Map<String, JsonValue>,
}

/// Output of `compile`: the defaulted manifest and the untouched file list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompiledApp {
    pub manifest: Map<String, JsonValue>,
    pub files: Vec<JsonValue>,
}
