//! Application manifest
//!
//! A manifest arrives as a loosely typed JSON mapping discriminated by its
//! `type` key. [`Manifest::from_map`] checks the shape of every known key and
//! produces a typed view; unknown keys are ignored. [`Manifest::from_map_lenient`]
//! never fails: badly typed keys are coerced when possible and dropped otherwise.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;

use crate::domain::session::AppType;

/// Error raised when a manifest key has the wrong shape
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ManifestError(pub String);

/// Typed view over a manifest mapping
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub app_type: AppType,
    pub image: Option<String>,
    pub command: Option<Vec<String>>,
    pub env: BTreeMap<String, String>,
    pub image_pull_policy: Option<String>,
    pub restart_policy: Option<String>,
    /// Workload timeout in seconds
    pub timeout: Option<u64>,
    pub wait_for_service: Option<bool>,
    pub service_id: Option<String>,
    pub secret_name: Option<String>,
    pub token_secret: Option<String>,
    pub token_key: Option<String>,
    pub server_url: Option<String>,
    pub workspace: Option<String>,
    pub visibility: Option<String>,
    pub verbose: Option<bool>,
}

impl Manifest {
    /// Parses the manifest's `type` key; an absent key means a generic job
    pub fn app_type_of(map: &Map<String, JsonValue>) -> Result<AppType, ManifestError> {
        match map.get("type") {
            None | Some(JsonValue::Null) => Ok(AppType::default()),
            Some(JsonValue::String(s)) => AppType::parse(s)
                .ok_or_else(|| ManifestError(format!("Unsupported application type: {}", s))),
            Some(other) => Err(ManifestError(format!(
                "Application type must be a string, got {}",
                other
            ))),
        }
    }

    /// Builds a typed manifest from its JSON mapping
    pub fn from_map(map: &Map<String, JsonValue>) -> Result<Self, ManifestError> {
        let command = match map.get("command") {
            None | Some(JsonValue::Null) => None,
            Some(JsonValue::Array(items)) => Some(
                items
                    .iter()
                    .map(|item| scalar_to_string(item).ok_or_else(|| {
                        ManifestError(format!("Command entries must be scalars, got {}", item))
                    }))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            Some(_) => return Err(ManifestError("Command must be a list".to_string())),
        };

        let env = match map.get("env") {
            None | Some(JsonValue::Null) => BTreeMap::new(),
            Some(JsonValue::Object(vars)) => vars
                .iter()
                .map(|(key, value)| (key.clone(), env_value_to_string(value)))
                .collect(),
            Some(_) => {
                return Err(ManifestError(
                    "Environment variables must be a dictionary".to_string(),
                ));
            }
        };

        Ok(Self {
            app_type: Self::app_type_of(map)?,
            image: opt_string(map, "image")?,
            command,
            env,
            image_pull_policy: opt_string(map, "image_pull_policy")?,
            restart_policy: opt_string(map, "restart_policy")?,
            timeout: opt_u64(map, "timeout")?,
            wait_for_service: opt_bool(map, "wait_for_service")?,
            service_id: opt_string(map, "service_id")?,
            secret_name: opt_string(map, "secret_name")?,
            token_secret: opt_string(map, "token_secret")?,
            token_key: opt_string(map, "token_key")?,
            server_url: opt_string(map, "server_url")?,
            workspace: opt_string(map, "workspace")?,
            visibility: opt_string(map, "visibility")?,
            verbose: opt_bool(map, "verbose")?,
        })
    }

    /// Builds a typed manifest, coercing or dropping badly typed keys
    ///
    /// Scalars are stringified, numeric strings become numbers and the usual
    /// boolean spellings ("yes", "off", "1") become booleans. A `command` or
    /// `env` of the wrong shape is ignored.
    pub fn from_map_lenient(map: &Map<String, JsonValue>, app_type: AppType) -> Self {
        let command = match map.get("command") {
            Some(JsonValue::Array(items)) => items.iter().map(scalar_to_string).collect(),
            _ => None,
        };

        let env = match map.get("env") {
            Some(JsonValue::Object(vars)) => vars
                .iter()
                .map(|(key, value)| (key.clone(), env_value_to_string(value)))
                .collect(),
            _ => BTreeMap::new(),
        };

        let string = |key: &str| map.get(key).and_then(scalar_to_string);
        let flag = |key: &str| map.get(key).and_then(coerce_bool);

        Self {
            app_type,
            image: string("image"),
            command,
            env,
            image_pull_policy: string("image_pull_policy"),
            restart_policy: string("restart_policy"),
            timeout: map.get("timeout").and_then(coerce_u64),
            wait_for_service: flag("wait_for_service"),
            service_id: string("service_id"),
            secret_name: string("secret_name"),
            token_secret: string("token_secret"),
            token_key: string("token_key"),
            server_url: string("server_url"),
            workspace: string("workspace"),
            visibility: string("visibility"),
            verbose: flag("verbose"),
        }
    }
}

fn coerce_bool(value: &JsonValue) -> Option<bool> {
    match value {
        JsonValue::Bool(b) => Some(*b),
        JsonValue::Number(n) => n.as_f64().map(|n| n != 0.0),
        JsonValue::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Some(true),
            "false" | "no" | "off" | "0" | "" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn coerce_u64(value: &JsonValue) -> Option<u64> {
    match value {
        JsonValue::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn opt_string(map: &Map<String, JsonValue>, key: &str) -> Result<Option<String>, ManifestError> {
    match map.get(key) {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(ManifestError(format!(
            "Field '{}' must be a string, got {}",
            key, other
        ))),
    }
}

fn opt_bool(map: &Map<String, JsonValue>, key: &str) -> Result<Option<bool>, ManifestError> {
    match map.get(key) {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::Bool(b)) => Ok(Some(*b)),
        Some(other) => Err(ManifestError(format!(
            "Field '{}' must be a boolean, got {}",
            key, other
        ))),
    }
}

fn opt_u64(map: &Map<String, JsonValue>, key: &str) -> Result<Option<u64>, ManifestError> {
    match map.get(key) {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::Number(n)) => n.as_u64().map(Some).ok_or_else(|| {
            ManifestError(format!(
                "Field '{}' must be a non-negative integer, got {}",
                key, n
            ))
        }),
        Some(other) => Err(ManifestError(format!(
            "Field '{}' must be a non-negative integer, got {}",
            key, other
        ))),
    }
}

fn scalar_to_string(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Environment values are stringified; structured values become JSON text
fn env_value_to_string(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => String::new(),
        JsonValue::Array(_) | JsonValue::Object(_) => value.to_string(),
        scalar => scalar_to_string(scalar).unwrap_or_default(),
    }
}
