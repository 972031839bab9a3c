//! Workload spec builder
//!
//! Each application type is a [`WorkloadVariant`]: a set of capabilities
//! (defaults, security profile, injected environment, spec assembly) chosen
//! once per `start` by [`variant_for`]. The lifecycle manager never branches on
//! the type itself.

mod agent;
mod environment;
mod generic;
pub mod naming;
pub mod spec;

pub use agent::AgentJob;
pub use environment::EnvironmentWorkerJob;
pub use generic::GenericJob;
pub use naming::to_job_name;
pub use spec::{
    ContainerSpec, EnvSource, EnvVar, ResourceShape, SecurityProfile, VolumeMount, WorkloadSpec,
};

use chrono::{DateTime, Utc};
use kjob_core::domain::manifest::Manifest;
use kjob_core::domain::session::AppType;
use kjob_core::dto::session::StartRequest;
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;

use crate::config::Config;
use crate::error::Result;

/// Everything a variant needs to assemble one workload
pub struct LaunchContext<'a> {
    pub session_id: &'a str,
    pub request: &'a StartRequest,
    pub manifest: &'a Manifest,
    pub config: &'a Config,
    pub job_name: String,
    /// Service the workload registers under, when it self-registers
    pub service_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl<'a> LaunchContext<'a> {
    pub fn new(
        request: &'a StartRequest,
        manifest: &'a Manifest,
        config: &'a Config,
        service_id: Option<String>,
    ) -> Self {
        Self {
            session_id: &request.id,
            request,
            manifest,
            config,
            job_name: to_job_name(&request.id),
            service_id,
            created_at: Utc::now(),
        }
    }

    /// Mesh URL from the request, falling back to the worker's
    pub fn server_url(&self) -> &str {
        self.request
            .server_url
            .as_deref()
            .unwrap_or(&self.config.server_url)
    }

    /// Workload timeout in seconds
    pub fn timeout(&self) -> u64 {
        self.manifest.timeout.unwrap_or(self.config.default_timeout)
    }

    /// Annotations recording where a workload came from
    pub fn annotations(&self, worker_type: &str) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("hypha.amun.ai/app-id".to_string(), self.request.app_id.clone()),
            ("hypha.amun.ai/workspace".to_string(), self.request.workspace.clone()),
            ("hypha.amun.ai/client-id".to_string(), self.request.client_id.clone()),
            ("hypha.amun.ai/session-id".to_string(), self.session_id.to_string()),
            ("hypha.amun.ai/created-at".to_string(), self.created_at.to_rfc3339()),
            ("hypha.amun.ai/worker-type".to_string(), worker_type.to_string()),
        ])
    }
}

/// Capabilities of one workload shape
pub trait WorkloadVariant: Send + Sync {
    fn app_type(&self) -> AppType;

    /// Human-readable name used in progress messages and logs
    fn label(&self) -> &'static str;

    /// Container that runs the workload and receives exec/log calls
    fn container_name(&self) -> &'static str;

    /// Typed view of a raw manifest; strict unless the variant overrides it
    fn parse_manifest(&self, raw: &Map<String, JsonValue>) -> Result<Manifest> {
        Ok(Manifest::from_map(raw)?)
    }

    /// Validates a raw manifest and fills in defaults
    fn compile(
        &self,
        manifest: Map<String, JsonValue>,
        config: &Config,
    ) -> Result<Map<String, JsonValue>>;

    /// Service the workload will register, generated when the manifest has none
    fn service_id(&self, manifest: &Manifest) -> Option<String>;

    /// Whether startup should wait for the service to appear
    fn wait_for_service(&self, manifest: &Manifest) -> bool;

    /// Workspace the service registers in
    fn registration_workspace(&self, ctx: &LaunchContext<'_>) -> String {
        ctx.request.workspace.clone()
    }

    fn security_profile(&self) -> SecurityProfile;

    /// Worker-injected variables, before user overrides
    fn default_env(&self, ctx: &LaunchContext<'_>) -> Vec<(String, String)>;

    /// Credentials referenced from cluster secrets
    fn secret_env(&self, _ctx: &LaunchContext<'_>) -> Vec<EnvVar> {
        Vec::new()
    }

    /// Assembles the full workload document
    fn build_spec(&self, ctx: &LaunchContext<'_>) -> Result<WorkloadSpec>;

    /// Progress message announcing the submission
    fn creating_message(&self, _ctx: &LaunchContext<'_>) -> String {
        format!("Creating {}", self.label())
    }
}

static GENERIC: GenericJob = GenericJob;
static AGENT: AgentJob = AgentJob;
static ENVIRONMENT_WORKER: EnvironmentWorkerJob = EnvironmentWorkerJob;

/// Selects the variant implementing an application type
pub fn variant_for(app_type: AppType) -> &'static dyn WorkloadVariant {
    match app_type {
        AppType::Job => &GENERIC,
        AppType::Agent => &AGENT,
        AppType::EnvironmentWorker => &ENVIRONMENT_WORKER,
    }
}

/// Inserts `value` under `key` unless the manifest already carries a non-null value
fn set_default(manifest: &mut Map<String, JsonValue>, key: &str, value: JsonValue) {
    if manifest.get(key).is_none_or(JsonValue::is_null) {
        manifest.insert(key.to_string(), value);
    }
}

/// Eight random hex characters for generated service identifiers
fn short_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}
