//! Runtime-environment worker that registers itself on the mesh

use kjob_core::domain::manifest::Manifest;
use kjob_core::domain::session::AppType;
use serde_json::{Map, Value as JsonValue, json};
use std::collections::BTreeMap;

use super::naming::to_label_value;
use super::spec::{ContainerSpec, EnvVar, ResourceShape, SecurityProfile, WorkloadSpec, merge_env};
use super::{LaunchContext, WorkloadVariant, set_default, short_id};
use crate::config::Config;
use crate::error::Result;

pub const ENVIRONMENT_WORKER_IMAGE: &str = "oeway/hypha-conda-worker:0.1.0";

/// Identity baked into the worker image
const WORKER_UID: i64 = 8877;

/// Conda environment worker serving the mesh from its own pod
pub struct EnvironmentWorkerJob;

impl EnvironmentWorkerJob {
    fn command(service_id: &str, verbose: bool) -> Vec<String> {
        let mut command: Vec<String> = [
            "python",
            "-m",
            "hypha.workers.conda",
            "--server-url",
            "$(HYPHA_SERVER_URL)",
            "--workspace",
            "$(HYPHA_WORKSPACE)",
            "--token",
            "$(HYPHA_TOKEN)",
            "--service-id",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        command.push(service_id.to_string());
        if verbose {
            command.push("--verbose".to_string());
        }
        command
    }

    fn base_labels() -> BTreeMap<String, String> {
        BTreeMap::from([
            ("app".to_string(), "conda-worker".to_string()),
            ("managed-by".to_string(), "hypha-k8s-worker".to_string()),
        ])
    }
}

impl WorkloadVariant for EnvironmentWorkerJob {
    fn app_type(&self) -> AppType {
        AppType::EnvironmentWorker
    }

    fn label(&self) -> &'static str {
        "Conda worker job"
    }

    fn container_name(&self) -> &'static str {
        "conda-worker"
    }

    fn parse_manifest(&self, raw: &Map<String, JsonValue>) -> Result<Manifest> {
        Ok(Manifest::from_map_lenient(raw, self.app_type()))
    }

    /// Permissive: only the timeout is defaulted, nothing is rejected
    fn compile(
        &self,
        mut raw: Map<String, JsonValue>,
        config: &Config,
    ) -> Result<Map<String, JsonValue>> {
        set_default(&mut raw, "timeout", json!(config.default_timeout));
        Ok(raw)
    }

    fn service_id(&self, manifest: &Manifest) -> Option<String> {
        Some(
            manifest
                .service_id
                .clone()
                .unwrap_or_else(|| format!("conda-worker-{}", short_id())),
        )
    }

    fn wait_for_service(&self, manifest: &Manifest) -> bool {
        manifest.wait_for_service.unwrap_or(true)
    }

    fn registration_workspace(&self, ctx: &LaunchContext<'_>) -> String {
        ctx.manifest
            .workspace
            .clone()
            .unwrap_or_else(|| ctx.request.workspace.clone())
    }

    fn security_profile(&self) -> SecurityProfile {
        SecurityProfile {
            run_as_user: WORKER_UID,
            run_as_group: Some(WORKER_UID),
            fs_group: WORKER_UID,
            pin_container_identity: true,
        }
    }

    fn default_env(&self, ctx: &LaunchContext<'_>) -> Vec<(String, String)> {
        vec![
            ("HYPHA_SERVER_URL".to_string(), ctx.server_url().to_string()),
            ("HYPHA_WORKSPACE".to_string(), self.registration_workspace(ctx)),
            (
                "HYPHA_SERVICE_ID".to_string(),
                ctx.service_id.clone().unwrap_or_default(),
            ),
            (
                "HYPHA_VISIBILITY".to_string(),
                ctx.manifest
                    .visibility
                    .clone()
                    .unwrap_or_else(|| "protected".to_string()),
            ),
        ]
    }

    fn secret_env(&self, ctx: &LaunchContext<'_>) -> Vec<EnvVar> {
        vec![EnvVar::secret(
            "HYPHA_TOKEN",
            ctx.manifest.token_secret.as_deref().unwrap_or("hypha-secrets"),
            ctx.manifest.token_key.as_deref().unwrap_or("HYPHA_AGENTS_TOKEN"),
        )]
    }

    fn build_spec(&self, ctx: &LaunchContext<'_>) -> Result<WorkloadSpec> {
        let manifest = ctx.manifest;
        let service_id = ctx.service_id.clone().unwrap_or_default();

        let mut labels = Self::base_labels();
        labels.insert("session-id".to_string(), to_label_value(ctx.session_id));
        labels.retain(|_, value| !value.is_empty());

        let mut pod_labels = Self::base_labels();
        pod_labels.insert("job-name".to_string(), ctx.job_name.clone());

        Ok(WorkloadSpec {
            job_name: ctx.job_name.clone(),
            labels,
            annotations: ctx.annotations("conda-worker"),
            pod_labels,
            container: ContainerSpec {
                name: self.container_name().to_string(),
                image: manifest
                    .image
                    .clone()
                    .unwrap_or_else(|| ENVIRONMENT_WORKER_IMAGE.to_string()),
                image_pull_policy: manifest
                    .image_pull_policy
                    .clone()
                    .unwrap_or_else(|| ctx.config.image_pull_policy.clone()),
                command: Some(Self::command(&service_id, manifest.verbose.unwrap_or(true))),
                env: merge_env(self.default_env(ctx), &manifest.env, self.secret_env(ctx)),
                resources: Some(ResourceShape::new(("1Gi", "500m"), ("4Gi", "2000m"))),
                volume_mounts: Vec::new(),
            },
            restart_policy: "Never".to_string(),
            service_account: None,
            security: self.security_profile(),
            volumes: Vec::new(),
            backoff_limit: 3,
            ttl_seconds_after_finished: Some(3600),
        })
    }
}
