//! Long-running agent that registers itself on the mesh

use kjob_core::domain::manifest::Manifest;
use kjob_core::domain::session::AppType;
use serde_json::{Map, Value as JsonValue, json};
use std::collections::BTreeMap;

use super::naming::to_label_value;
use super::spec::{
    ContainerSpec, EnvVar, ResourceShape, SecurityProfile, VolumeMount, WorkloadSpec, merge_env,
};
use super::{LaunchContext, WorkloadVariant, set_default, short_id};
use crate::config::Config;
use crate::error::Result;

pub const AGENT_IMAGE: &str = "oeway/deno-claude-code:0.1.2";

/// Mesh address reachable from inside the cluster
pub const IN_CLUSTER_SERVER_URL: &str = "http://hypha-server.hypha.svc.cluster.local:9520";

const IN_CLUSTER_HOST: &str = "hypha-server.hypha.svc.cluster.local";
const WORKSPACE_VOLUME: &str = "agent-workspaces";
const WORKSPACE_DIR: &str = "/app/agent-workspaces";

/// Coding agent pod with an API key and a workspace-scoped mesh token
pub struct AgentJob;

impl AgentJob {
    /// Agents talk to the mesh over the in-cluster address unless told otherwise
    fn agent_server_url(ctx: &LaunchContext<'_>) -> String {
        if let Some(url) = &ctx.manifest.server_url {
            return url.clone();
        }
        if ctx.config.server_url.contains(IN_CLUSTER_HOST) {
            ctx.config.server_url.clone()
        } else {
            IN_CLUSTER_SERVER_URL.to_string()
        }
    }

    fn app_label() -> (String, String) {
        ("app".to_string(), "claude-agent-worker".to_string())
    }
}

impl WorkloadVariant for AgentJob {
    fn app_type(&self) -> AppType {
        AppType::Agent
    }

    fn label(&self) -> &'static str {
        "Claude agent job"
    }

    fn container_name(&self) -> &'static str {
        "claude-agent"
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
                .unwrap_or_else(|| format!("claude-agent-{}", short_id())),
        )
    }

    fn wait_for_service(&self, manifest: &Manifest) -> bool {
        manifest.wait_for_service.unwrap_or(true)
    }

    fn security_profile(&self) -> SecurityProfile {
        SecurityProfile {
            run_as_user: 1000,
            run_as_group: Some(1000),
            fs_group: 1000,
            pin_container_identity: false,
        }
    }

    fn default_env(&self, ctx: &LaunchContext<'_>) -> Vec<(String, String)> {
        vec![
            ("HYPHA_SERVER_URL".to_string(), Self::agent_server_url(ctx)),
            ("HYPHA_WORKSPACE".to_string(), ctx.request.workspace.clone()),
            ("HYPHA_CLIENT_ID".to_string(), ctx.request.client_id.clone()),
            ("AGENT_BASE_DIRECTORY".to_string(), WORKSPACE_DIR.to_string()),
            ("AGENT_MAX_COUNT".to_string(), "10".to_string()),
            (
                "SERVICE_ID".to_string(),
                ctx.service_id.clone().unwrap_or_default(),
            ),
            ("SERVICE_VISIBILITY".to_string(), "public".to_string()),
        ]
    }

    fn secret_env(&self, ctx: &LaunchContext<'_>) -> Vec<EnvVar> {
        let secret_name = ctx
            .manifest
            .secret_name
            .as_deref()
            .unwrap_or("deno-claude-code-config");
        vec![
            EnvVar::secret("ANTHROPIC_API_KEY", secret_name, "ANTHROPIC_API_KEY"),
            // workspace-scoped token, so the agent registers in the right workspace
            EnvVar::secret(
                "HYPHA_TOKEN",
                "claude-agent-workspace-token",
                "HYPHA_WORKSPACE_TOKEN",
            ),
        ]
    }

    fn build_spec(&self, ctx: &LaunchContext<'_>) -> Result<WorkloadSpec> {
        let manifest = ctx.manifest;
        let (app_key, app_value) = Self::app_label();

        let mut labels = BTreeMap::from([(app_key.clone(), app_value.clone())]);
        let app_id = to_label_value(&ctx.request.app_id);
        if !app_id.is_empty() {
            labels.insert("hypha-app-id".to_string(), app_id);
        }

        Ok(WorkloadSpec {
            job_name: ctx.job_name.clone(),
            labels,
            annotations: ctx.annotations("claude-agent"),
            pod_labels: BTreeMap::from([(app_key, app_value)]),
            container: ContainerSpec {
                name: self.container_name().to_string(),
                image: manifest
                    .image
                    .clone()
                    .unwrap_or_else(|| AGENT_IMAGE.to_string()),
                image_pull_policy: manifest
                    .image_pull_policy
                    .clone()
                    .unwrap_or_else(|| "Always".to_string()),
                command: None,
                env: merge_env(self.default_env(ctx), &manifest.env, self.secret_env(ctx)),
                resources: Some(ResourceShape::new(("512Mi", "500m"), ("2Gi", "2000m"))),
                volume_mounts: vec![VolumeMount {
                    name: WORKSPACE_VOLUME.to_string(),
                    mount_path: WORKSPACE_DIR.to_string(),
                }],
            },
            restart_policy: "OnFailure".to_string(),
            service_account: Some("default".to_string()),
            security: self.security_profile(),
            volumes: vec![WORKSPACE_VOLUME.to_string()],
            backoff_limit: 3,
            ttl_seconds_after_finished: Some(3600),
        })
    }
}
