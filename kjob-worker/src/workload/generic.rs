//! Generic batch container

use kjob_core::domain::manifest::Manifest;
use kjob_core::domain::session::AppType;
use serde_json::{Map, Value as JsonValue, json};
use std::collections::BTreeMap;
use tracing::info;

use super::spec::{ContainerSpec, SecurityProfile, WorkloadSpec, merge_env};
use super::{LaunchContext, WorkloadVariant, set_default};
use crate::config::Config;
use crate::error::{Result, WorkerError};

/// A user-supplied image run to completion
pub struct GenericJob;

impl GenericJob {
    /// Extracts and checks the image reference, which must carry a tag
    fn require_image(manifest: &Manifest) -> Result<&str> {
        match manifest.image.as_deref() {
            None => Err(WorkerError::Validation("Image is required".to_string())),
            Some(image) if image.is_empty() || !image.contains(':') => Err(
                WorkerError::Validation(format!("Invalid image format: {}", image)),
            ),
            Some(image) => Ok(image),
        }
    }

    fn labels() -> BTreeMap<String, String> {
        BTreeMap::from([
            ("app".to_string(), "hypha".to_string()),
            ("component".to_string(), "worker-job".to_string()),
        ])
    }
}

impl WorkloadVariant for GenericJob {
    fn app_type(&self) -> AppType {
        AppType::Job
    }

    fn label(&self) -> &'static str {
        "Kubernetes job"
    }

    fn container_name(&self) -> &'static str {
        "main"
    }

    fn compile(
        &self,
        mut raw: Map<String, JsonValue>,
        config: &Config,
    ) -> Result<Map<String, JsonValue>> {
        let manifest = Manifest::from_map(&raw)?;
        let image = Self::require_image(&manifest)?;
        info!("Compiled Kubernetes job manifest for image: {}", image);

        set_default(&mut raw, "image_pull_policy", json!(config.image_pull_policy));
        set_default(&mut raw, "restart_policy", json!("Never"));
        set_default(&mut raw, "timeout", json!(config.default_timeout));
        Ok(raw)
    }

    fn service_id(&self, manifest: &Manifest) -> Option<String> {
        manifest.service_id.clone()
    }

    fn wait_for_service(&self, manifest: &Manifest) -> bool {
        manifest.wait_for_service.unwrap_or(false)
    }

    fn security_profile(&self) -> SecurityProfile {
        SecurityProfile {
            run_as_user: 1000,
            run_as_group: None,
            fs_group: 1000,
            pin_container_identity: false,
        }
    }

    fn default_env(&self, ctx: &LaunchContext<'_>) -> Vec<(String, String)> {
        let mut env = vec![
            ("HYPHA_SERVER_URL".to_string(), ctx.server_url().to_string()),
            ("HYPHA_WORKSPACE".to_string(), ctx.request.workspace.clone()),
            ("HYPHA_CLIENT_ID".to_string(), ctx.request.client_id.clone()),
        ];
        if let Some(token) = &ctx.request.token {
            env.push(("HYPHA_TOKEN".to_string(), token.clone()));
        }
        env.push(("HYPHA_APP_ID".to_string(), ctx.request.app_id.clone()));
        env
    }

    fn build_spec(&self, ctx: &LaunchContext<'_>) -> Result<WorkloadSpec> {
        let manifest = ctx.manifest;
        let image = Self::require_image(manifest)?;

        Ok(WorkloadSpec {
            job_name: ctx.job_name.clone(),
            labels: Self::labels(),
            annotations: ctx.annotations("k8s"),
            pod_labels: Self::labels(),
            container: ContainerSpec {
                name: self.container_name().to_string(),
                image: image.to_string(),
                image_pull_policy: manifest
                    .image_pull_policy
                    .clone()
                    .unwrap_or_else(|| ctx.config.image_pull_policy.clone()),
                command: manifest.command.clone().filter(|c| !c.is_empty()),
                env: merge_env(self.default_env(ctx), &manifest.env, self.secret_env(ctx)),
                resources: None,
                volume_mounts: Vec::new(),
            },
            restart_policy: manifest
                .restart_policy
                .clone()
                .unwrap_or_else(|| "Never".to_string()),
            service_account: Some("default".to_string()),
            security: self.security_profile(),
            volumes: Vec::new(),
            backoff_limit: 3,
            ttl_seconds_after_finished: None,
        })
    }

    fn creating_message(&self, ctx: &LaunchContext<'_>) -> String {
        format!(
            "Creating Kubernetes job with image: {}",
            ctx.manifest.image.as_deref().unwrap_or_default()
        )
    }
}
