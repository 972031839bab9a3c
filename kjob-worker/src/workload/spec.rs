//! Declarative workload document
//!
//! Variants assemble a [`WorkloadSpec`], a plain structure describing the
//! container, its security context, resources, volumes and metadata. The
//! document is checked by [`WorkloadSpec::validate`] and then rendered into a
//! batch `Job` object for submission.

use k8s_openapi::api::batch::v1::Job;
use serde_json::{Value as JsonValue, json};
use std::collections::{BTreeMap, HashSet};

use crate::config::PULL_POLICIES;
use crate::error::{Result, WorkerError};

/// Restart policies a batch pod template may use
pub const RESTART_POLICIES: [&str; 2] = ["Never", "OnFailure"];

/// Complete description of one batch workload
#[derive(Debug, Clone, PartialEq)]
pub struct WorkloadSpec {
    pub job_name: String,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub pod_labels: BTreeMap<String, String>,
    pub container: ContainerSpec,
    pub restart_policy: String,
    pub service_account: Option<String>,
    pub security: SecurityProfile,
    /// Names of scratch (`emptyDir`) volumes
    pub volumes: Vec<String>,
    pub backoff_limit: i32,
    pub ttl_seconds_after_finished: Option<i32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub image_pull_policy: String,
    pub command: Option<Vec<String>>,
    pub env: Vec<EnvVar>,
    pub resources: Option<ResourceShape>,
    pub volume_mounts: Vec<VolumeMount>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvVar {
    pub name: String,
    pub source: EnvSource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvSource {
    Literal(String),
    /// Resolved by the cluster from a secret; the value never passes through the worker
    Secret { secret: String, key: String },
}

impl EnvVar {
    pub fn literal(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: EnvSource::Literal(value.into()),
        }
    }

    pub fn secret(
        name: impl Into<String>,
        secret: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            source: EnvSource::Secret {
                secret: secret.into(),
                key: key.into(),
            },
        }
    }

    /// Literal value, if any
    pub fn value(&self) -> Option<&str> {
        match &self.source {
            EnvSource::Literal(value) => Some(value),
            EnvSource::Secret { .. } => None,
        }
    }
}

/// Merges worker-injected variables with the manifest's `env`
///
/// User values replace injected ones of the same name in place; new user
/// variables follow in name order. Secret references come last and are
/// skipped when the user already set that name.
pub fn merge_env(
    injected: Vec<(String, String)>,
    user: &BTreeMap<String, String>,
    secrets: Vec<EnvVar>,
) -> Vec<EnvVar> {
    let mut env: Vec<EnvVar> = injected
        .into_iter()
        .map(|(name, value)| match user.get(&name) {
            Some(user_value) => EnvVar::literal(name, user_value.clone()),
            None => EnvVar::literal(name, value),
        })
        .collect();

    for (name, value) in user {
        if !env.iter().any(|var| &var.name == name) {
            env.push(EnvVar::literal(name.clone(), value.clone()));
        }
    }

    for secret in secrets {
        if !env.iter().any(|var| var.name == secret.name) {
            env.push(secret);
        }
    }

    env
}

/// Compute requests and limits of a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceShape {
    pub requests: BTreeMap<String, String>,
    pub limits: BTreeMap<String, String>,
}

impl ResourceShape {
    /// Builds a shape from `(memory, cpu)` requests and limits
    pub fn new(requests: (&str, &str), limits: (&str, &str)) -> Self {
        let pair = |(memory, cpu): (&str, &str)| {
            BTreeMap::from([
                ("cpu".to_string(), cpu.to_string()),
                ("memory".to_string(), memory.to_string()),
            ])
        };
        Self {
            requests: pair(requests),
            limits: pair(limits),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeMount {
    pub name: String,
    pub mount_path: String,
}

/// Identity and hardening applied to the pod and its container
///
/// Every profile runs as non-root with all capabilities dropped, privilege
/// escalation disabled and the runtime's default seccomp filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecurityProfile {
    pub run_as_user: i64,
    pub run_as_group: Option<i64>,
    pub fs_group: i64,
    /// Also pin the numeric identity on the container itself
    pub pin_container_identity: bool,
}

impl SecurityProfile {
    fn pod_context(&self) -> JsonValue {
        let mut ctx = json!({
            "runAsUser": self.run_as_user,
            "runAsNonRoot": true,
            "fsGroup": self.fs_group,
            "seccompProfile": {"type": "RuntimeDefault"},
        });
        if let Some(group) = self.run_as_group {
            ctx["runAsGroup"] = json!(group);
        }
        ctx
    }

    fn container_context(&self) -> JsonValue {
        let mut ctx = json!({
            "allowPrivilegeEscalation": false,
            "capabilities": {"drop": ["ALL"]},
            "runAsNonRoot": true,
            "seccompProfile": {"type": "RuntimeDefault"},
        });
        if self.pin_container_identity {
            ctx["runAsUser"] = json!(self.run_as_user);
            if let Some(group) = self.run_as_group {
                ctx["runAsGroup"] = json!(group);
            }
        }
        ctx
    }
}

impl WorkloadSpec {
    /// Checks the document against the cluster's object constraints
    pub fn validate(&self) -> Result<()> {
        if !is_dns_label(&self.job_name) {
            return invalid(format!(
                "Job name '{}' must be a lower-case DNS label of at most 63 characters",
                self.job_name
            ));
        }

        if !is_dns_label(&self.container.name) {
            return invalid(format!("Invalid container name '{}'", self.container.name));
        }

        if self.container.image.trim().is_empty() {
            return invalid("Container image must not be empty".to_string());
        }

        if !RESTART_POLICIES.contains(&self.restart_policy.as_str()) {
            return invalid(format!(
                "Restart policy must be one of {:?}, got '{}'",
                RESTART_POLICIES, self.restart_policy
            ));
        }

        if !PULL_POLICIES.contains(&self.container.image_pull_policy.as_str()) {
            return invalid(format!(
                "Image pull policy must be one of {:?}, got '{}'",
                PULL_POLICIES, self.container.image_pull_policy
            ));
        }

        let mut seen = HashSet::new();
        for var in &self.container.env {
            if var.name.is_empty() {
                return invalid("Environment variable names must not be empty".to_string());
            }
            if !seen.insert(var.name.as_str()) {
                return invalid(format!("Duplicate environment variable '{}'", var.name));
            }
        }

        for (key, value) in self.labels.iter().chain(self.pod_labels.iter()) {
            if key.is_empty() || value.len() > 63 {
                return invalid(format!("Invalid label {}={}", key, value));
            }
        }

        for mount in &self.container.volume_mounts {
            if !self.volumes.contains(&mount.name) {
                return invalid(format!("Volume mount '{}' has no matching volume", mount.name));
            }
        }

        Ok(())
    }

    /// Renders the batch `Job` manifest as JSON
    pub fn to_document(&self) -> JsonValue {
        let env: Vec<JsonValue> = self
            .container
            .env
            .iter()
            .map(|var| match &var.source {
                EnvSource::Literal(value) => json!({"name": var.name, "value": value}),
                EnvSource::Secret { secret, key } => json!({
                    "name": var.name,
                    "valueFrom": {"secretKeyRef": {"name": secret, "key": key}},
                }),
            })
            .collect();

        let mut container = json!({
            "name": self.container.name,
            "image": self.container.image,
            "imagePullPolicy": self.container.image_pull_policy,
            "env": env,
            "securityContext": self.security.container_context(),
        });
        if let Some(command) = &self.container.command {
            container["command"] = json!(command);
        }
        if let Some(resources) = &self.container.resources {
            container["resources"] = json!({
                "requests": resources.requests,
                "limits": resources.limits,
            });
        }
        if !self.container.volume_mounts.is_empty() {
            container["volumeMounts"] = self
                .container
                .volume_mounts
                .iter()
                .map(|m| json!({"name": m.name, "mountPath": m.mount_path}))
                .collect();
        }

        let mut pod_spec = json!({
            "containers": [container],
            "restartPolicy": self.restart_policy,
            "securityContext": self.security.pod_context(),
        });
        if let Some(account) = &self.service_account {
            pod_spec["serviceAccountName"] = json!(account);
        }
        if !self.volumes.is_empty() {
            pod_spec["volumes"] = self
                .volumes
                .iter()
                .map(|name| json!({"name": name, "emptyDir": {}}))
                .collect();
        }

        let mut job_spec = json!({
            "backoffLimit": self.backoff_limit,
            "template": {
                "metadata": {"labels": self.pod_labels},
                "spec": pod_spec,
            },
        });
        if let Some(ttl) = self.ttl_seconds_after_finished {
            job_spec["ttlSecondsAfterFinished"] = json!(ttl);
        }

        json!({
            "apiVersion": "batch/v1",
            "kind": "Job",
            "metadata": {
                "name": self.job_name,
                "labels": self.labels,
                "annotations": self.annotations,
            },
            "spec": job_spec,
        })
    }

    /// Builds the typed API object
    pub fn to_job(&self) -> Result<Job> {
        serde_json::from_value(self.to_document())
            .map_err(|e| WorkerError::Validation(format!("Invalid workload document: {}", e)))
    }
}

fn invalid(message: String) -> Result<()> {
    Err(WorkerError::Validation(message))
}

fn is_dns_label(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= 63
        && value
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && value.starts_with(|c: char| c.is_ascii_alphanumeric())
        && value.ends_with(|c: char| c.is_ascii_alphanumeric())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_spec() -> WorkloadSpec {
        WorkloadSpec {
            job_name: "hypha-job-sample".to_string(),
            labels: BTreeMap::from([("app".to_string(), "hypha".to_string())]),
            annotations: BTreeMap::new(),
            pod_labels: BTreeMap::from([("app".to_string(), "hypha".to_string())]),
            container: ContainerSpec {
                name: "main".to_string(),
                image: "busybox:latest".to_string(),
                image_pull_policy: "IfNotPresent".to_string(),
                command: Some(vec!["echo".to_string(), "hi".to_string()]),
                env: vec![
                    EnvVar::literal("A", "1"),
                    EnvVar::secret("TOKEN", "hypha-secrets", "HYPHA_AGENTS_TOKEN"),
                ],
                resources: Some(ResourceShape::new(("512Mi", "500m"), ("2Gi", "2000m"))),
                volume_mounts: vec![VolumeMount {
                    name: "scratch".to_string(),
                    mount_path: "/scratch".to_string(),
                }],
            },
            restart_policy: "Never".to_string(),
            service_account: Some("default".to_string()),
            security: SecurityProfile {
                run_as_user: 1000,
                run_as_group: None,
                fs_group: 1000,
                pin_container_identity: false,
            },
            volumes: vec!["scratch".to_string()],
            backoff_limit: 3,
            ttl_seconds_after_finished: Some(3600),
        }
    }

    #[test]
    fn test_valid_spec_passes() {
        assert!(sample_spec().validate().is_ok());
    }

    #[test]
    fn test_validation_failures() {
        let mut spec = sample_spec();
        spec.restart_policy = "Always".to_string();
        assert!(matches!(spec.validate(), Err(WorkerError::Validation(_))));

        let mut spec = sample_spec();
        spec.container.env.push(EnvVar::literal("A", "2"));
        assert!(spec.validate().is_err());

        let mut spec = sample_spec();
        spec.job_name = "Hypha_Job".to_string();
        assert!(spec.validate().is_err());

        let mut spec = sample_spec();
        spec.container.image_pull_policy = "Sometimes".to_string();
        assert!(spec.validate().is_err());

        let mut spec = sample_spec();
        spec.labels.insert("long".to_string(), "x".repeat(64));
        assert!(spec.validate().is_err());

        let mut spec = sample_spec();
        spec.volumes.clear();
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_document_shape() {
        let doc = sample_spec().to_document();
        let pod = &doc["spec"]["template"]["spec"];
        let container = &pod["containers"][0];

        assert_eq!(doc["metadata"]["name"], "hypha-job-sample");
        assert_eq!(doc["spec"]["backoffLimit"], 3);
        assert_eq!(doc["spec"]["ttlSecondsAfterFinished"], 3600);
        assert_eq!(container["command"], json!(["echo", "hi"]));
        assert_eq!(container["env"][0], json!({"name": "A", "value": "1"}));
        assert_eq!(
            container["env"][1]["valueFrom"]["secretKeyRef"],
            json!({"name": "hypha-secrets", "key": "HYPHA_AGENTS_TOKEN"})
        );
        assert_eq!(container["securityContext"]["capabilities"]["drop"], json!(["ALL"]));
        assert!(container["securityContext"].get("runAsUser").is_none());
        assert_eq!(pod["securityContext"]["runAsUser"], 1000);
        assert_eq!(pod["volumes"][0], json!({"name": "scratch", "emptyDir": {}}));
        assert_eq!(container["resources"]["limits"]["memory"], "2Gi");
    }

    #[test]
    fn test_renders_typed_job() {
        let job = sample_spec().to_job().unwrap();
        let spec = job.spec.unwrap();
        let pod = spec.template.spec.unwrap();

        assert_eq!(job.metadata.name.as_deref(), Some("hypha-job-sample"));
        assert_eq!(spec.backoff_limit, Some(3));
        assert_eq!(pod.restart_policy.as_deref(), Some("Never"));
        assert_eq!(pod.containers[0].image.as_deref(), Some("busybox:latest"));
    }

    #[test]
    fn test_user_env_wins_and_shadows_secrets() {
        let user = BTreeMap::from([
            ("HYPHA_WORKSPACE".to_string(), "mine".to_string()),
            ("EXTRA".to_string(), "1".to_string()),
            ("HYPHA_TOKEN".to_string(), "literal".to_string()),
        ]);
        let env = merge_env(
            vec![
                ("HYPHA_SERVER_URL".to_string(), "http://x".to_string()),
                ("HYPHA_WORKSPACE".to_string(), "ws".to_string()),
            ],
            &user,
            vec![
                EnvVar::secret("HYPHA_TOKEN", "s", "k"),
                EnvVar::secret("ANTHROPIC_API_KEY", "s", "ANTHROPIC_API_KEY"),
            ],
        );

        let names: Vec<&str> = env.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(
            names,
            ["HYPHA_SERVER_URL", "HYPHA_WORKSPACE", "EXTRA", "HYPHA_TOKEN", "ANTHROPIC_API_KEY"]
        );
        assert_eq!(env[1].value(), Some("mine"));
        assert_eq!(env[3].value(), Some("literal"));
        assert_eq!(env[4].value(), None);
    }
}
