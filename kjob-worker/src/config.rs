//! Worker configuration
//!
//! Defines the ambient settings every session inherits: target namespace,
//! workload defaults, the mesh server URL and the polling/timeout budget of
//! the startup loops.

use kjob_client::RegistryClient;
use std::time::Duration;

/// Pull policies accepted by the cluster
pub const PULL_POLICIES: [&str; 3] = ["Always", "IfNotPresent", "Never"];

/// Worker configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Unique identifier for this worker instance
    pub instance_id: String,

    /// Namespace every workload is created in
    pub namespace: String,

    /// Workload timeout in seconds when the manifest does not set one
    pub default_timeout: u64,

    /// Image pull policy when the manifest does not set one
    pub image_pull_policy: String,

    /// Base URL of the RPC mesh server (e.g., "https://hypha.aicell.io")
    pub server_url: String,

    /// Token presented to the mesh when resolving services
    pub server_token: Option<String>,

    /// Poll intervals and deadlines
    pub timings: Timings,
}

/// Poll intervals and deadlines of the startup and exec paths
///
/// Kept separate so tests can shrink them without touching the rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    /// Delay between pod listings while waiting for readiness
    pub pod_poll_interval: Duration,

    /// Ceiling on the wait for a pod to run
    pub pod_ready_timeout: Duration,

    /// Delay between service lookups while waiting for registration
    pub service_poll_interval: Duration,

    /// Ceiling on the wait for a workload to register its service
    pub service_wait_timeout: Duration,

    /// Default wall-clock budget of a remote command
    pub exec_timeout: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            pod_poll_interval: Duration::from_secs(2),
            pod_ready_timeout: Duration::from_secs(300), // 5 minutes
            service_poll_interval: Duration::from_secs(2),
            service_wait_timeout: Duration::from_secs(120),
            exec_timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    /// Creates a new configuration with defaults
    pub fn new(instance_id: String, server_url: String) -> Self {
        Self {
            instance_id,
            namespace: "default".to_string(),
            default_timeout: 3600,
            image_pull_policy: "IfNotPresent".to_string(),
            server_url,
            server_token: None,
            timings: Timings::default(),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables (all optional):
    /// - KJOB_INSTANCE_ID (default: random `k8s-worker-<hex>`)
    /// - HYPHA_K8S_NAMESPACE (default: default)
    /// - HYPHA_K8S_DEFAULT_TIMEOUT (seconds, default: 3600)
    /// - HYPHA_K8S_IMAGE_PULL_POLICY (default: IfNotPresent)
    /// - HYPHA_SERVER_URL (default: https://hypha.aicell.io)
    /// - HYPHA_TOKEN (default: none)
    ///
    /// A malformed value is an error; it never silently resets the others.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Creates configuration from any variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let instance_id = lookup("KJOB_INSTANCE_ID").unwrap_or_else(generate_instance_id);

        let server_url =
            lookup("HYPHA_SERVER_URL").unwrap_or_else(|| "https://hypha.aicell.io".to_string());

        let mut config = Self::new(instance_id, server_url);

        if let Some(namespace) = lookup("HYPHA_K8S_NAMESPACE") {
            config.namespace = namespace;
        }

        if let Some(raw) = lookup("HYPHA_K8S_DEFAULT_TIMEOUT") {
            config.default_timeout = raw.trim().parse::<u64>().map_err(|_| {
                anyhow::anyhow!(
                    "HYPHA_K8S_DEFAULT_TIMEOUT must be a number of seconds, got '{}'",
                    raw
                )
            })?;
        }

        if let Some(policy) = lookup("HYPHA_K8S_IMAGE_PULL_POLICY") {
            config.image_pull_policy = policy;
        }

        config.server_token = lookup("HYPHA_TOKEN").filter(|token| !token.is_empty());

        Ok(config)
    }

    /// Client for the mesh's service registry, authenticated when a token is set
    pub fn registry_client(&self) -> RegistryClient {
        let client = RegistryClient::new(self.server_url.clone());
        match &self.server_token {
            Some(token) => client.with_token(token.clone()),
            None => client,
        }
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.instance_id.is_empty() {
            anyhow::bail!("instance_id cannot be empty");
        }

        if self.namespace.is_empty() {
            anyhow::bail!("namespace cannot be empty");
        }

        if !self.server_url.starts_with("http://") && !self.server_url.starts_with("https://") {
            anyhow::bail!("server_url must start with http:// or https://");
        }

        if !PULL_POLICIES.contains(&self.image_pull_policy.as_str()) {
            anyhow::bail!(
                "image_pull_policy must be one of {:?}, got '{}'",
                PULL_POLICIES,
                self.image_pull_policy
            );
        }

        if self.default_timeout == 0 {
            anyhow::bail!("default_timeout must be greater than 0");
        }

        if self.timings.pod_poll_interval.is_zero() || self.timings.service_poll_interval.is_zero()
        {
            anyhow::bail!("poll intervals must be greater than 0");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(
            generate_instance_id(),
            "https://hypha.aicell.io".to_string(),
        )
    }
}

fn generate_instance_id() -> String {
    format!("k8s-worker-{}", &uuid::Uuid::new_v4().simple().to_string()[..8])
}
