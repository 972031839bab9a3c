//! Kubernetes-backed cluster gateway

use async_trait::async_trait;
use futures::future::OptionFuture;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Status;
use kube::api::{
    Api, AttachParams, AttachedProcess, DeleteParams, ListParams, LogParams, PostParams,
};
use kube::{Client, Config as KubeConfig};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info};

use super::{ClusterGateway, ExecOutput, GatewayError, PodPhase, PodSummary};
use crate::workload::WorkloadSpec;

/// Gateway talking to a real cluster through the Kubernetes API
#[derive(Clone)]
pub struct KubeGateway {
    namespace: String,
    jobs: Api<Job>,
    pods: Api<Pod>,
}

impl KubeGateway {
    /// Creates a gateway over an existing client
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            jobs: Api::namespaced(client.clone(), namespace),
            pods: Api::namespaced(client, namespace),
        }
    }

    /// Connects to the cluster
    ///
    /// In-cluster service account configuration is tried first, then the local
    /// kubeconfig.
    pub async fn connect(namespace: &str) -> Result<Self, GatewayError> {
        let config = match KubeConfig::incluster() {
            Ok(config) => {
                info!("Using in-cluster Kubernetes configuration");
                config
            }
            Err(in_cluster_err) => {
                debug!("In-cluster configuration unavailable: {}", in_cluster_err);
                let config = KubeConfig::infer().await.map_err(|e| {
                    GatewayError::Transport(format!(
                        "Could not load Kubernetes configuration: {}",
                        e
                    ))
                })?;
                info!("Using kubeconfig Kubernetes configuration");
                config
            }
        };

        let client = Client::try_from(config).map_err(|e| {
            GatewayError::Transport(format!("Could not build Kubernetes client: {}", e))
        })?;

        // Probe the API once so an unusable cluster fails at start-up
        client
            .apiserver_version()
            .await
            .map_err(GatewayError::from)?;

        Ok(Self::new(client, namespace))
    }

    /// Namespace every call is bound to
    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

impl From<kube::Error> for GatewayError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(response) => GatewayError::api(response.code, response.message),
            other => GatewayError::Transport(other.to_string()),
        }
    }
}

#[async_trait]
impl ClusterGateway for KubeGateway {
    async fn create_job(&self, spec: &WorkloadSpec) -> Result<(), GatewayError> {
        let job = spec
            .to_job()
            .map_err(|e| GatewayError::InvalidWorkload(e.to_string()))?;

        self.jobs.create(&PostParams::default(), &job).await?;
        debug!("Created job {} in namespace {}", spec.job_name, self.namespace);
        Ok(())
    }

    async fn list_pods(&self, label_selector: &str) -> Result<Vec<PodSummary>, GatewayError> {
        let pods = self
            .pods
            .list(&ListParams::default().labels(label_selector))
            .await?;

        Ok(pods
            .items
            .into_iter()
            .map(|pod| {
                let phase = pod.status.as_ref().and_then(|s| s.phase.as_deref());
                PodSummary {
                    phase: PodPhase::parse(phase),
                    name: pod.metadata.name.unwrap_or_default(),
                }
            })
            .collect())
    }

    async fn delete_job(&self, job_name: &str) -> Result<(), GatewayError> {
        self.jobs
            .delete(job_name, &DeleteParams::background())
            .await?;
        Ok(())
    }

    async fn pod_logs(&self, pod_name: &str, container: &str) -> Result<String, GatewayError> {
        let params = LogParams {
            container: Some(container.to_string()),
            ..LogParams::default()
        };
        Ok(self.pods.logs(pod_name, &params).await?)
    }

    async fn exec(
        &self,
        pod_name: &str,
        container: &str,
        command: Vec<String>,
    ) -> Result<ExecOutput, GatewayError> {
        let params = AttachParams::default()
            .container(container)
            .stdin(false)
            .stdout(true)
            .stderr(true);

        let mut process = self.pods.exec(pod_name, command, &params).await?;

        let stdout = process.stdout();
        let stderr = process.stderr();
        let status: OptionFuture<_> = process.take_status().into();
        // from here on, dropping this future tears the websocket down
        let session = AbortOnDrop::new(process);

        let (stdout, stderr, status) = tokio::join!(drain(stdout), drain(stderr), status);
        let stdout = stdout.map_err(|e| GatewayError::Exec(e.to_string()))?;
        let stderr = stderr.map_err(|e| GatewayError::Exec(e.to_string()))?;

        if let Some(process) = session.into_inner() {
            process
                .join()
                .await
                .map_err(|e| GatewayError::Exec(e.to_string()))?;
        }

        let exit_code = match status.flatten() {
            Some(status) => exit_code_from_status(&status)?,
            None => None,
        };

        Ok(ExecOutput {
            stdout,
            stderr,
            exit_code,
        })
    }
}

/// Something running in the background that can be stopped early
trait Abort {
    fn abort(&self);
}

impl Abort for AttachedProcess {
    fn abort(&self) {
        AttachedProcess::abort(self);
    }
}

/// Stops the wrapped task when dropped before [`AbortOnDrop::into_inner`]
///
/// The exec websocket is pumped by a spawned task that outlives a dropped
/// handle, so a timed-out command would otherwise keep running remotely.
struct AbortOnDrop<T: Abort>(Option<T>);

impl<T: Abort> AbortOnDrop<T> {
    fn new(inner: T) -> Self {
        Self(Some(inner))
    }

    /// Disarms the guard
    fn into_inner(mut self) -> Option<T> {
        self.0.take()
    }
}

impl<T: Abort> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        if let Some(inner) = &self.0 {
            debug!("Aborting unfinished exec session");
            inner.abort();
        }
    }
}

/// Reads a stream to its end; an absent stream reads as empty
async fn drain<R: AsyncRead + Unpin>(reader: Option<R>) -> std::io::Result<String> {
    let mut buf = Vec::new();
    if let Some(mut reader) = reader {
        reader.read_to_end(&mut buf).await?;
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Maps the status frame sent on the exec error channel to an exit code
///
/// "Success" is exit code 0; "NonZeroExitCode" carries the code in an
/// `ExitCode` cause. Any other failure is a channel-level error.
fn exit_code_from_status(status: &Status) -> Result<Option<i32>, GatewayError> {
    if status.status.as_deref() == Some("Success") {
        return Ok(Some(0));
    }

    if status.reason.as_deref() == Some("NonZeroExitCode") {
        let code = status
            .details
            .as_ref()
            .and_then(|d| d.causes.as_ref())
            .and_then(|causes| {
                causes
                    .iter()
                    .find(|c| c.reason.as_deref() == Some("ExitCode"))
            })
            .and_then(|c| c.message.as_deref())
            .and_then(|m| m.parse::<i32>().ok())
            // non-zero but unparseable
            .unwrap_or(1);
        return Ok(Some(code));
    }

    Err(GatewayError::Exec(
        status
            .message
            .clone()
            .unwrap_or_else(|| "exec channel reported an unknown failure".to_string()),
    ))
}
