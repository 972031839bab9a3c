//! Pod readiness poller
//!
//! Watches the pods of a freshly created job until one of them runs, finishes,
//! fails, or the deadline passes.

use tokio::time::{Instant, sleep};
use tracing::debug;

use crate::cluster::{ClusterGateway, PodPhase};
use crate::config::Timings;
use crate::error::{Result, WorkerError};

/// How the first observed pod turned out
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PodReadiness {
    /// The pod is running
    Running(String),
    /// The pod already completed successfully
    Completed(String),
}

impl PodReadiness {
    pub fn pod_name(&self) -> &str {
        match self {
            Self::Running(name) | Self::Completed(name) => name,
        }
    }
}

/// Polls the pods labeled with `job-name=<job_name>`
///
/// "Not found" answers are retried; any other API error aborts the wait. A
/// failed pod is fatal. Only the first listed pod is inspected.
pub async fn wait_for_pod(
    gateway: &dyn ClusterGateway,
    job_name: &str,
    timings: &Timings,
) -> Result<PodReadiness> {
    let selector = format!("job-name={}", job_name);
    let deadline = Instant::now() + timings.pod_ready_timeout;

    loop {
        match gateway.list_pods(&selector).await {
            Ok(pods) => {
                if let Some(pod) = pods.into_iter().next() {
                    debug!("Pod {} of job {} is {}", pod.name, job_name, pod.phase);
                    match pod.phase {
                        PodPhase::Running => return Ok(PodReadiness::Running(pod.name)),
                        PodPhase::Succeeded => return Ok(PodReadiness::Completed(pod.name)),
                        PodPhase::Failed => {
                            return Err(WorkerError::Operation(format!(
                                "Pod {} failed to start",
                                pod.name
                            )));
                        }
                        PodPhase::Pending | PodPhase::Unknown => {}
                    }
                } else {
                    debug!("No pod scheduled yet for job {}", job_name);
                }
            }
            Err(e) if e.is_not_found() => {
                debug!("Pods of job {} not found yet: {}", job_name, e);
            }
            Err(e) => return Err(e.into()),
        }

        if Instant::now() >= deadline {
            return Err(WorkerError::Timeout(format!(
                "Timeout waiting for job {} pod to start",
                job_name
            )));
        }

        sleep(timings.pod_poll_interval).await;
    }
}
