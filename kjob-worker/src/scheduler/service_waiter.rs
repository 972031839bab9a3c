//! Service registration waiter
//!
//! Self-registering workloads announce a service on the mesh once their
//! container is up. Waiting for it is advisory: every failure ends in a
//! `false` outcome and a warning, never an error.

use async_trait::async_trait;
use kjob_client::{ClientError, RegistryClient};
use kjob_core::domain::progress::ProgressEvent;
use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

use crate::config::Timings;
use crate::service::progress::StartupReporter;

/// The mesh's service directory, as seen by the waiter
#[async_trait]
pub trait ServiceRegistry: Send + Sync {
    /// Checks that the mesh server can be reached
    async fn connect(&self) -> Result<(), ClientError>;

    /// Resolves a service, failing while it is not registered
    async fn lookup(&self, workspace: &str, service_id: &str) -> Result<(), ClientError>;
}

#[async_trait]
impl ServiceRegistry for RegistryClient {
    async fn connect(&self) -> Result<(), ClientError> {
        self.check_health().await
    }

    async fn lookup(&self, workspace: &str, service_id: &str) -> Result<(), ClientError> {
        self.get_service(workspace, service_id).await.map(|_| ())
    }
}

/// Waits for `workspace/service_id` to resolve
///
/// Returns `true` once the service is found. On timeout a warning event is
/// reported; if the mesh cannot be reached at all only a log line is written.
pub async fn wait_for_service(
    registry: &dyn ServiceRegistry,
    workspace: &str,
    service_id: &str,
    timings: &Timings,
    reporter: &mut StartupReporter,
) -> bool {
    if let Err(e) = registry.connect().await {
        warn!("Could not check for service {}/{}: {}", workspace, service_id, e);
        return false;
    }

    let deadline = Instant::now() + timings.service_wait_timeout;

    while Instant::now() < deadline {
        match registry.lookup(workspace, service_id).await {
            Ok(()) => {
                reporter
                    .report(ProgressEvent::success(format!(
                        "Service '{}' is now available",
                        service_id
                    )))
                    .await;
                return true;
            }
            Err(e) if e.is_server_error() => {
                warn!(
                    "Service registry error while resolving {}/{}: {}",
                    workspace, service_id, e
                );
                sleep(timings.service_poll_interval).await;
            }
            Err(e) => {
                debug!("Service {}/{} not available yet: {}", workspace, service_id, e);
                sleep(timings.service_poll_interval).await;
            }
        }
    }

    reporter
        .report(ProgressEvent::warning(format!(
            "Service '{}' did not become available within {}s",
            service_id,
            timings.service_wait_timeout.as_secs()
        )))
        .await;
    false
}
