//! Service registry endpoints

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::RegistryClient;
use crate::error::{ClientError, Result};

/// Description of a registered service as reported by the mesh
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "type")]
    pub service_type: Option<String>,
    /// Remaining fields (config, description, docs, ...)
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl RegistryClient {
    /// Check that the mesh server is up and answering
    pub async fn check_health(&self) -> Result<()> {
        let url = format!("{}/health/liveness", self.base_url);
        let response = self.get(&url).send().await?;

        self.handle_empty_response(response).await
    }

    /// Resolve a service registered under a workspace
    ///
    /// # Arguments
    /// * `workspace` - Workspace the service registered in
    /// * `service_id` - Service identifier within the workspace
    ///
    /// # Returns
    /// The service description, or `ClientError::NotFound` if it is not registered yet
    pub async fn get_service(&self, workspace: &str, service_id: &str) -> Result<ServiceInfo> {
        if workspace.is_empty() || service_id.is_empty() {
            return Err(ClientError::InvalidRequest(
                "workspace and service id must not be empty".to_string(),
            ));
        }

        let url = service_url(&self.base_url, workspace, service_id);
        tracing::debug!("Resolving service {}/{}", workspace, service_id);
        let response = self.get(&url).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound(format!("{}/{}", workspace, service_id)));
        }

        self.handle_response(response).await
    }
}

fn service_url(base_url: &str, workspace: &str, service_id: &str) -> String {
    format!("{}/{}/services/{}", base_url, workspace, service_id)
}
