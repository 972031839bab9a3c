//! kjob Registry Client
//!
//! A small, type-safe HTTP client for the service registry of the RPC mesh.
//!
//! Workloads started by the worker may register themselves as services on the
//! mesh once their container is up. The worker uses this client to check that
//! the mesh server is reachable and to resolve a `workspace/service_id` pair.
//!
//! # Example
//!
//! ```no_run
//! use kjob_client::RegistryClient;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = RegistryClient::new("https://hypha.aicell.io");
//!     client.check_health().await?;
//!
//!     let service = client.get_service("my-workspace", "conda-worker-1a2b3c4d").await?;
//!     println!("Resolved service: {}", service.id);
//!     Ok(())
//! }
//! ```

pub mod error;
mod services;

// Re-export commonly used types
pub use error::{ClientError, Result};
pub use services::ServiceInfo;

use reqwest::Client;
use serde::de::DeserializeOwned;

/// HTTP client for the service registry
#[derive(Debug, Clone)]
pub struct RegistryClient {
    /// Base URL of the mesh server (e.g., "https://hypha.aicell.io")
    base_url: String,
    /// Bearer token sent with every request, if any
    token: Option<String>,
    /// HTTP client instance
    client: Client,
}

impl RegistryClient {
    /// Create a new registry client
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the mesh server
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new registry client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
            client,
        }
    }

    /// Attach a bearer token to every request
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Get the base URL of the mesh server
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        let request = self.client.get(url);
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Handle an API response and deserialize JSON
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }

    /// Handle an API response whose body is irrelevant
    async fn handle_empty_response(&self, response: reqwest::Response) -> Result<()> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        Ok(())
    }
}
