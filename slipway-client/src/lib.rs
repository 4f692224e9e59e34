//! Slipway HTTP Clients
//!
//! Type-safe clients for everything Slipway talks to over HTTP:
//!
//! - [`OrchestratorClient`]: the deployment state tracker and tenant registry
//! - [`source`]: git-data primitives at the source host (blob, tree, commit, ref)
//! - [`builds`]: build run status and build outputs at the CI system
//! - [`dispatch`]: namespace-scoped script upload and request forwarding at the edge platform
//! - [`files`]: the file-content provider
//!
//! External APIs sit behind traits so the runner and the edge can be exercised
//! against the in-memory doubles in `testing` (feature `test-support`).
//!
//! # Example
//!
//! ```no_run
//! use slipway_client::OrchestratorClient;
//! use slipway_core::domain::environment::Environment;
//! use slipway_core::dto::deployment::CreateDeployment;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = OrchestratorClient::new("http://localhost:8080");
//!
//!     let deployment = client.create_deployment(CreateDeployment {
//!         tenant_id: "3f9c0a1b2c3d4e5f".to_string(),
//!         version: "v42".to_string(),
//!         environment: Environment::Preview,
//!     }).await?;
//!
//!     println!("Started deployment: {}", deployment.id);
//!     Ok(())
//! }
//! ```

pub mod builds;
pub mod dispatch;
pub mod error;
pub mod files;
pub mod source;

mod deployments;
mod tenants;

#[cfg(feature = "test-support")]
pub mod testing;

// Re-export commonly used types
pub use error::{ClientError, Result};
pub use slipway_core::dto::deployment::DeploymentExecutionInfo;

use reqwest::Client;
use serde::de::DeserializeOwned;

/// HTTP client for the Slipway orchestrator API
///
/// Methods are organized into logical groups:
/// - Tenant registry (create, list, get, permission changes)
/// - Deployment lifecycle (create, claim, commit, deploying, complete, cancel, rollback)
/// - Deployment logs
#[derive(Debug, Clone)]
pub struct OrchestratorClient {
    /// Base URL of the orchestrator (e.g., "http://localhost:8080")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

impl OrchestratorClient {
    /// Create a new orchestrator client
    ///
    /// # Example
    /// ```
    /// use slipway_client::OrchestratorClient;
    ///
    /// let client = OrchestratorClient::new("http://localhost:8080");
    /// ```
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new orchestrator client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Get the base URL of the orchestrator
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check that the orchestrator is up
    pub async fn health(&self) -> Result<()> {
        let url = format!("{}/health", self.base_url);
        let response = self.client.get(&url).send().await?;

        handle_empty_response(response).await
    }
}

// =============================================================================
// Response Handlers
// =============================================================================

/// Handle an API response and deserialize JSON
///
/// Checks the status code and returns an appropriate error if the request
/// failed, or deserializes the response body if successful.
pub(crate) async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let response = check_status(response).await?;

    response
        .json()
        .await
        .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
}

/// Handle an API response that returns no content
pub(crate) async fn handle_empty_response(response: reqwest::Response) -> Result<()> {
    check_status(response).await.map(|_| ())
}

pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();

    if !status.is_success() {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(ClientError::from_body(status.as_u16(), &error_text));
    }

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = OrchestratorClient::new("http://localhost:8080");
        assert_eq!(client.base_url(), "http://localhost:8080");
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = OrchestratorClient::new("http://localhost:8080/");
        assert_eq!(client.base_url(), "http://localhost:8080");
    }

    #[test]
    fn test_client_with_custom_client() {
        let http_client = Client::new();
        let client = OrchestratorClient::with_client("http://localhost:8080", http_client);
        assert_eq!(client.base_url(), "http://localhost:8080");
    }
}
