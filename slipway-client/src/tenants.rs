//! Tenant-related API endpoints

use crate::error::Result;
use crate::{OrchestratorClient, handle_response};
use slipway_core::domain::tenant::Tenant;
use slipway_core::dto::tenant::CreateTenant;

impl OrchestratorClient {
    /// Register a tenant
    ///
    /// The orchestrator assigns the opaque tenant id.
    pub async fn create_tenant(&self, req: CreateTenant) -> Result<Tenant> {
        let url = format!("{}/api/tenants", self.base_url);
        let response = self.client.post(&url).json(&req).send().await?;

        handle_response(response).await
    }

    pub async fn get_tenant(&self, id: &str) -> Result<Tenant> {
        let url = format!("{}/api/tenants/{}", self.base_url, id);
        let response = self.client.get(&url).send().await?;

        handle_response(response).await
    }

    pub async fn list_tenants(&self) -> Result<Vec<Tenant>> {
        let url = format!("{}/api/tenants", self.base_url);
        let response = self.client.get(&url).send().await?;

        handle_response(response).await
    }

    /// Record that repository permissions changed just now
    ///
    /// Build monitoring for this tenant waits out a grace period after this.
    pub async fn touch_repository_permissions(&self, id: &str) -> Result<Tenant> {
        let url = format!("{}/api/tenants/{}/permissions", self.base_url, id);
        let response = self.client.post(&url).send().await?;

        handle_response(response).await
    }
}
