//! Deployment-related API endpoints

use crate::error::Result;
use crate::{OrchestratorClient, handle_empty_response, handle_response};
use slipway_core::domain::deployment::{Deployment, DeploymentFailure};
use slipway_core::domain::log::LogEntry;
use slipway_core::dto::deployment::{
    ClaimDeployment, CompleteDeployment, CreateDeployment, DeploymentExecutionInfo,
    DeploymentQuery, RecordCommit, RollbackEligibility,
};
use uuid::Uuid;

impl OrchestratorClient {
    // =============================================================================
    // Deployment Lifecycle
    // =============================================================================

    /// Start a deployment attempt
    ///
    /// Fails with a 409 [`crate::ClientError::ApiError`] (see
    /// [`crate::ClientError::is_already_in_progress`]) when a deployment for
    /// the same tenant and environment is already running.
    pub async fn create_deployment(&self, req: CreateDeployment) -> Result<Deployment> {
        let url = format!("{}/api/deployments", self.base_url);
        let response = self.client.post(&url).json(&req).send().await?;

        handle_response(response).await
    }

    /// Get a deployment by ID
    pub async fn get_deployment(&self, id: Uuid) -> Result<Deployment> {
        let url = format!("{}/api/deployments/{}", self.base_url, id);
        let response = self.client.get(&url).send().await?;

        handle_response(response).await
    }

    /// List deployments, optionally filtered
    pub async fn list_deployments(&self, query: &DeploymentQuery) -> Result<Vec<Deployment>> {
        let url = format!("{}/api/deployments", self.base_url);
        let response = self.client.get(&url).query(query).send().await?;

        handle_response(response).await
    }

    /// List deployments waiting for a runner
    pub async fn list_pending_deployments(&self) -> Result<Vec<Deployment>> {
        let url = format!("{}/api/deployments/pending", self.base_url);
        let response = self.client.get(&url).send().await?;

        handle_response(response).await
    }

    /// Cancel a pending or building deployment
    pub async fn cancel_deployment(&self, id: Uuid) -> Result<Deployment> {
        let url = format!("{}/api/deployments/{}/cancel", self.base_url, id);
        let response = self.client.post(&url).send().await?;

        handle_response(response).await
    }

    /// Check whether a deployment can be rolled back
    pub async fn rollback_eligibility(&self, id: Uuid) -> Result<RollbackEligibility> {
        let url = format!("{}/api/deployments/{}/rollback", self.base_url, id);
        let response = self.client.get(&url).send().await?;

        handle_response(response).await
    }

    /// Roll a production deployment back to the previous successful version
    ///
    /// Returns the new pending deployment.
    pub async fn rollback_deployment(&self, id: Uuid) -> Result<Deployment> {
        let url = format!("{}/api/deployments/{}/rollback", self.base_url, id);
        let response = self.client.post(&url).send().await?;

        handle_response(response).await
    }

    // =============================================================================
    // Deployment Execution (Runner-specific)
    // =============================================================================

    /// Claim a pending deployment for execution by a runner
    pub async fn claim_deployment(
        &self,
        id: Uuid,
        runner_id: &str,
    ) -> Result<DeploymentExecutionInfo> {
        let url = format!("{}/api/deployments/{}/claim", self.base_url, id);
        let response = self
            .client
            .post(&url)
            .json(&ClaimDeployment {
                runner_id: runner_id.to_string(),
            })
            .send()
            .await?;

        handle_response(response).await
    }

    /// Record the commit produced by source synchronization
    pub async fn record_commit(&self, id: Uuid, commit_sha: &str) -> Result<()> {
        let url = format!("{}/api/deployments/{}/commit", self.base_url, id);
        let response = self
            .client
            .post(&url)
            .json(&RecordCommit {
                commit_sha: commit_sha.to_string(),
            })
            .send()
            .await?;

        handle_empty_response(response).await
    }

    /// Move a building deployment to deploying
    pub async fn mark_deploying(&self, id: Uuid) -> Result<()> {
        let url = format!("{}/api/deployments/{}/deploying", self.base_url, id);
        let response = self.client.post(&url).send().await?;

        handle_empty_response(response).await
    }

    /// Renew the runner's lease on a claimed deployment
    ///
    /// Returns the deployment as stored; a terminal status means the attempt
    /// was cancelled or failed without this runner.
    pub async fn heartbeat(&self, id: Uuid) -> Result<Deployment> {
        let url = format!("{}/api/deployments/{}/heartbeat", self.base_url, id);
        let response = self.client.post(&url).send().await?;

        handle_response(response).await
    }

    /// Report a successful deployment
    pub async fn complete_success(&self, id: Uuid, deployed_url: &str) -> Result<()> {
        self.complete(
            id,
            CompleteDeployment::Success {
                url: deployed_url.to_string(),
            },
        )
        .await
    }

    /// Report a failed deployment
    pub async fn complete_failed(&self, id: Uuid, failure: DeploymentFailure) -> Result<()> {
        self.complete(id, CompleteDeployment::Failed { failure }).await
    }

    async fn complete(&self, id: Uuid, outcome: CompleteDeployment) -> Result<()> {
        let url = format!("{}/api/deployments/{}/complete", self.base_url, id);
        let response = self.client.post(&url).json(&outcome).send().await?;

        handle_empty_response(response).await
    }

    // =============================================================================
    // Deployment Logs
    // =============================================================================

    /// Get logs for a deployment
    pub async fn get_deployment_logs(&self, id: Uuid) -> Result<Vec<LogEntry>> {
        let url = format!("{}/api/deployments/{}/logs", self.base_url, id);
        let response = self.client.get(&url).send().await?;

        handle_response(response).await
    }

    /// Send logs for a deployment
    pub async fn send_logs(&self, id: Uuid, entries: Vec<LogEntry>) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let url = format!("{}/api/deployments/{}/logs", self.base_url, id);
        let response = self.client.post(&url).json(&entries).send().await?;

        handle_empty_response(response).await
    }
}
