//! Deployments repository
//!
//! Handles communication with the orchestrator for deployment attempts:
//! - Fetching pending attempts
//! - Claiming an attempt
//! - Reporting progress (commit, deploying)
//! - Heartbeating to keep the runner's lease
//! - Completing an attempt with its outcome

use async_trait::async_trait;
use slipway_client::{DeploymentExecutionInfo, OrchestratorClient, Result};
use slipway_core::domain::deployment::{Deployment, DeploymentFailure, DeploymentStatus};
use std::sync::Arc;
use uuid::Uuid;

/// Repository trait for deployment operations with the orchestrator
#[async_trait]
pub trait DeploymentRepository: Send + Sync {
    /// Attempts waiting for a runner, oldest first
    async fn fetch_pending(&self) -> Result<Vec<Deployment>>;

    /// Claims an attempt for this runner
    ///
    /// Fails with a conflict when another runner claimed it first.
    async fn claim(&self, id: Uuid) -> Result<DeploymentExecutionInfo>;

    async fn record_commit(&self, id: Uuid, commit_sha: &str) -> Result<()>;

    async fn mark_deploying(&self, id: Uuid) -> Result<()>;

    async fn complete_success(&self, id: Uuid, url: &str) -> Result<()>;

    async fn complete_failed(&self, id: Uuid, failure: DeploymentFailure) -> Result<()>;

    /// Renews the lease and returns the stored status
    ///
    /// A terminal status means the attempt ended without this runner.
    async fn heartbeat(&self, id: Uuid) -> Result<DeploymentStatus>;
}

/// HTTP implementation of DeploymentRepository
pub struct HttpDeploymentRepository {
    client: Arc<OrchestratorClient>,
    runner_id: String,
}

impl HttpDeploymentRepository {
    pub fn new(client: Arc<OrchestratorClient>, runner_id: impl Into<String>) -> Self {
        Self {
            client,
            runner_id: runner_id.into(),
        }
    }
}

#[async_trait]
impl DeploymentRepository for HttpDeploymentRepository {
    async fn fetch_pending(&self) -> Result<Vec<Deployment>> {
        self.client.list_pending_deployments().await
    }

    async fn claim(&self, id: Uuid) -> Result<DeploymentExecutionInfo> {
        self.client.claim_deployment(id, &self.runner_id).await
    }

    async fn record_commit(&self, id: Uuid, commit_sha: &str) -> Result<()> {
        self.client.record_commit(id, commit_sha).await
    }

    async fn mark_deploying(&self, id: Uuid) -> Result<()> {
        self.client.mark_deploying(id).await
    }

    async fn complete_success(&self, id: Uuid, url: &str) -> Result<()> {
        self.client.complete_success(id, url).await
    }

    async fn complete_failed(&self, id: Uuid, failure: DeploymentFailure) -> Result<()> {
        self.client.complete_failed(id, failure).await
    }

    async fn heartbeat(&self, id: Uuid) -> Result<DeploymentStatus> {
        Ok(self.client.heartbeat(id).await?.status)
    }
}
