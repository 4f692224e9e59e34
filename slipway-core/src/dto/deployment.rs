//! Deployment DTOs

use serde::{Deserialize, Serialize};

use crate::domain::deployment::{Deployment, DeploymentFailure, DeploymentStatus};
use crate::domain::environment::Environment;
use crate::domain::tenant::Tenant;

/// Request to start a deployment attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDeployment {
    pub tenant_id: String,
    pub version: String,
    pub environment: Environment,
}

/// Filters for listing deployments
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeploymentQuery {
    pub tenant_id: Option<String>,
    pub environment: Option<Environment>,
    pub status: Option<DeploymentStatus>,
}

/// Runner claim on a pending deployment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimDeployment {
    pub runner_id: String,
}

/// Everything a runner needs to drive a claimed deployment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentExecutionInfo {
    pub deployment: Deployment,
    pub tenant: Tenant,
}

/// Commit produced by source synchronization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordCommit {
    pub commit_sha: String,
}

/// Final outcome reported by a runner
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CompleteDeployment {
    Success { url: String },
    Failed { failure: DeploymentFailure },
}

/// Whether a deployment can be rolled back, and to what
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackEligibility {
    pub can_rollback: bool,
    pub target: Option<Deployment>,
}
