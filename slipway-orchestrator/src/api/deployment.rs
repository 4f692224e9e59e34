//! Deployment API Handlers
//!
//! HTTP endpoints for the deployment state tracker.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use slipway_core::domain::deployment::Deployment;
use slipway_core::domain::log::LogEntry;
use slipway_core::dto::deployment::{
    ClaimDeployment, CompleteDeployment, CreateDeployment, DeploymentExecutionInfo,
    DeploymentQuery, RecordCommit, RollbackEligibility,
};
use uuid::Uuid;

use crate::api::AppState;
use crate::api::error::ApiResult;
use crate::service::deployment_service;

// =============================================================================
// Deployment Lifecycle Endpoints
// =============================================================================

/// POST /api/deployments
/// Start a deployment attempt; 409 if one is already in progress
pub async fn create_deployment(
    State(repo): State<AppState>,
    Json(req): Json<CreateDeployment>,
) -> ApiResult<(StatusCode, Json<Deployment>)> {
    tracing::info!(
        "Deploying {} of tenant {} to {}",
        req.version,
        req.tenant_id,
        req.environment
    );

    let deployment = deployment_service::create_deployment(repo.as_ref(), req).await?;
    Ok((StatusCode::CREATED, Json(deployment)))
}

/// GET /api/deployments
pub async fn list_deployments(
    State(repo): State<AppState>,
    Query(query): Query<DeploymentQuery>,
) -> ApiResult<Json<Vec<Deployment>>> {
    tracing::debug!("Listing deployments: {:?}", query);

    let deployments = deployment_service::list_deployments(repo.as_ref(), &query).await?;
    Ok(Json(deployments))
}

/// GET /api/deployments/pending
pub async fn list_pending(State(repo): State<AppState>) -> ApiResult<Json<Vec<Deployment>>> {
    let deployments = deployment_service::list_pending(repo.as_ref()).await?;
    Ok(Json(deployments))
}

/// GET /api/deployments/{id}
pub async fn get_deployment(
    State(repo): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Deployment>> {
    let deployment = deployment_service::get_deployment(repo.as_ref(), id).await?;
    Ok(Json(deployment))
}

/// POST /api/deployments/{id}/cancel
pub async fn cancel_deployment(
    State(repo): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Deployment>> {
    tracing::info!("Cancelling deployment: {}", id);

    let deployment = deployment_service::cancel_deployment(repo.as_ref(), id).await?;
    Ok(Json(deployment))
}

/// GET /api/deployments/{id}/rollback
pub async fn rollback_eligibility(
    State(repo): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<RollbackEligibility>> {
    let eligibility = deployment_service::rollback_eligibility(repo.as_ref(), id).await?;
    Ok(Json(eligibility))
}

/// POST /api/deployments/{id}/rollback
pub async fn rollback_deployment(
    State(repo): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<Deployment>)> {
    tracing::info!("Rolling back deployment: {}", id);

    let deployment = deployment_service::rollback_deployment(repo.as_ref(), id).await?;
    Ok((StatusCode::CREATED, Json(deployment)))
}

// =============================================================================
// Runner Endpoints
// =============================================================================

/// POST /api/deployments/{id}/claim
pub async fn claim_deployment(
    State(repo): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ClaimDeployment>,
) -> ApiResult<Json<DeploymentExecutionInfo>> {
    tracing::info!("Runner {} claiming deployment: {}", req.runner_id, id);

    let info = deployment_service::claim_deployment(repo.as_ref(), id, &req.runner_id).await?;
    Ok(Json(info))
}

/// POST /api/deployments/{id}/commit
pub async fn record_commit(
    State(repo): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<RecordCommit>,
) -> ApiResult<StatusCode> {
    deployment_service::record_commit(repo.as_ref(), id, &req.commit_sha).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/deployments/{id}/deploying
pub async fn mark_deploying(
    State(repo): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    deployment_service::mark_deploying(repo.as_ref(), id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/deployments/{id}/heartbeat
/// Renews the runner's lease and returns the attempt as stored
pub async fn heartbeat(
    State(repo): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Deployment>> {
    let deployment = deployment_service::heartbeat(repo.as_ref(), id).await?;
    Ok(Json(deployment))
}

/// POST /api/deployments/{id}/complete
pub async fn complete_deployment(
    State(repo): State<AppState>,
    Path(id): Path<Uuid>,
    Json(outcome): Json<CompleteDeployment>,
) -> ApiResult<StatusCode> {
    deployment_service::complete_deployment(repo.as_ref(), id, outcome).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Log Endpoints
// =============================================================================

/// GET /api/deployments/{id}/logs
pub async fn get_logs(
    State(repo): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<LogEntry>>> {
    let logs = deployment_service::get_logs(repo.as_ref(), id).await?;
    Ok(Json(logs))
}

/// POST /api/deployments/{id}/logs
pub async fn add_logs(
    State(repo): State<AppState>,
    Path(id): Path<Uuid>,
    Json(entries): Json<Vec<LogEntry>>,
) -> ApiResult<StatusCode> {
    deployment_service::add_logs(repo.as_ref(), id, entries).await?;
    Ok(StatusCode::CREATED)
}
