//! Deployment Service
//!
//! Business logic for the deployment state tracker: starting attempts,
//! runner-driven transitions, runner leases, cancellation, rollback and logs.
//!
//! Every transition is read-modify-write guarded by the status that was read,
//! so a runner finishing an attempt and an operator cancelling it can never
//! both win.

use chrono::Utc;
use slipway_core::domain::deployment::{
    Deployment, DeploymentFailure, DeploymentStatus, FailureKind, TransitionError,
};
use slipway_core::domain::environment::Environment;
use slipway_core::domain::log::{LogEntry, LogLevel};
use slipway_core::dto::deployment::{
    CompleteDeployment, CreateDeployment, DeploymentExecutionInfo, DeploymentQuery,
    RollbackEligibility,
};
use uuid::Uuid;

use crate::repository::{Repository, RepositoryError};

/// Service error type
#[derive(Debug)]
pub enum DeploymentError {
    NotFound(Uuid),
    TenantNotFound(String),
    /// Another attempt for the same (tenant, environment) has not finished
    AlreadyInProgress {
        tenant_id: String,
        environment: Environment,
    },
    InvalidState(String),
    ValidationError(String),
    DatabaseError(sqlx::Error),
}

impl From<TransitionError> for DeploymentError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::InvalidTransition { .. } | TransitionError::NotClaimed(_) => {
                DeploymentError::InvalidState(err.to_string())
            }
            TransitionError::MissingUrl | TransitionError::MissingReason => {
                DeploymentError::ValidationError(err.to_string())
            }
        }
    }
}

impl From<RepositoryError> for DeploymentError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::DatabaseError(err) => DeploymentError::DatabaseError(err),
            RepositoryError::ActiveDeploymentExists => {
                DeploymentError::InvalidState("deployment already in progress".to_string())
            }
            RepositoryError::SubdomainTaken => {
                DeploymentError::ValidationError("unexpected tenant conflict".to_string())
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, DeploymentError>;

// =============================================================================
// Starting attempts
// =============================================================================

/// Start a deployment attempt
///
/// Fails fast with [`DeploymentError::AlreadyInProgress`] when the pair
/// already has a pending, building or deploying attempt.
pub async fn create_deployment(repo: &dyn Repository, req: CreateDeployment) -> Result<Deployment> {
    let version = req.version.trim();
    if version.is_empty() {
        return Err(DeploymentError::ValidationError(
            "Version cannot be empty".to_string(),
        ));
    }

    repo.find_tenant(&req.tenant_id)
        .await?
        .ok_or_else(|| DeploymentError::TenantNotFound(req.tenant_id.clone()))?;

    let deployment = Deployment::new(&req.tenant_id, version, req.environment, None);
    insert_new(repo, deployment).await
}

async fn insert_new(repo: &dyn Repository, deployment: Deployment) -> Result<Deployment> {
    match repo.insert_deployment(&deployment).await {
        Ok(()) => {}
        Err(RepositoryError::ActiveDeploymentExists) => {
            // A policy outcome, not a failure
            tracing::info!(
                "Deployment for {} ({}) already in progress",
                deployment.tenant_id,
                deployment.environment
            );
            return Err(DeploymentError::AlreadyInProgress {
                tenant_id: deployment.tenant_id,
                environment: deployment.environment,
            });
        }
        Err(err) => return Err(err.into()),
    }

    repo.append_logs(
        deployment.id,
        &[LogEntry::now(
            LogLevel::Info,
            format!(
                "Deployment of {} to {} requested",
                deployment.version, deployment.environment
            ),
        )],
    )
    .await?;

    tracing::info!(
        "Deployment created: {} for tenant {} ({} {})",
        deployment.id,
        deployment.tenant_id,
        deployment.environment,
        deployment.version
    );

    Ok(deployment)
}

// =============================================================================
// Queries
// =============================================================================

/// Get a deployment by ID
pub async fn get_deployment(repo: &dyn Repository, id: Uuid) -> Result<Deployment> {
    repo.find_deployment(id)
        .await?
        .ok_or(DeploymentError::NotFound(id))
}

/// List deployments matching the filters, newest first
pub async fn list_deployments(repo: &dyn Repository, query: &DeploymentQuery) -> Result<Vec<Deployment>> {
    Ok(repo.list_deployments(query).await?)
}

/// List deployments waiting for a runner
pub async fn list_pending(repo: &dyn Repository) -> Result<Vec<Deployment>> {
    Ok(repo.list_pending().await?)
}

// =============================================================================
// Runner-driven transitions
// =============================================================================

/// Persist a transition computed from a read at status `expected`
async fn save(repo: &dyn Repository, deployment: &Deployment, expected: DeploymentStatus) -> Result<()> {
    if repo.update_deployment(deployment, expected).await? {
        return Ok(());
    }

    let current = get_deployment(repo, deployment.id).await?;
    Err(DeploymentError::InvalidState(format!(
        "Deployment {} changed concurrently (now {})",
        deployment.id, current.status
    )))
}

/// Claim a pending deployment for a runner (pending -> building)
pub async fn claim_deployment(
    repo: &dyn Repository,
    id: Uuid,
    runner_id: &str,
) -> Result<DeploymentExecutionInfo> {
    if runner_id.trim().is_empty() {
        return Err(DeploymentError::ValidationError(
            "Runner ID cannot be empty".to_string(),
        ));
    }

    let mut deployment = get_deployment(repo, id).await?;
    let tenant = repo
        .find_tenant(&deployment.tenant_id)
        .await?
        .ok_or_else(|| DeploymentError::TenantNotFound(deployment.tenant_id.clone()))?;

    let entry = deployment.mark_building(runner_id)?;
    save(repo, &deployment, DeploymentStatus::Pending).await?;
    repo.append_logs(id, &[entry]).await?;

    tracing::info!("Deployment {} claimed by runner {}", id, runner_id);

    Ok(DeploymentExecutionInfo { deployment, tenant })
}

/// Record the commit produced by source synchronization
pub async fn record_commit(repo: &dyn Repository, id: Uuid, commit_sha: &str) -> Result<()> {
    if commit_sha.trim().is_empty() {
        return Err(DeploymentError::ValidationError(
            "Commit SHA cannot be empty".to_string(),
        ));
    }

    let mut deployment = get_deployment(repo, id).await?;
    if deployment.status != DeploymentStatus::Building {
        return Err(DeploymentError::InvalidState(format!(
            "Deployment {} is {}, commits are recorded while building",
            id, deployment.status
        )));
    }

    deployment.commit_sha = Some(commit_sha.to_string());
    save(repo, &deployment, DeploymentStatus::Building).await?;

    tracing::debug!("Deployment {} synchronized as commit {}", id, commit_sha);
    Ok(())
}

/// building -> deploying
pub async fn mark_deploying(repo: &dyn Repository, id: Uuid) -> Result<()> {
    let mut deployment = get_deployment(repo, id).await?;
    deployment.mark_deploying()?;
    save(repo, &deployment, DeploymentStatus::Building).await?;

    repo.append_logs(id, &[LogEntry::now(LogLevel::Info, "Build succeeded, publishing")])
        .await?;
    Ok(())
}

/// Finish a deployment with its outcome
pub async fn complete_deployment(
    repo: &dyn Repository,
    id: Uuid,
    outcome: CompleteDeployment,
) -> Result<Deployment> {
    let mut deployment = get_deployment(repo, id).await?;
    let expected = deployment.status;

    let entry = match outcome {
        CompleteDeployment::Success { url } => {
            deployment.mark_success(url.clone())?;
            LogEntry::now(LogLevel::Info, format!("Deployed to {}", url))
        }
        CompleteDeployment::Failed { failure } => {
            let message = format!("Deployment failed: {}", failure);
            deployment.mark_failed(failure)?;
            LogEntry::now(LogLevel::Error, message)
        }
    };

    save(repo, &deployment, expected).await?;
    repo.append_logs(id, &[entry]).await?;

    match &deployment.error {
        Some(failure) => tracing::warn!("Deployment {} failed: {}", id, failure),
        None => tracing::info!("Deployment {} succeeded", id),
    }

    Ok(deployment)
}

// =============================================================================
// Runner leases
// =============================================================================

/// Renew the lease of the runner holding the attempt
///
/// Returns the attempt as stored, so the runner also learns when it was
/// cancelled or failed behind its back. Attempts no runner holds are returned
/// untouched.
pub async fn heartbeat(repo: &dyn Repository, id: Uuid) -> Result<Deployment> {
    let mut deployment = get_deployment(repo, id).await?;
    if !deployment.is_claimed() {
        return Ok(deployment);
    }

    let expected = deployment.status;
    deployment.heartbeat(Utc::now())?;
    if !repo.update_deployment(&deployment, expected).await? {
        // Moved on between read and write; report what is stored now
        return get_deployment(repo, id).await;
    }

    Ok(deployment)
}

/// Fail every claimed attempt whose runner has been silent for `timeout`
///
/// Frees the (tenant, environment) pair of a runner that crashed or lost its
/// final report. Returns the attempts that were failed.
pub async fn expire_stale_leases(repo: &dyn Repository, timeout: chrono::Duration) -> Result<Vec<Uuid>> {
    let now = Utc::now();
    let mut expired = Vec::new();

    for mut deployment in repo.list_claimed().await? {
        if !deployment.lease_expired(now, timeout) {
            continue;
        }

        let expected = deployment.status;
        let message = format!(
            "Runner {} stopped reporting; no heartbeat for {}s",
            deployment.runner_id.as_deref().unwrap_or("unknown"),
            timeout.num_seconds()
        );
        deployment.mark_failed(DeploymentFailure::new(FailureKind::Timeout, message.clone()))?;

        if !repo.update_deployment(&deployment, expected).await? {
            tracing::debug!("Deployment {} changed while expiring its lease", deployment.id);
            continue;
        }
        repo.append_logs(deployment.id, &[LogEntry::now(LogLevel::Error, message)])
            .await?;

        tracing::warn!(
            "Deployment {} ({} {}) failed: runner lease expired",
            deployment.id,
            deployment.tenant_id,
            deployment.environment
        );
        expired.push(deployment.id);
    }

    Ok(expired)
}

/// Cancel a pending or building deployment
pub async fn cancel_deployment(repo: &dyn Repository, id: Uuid) -> Result<Deployment> {
    let mut deployment = get_deployment(repo, id).await?;
    let expected = deployment.status;

    deployment.mark_cancelled()?;
    save(repo, &deployment, expected).await?;
    repo.append_logs(id, &[LogEntry::now(LogLevel::Warning, "Deployment cancelled")])
        .await?;

    tracing::info!("Deployment {} cancelled", id);
    Ok(deployment)
}

// =============================================================================
// Rollback
// =============================================================================

async fn tenant_history(repo: &dyn Repository, deployment: &Deployment) -> Result<Vec<Deployment>> {
    Ok(repo
        .list_deployments(&DeploymentQuery {
            tenant_id: Some(deployment.tenant_id.clone()),
            environment: Some(Environment::Production),
            status: None,
        })
        .await?)
}

/// Whether a deployment can be rolled back, and to which attempt
pub async fn rollback_eligibility(repo: &dyn Repository, id: Uuid) -> Result<RollbackEligibility> {
    let deployment = get_deployment(repo, id).await?;
    let history = tenant_history(repo, &deployment).await?;
    let target = deployment.rollback_target(&history).cloned();

    Ok(RollbackEligibility {
        can_rollback: target.is_some(),
        target,
    })
}

/// Start a production attempt that redeploys the previous successful version
pub async fn rollback_deployment(repo: &dyn Repository, id: Uuid) -> Result<Deployment> {
    let deployment = get_deployment(repo, id).await?;
    let history = tenant_history(repo, &deployment).await?;

    let target = deployment.rollback_target(&history).ok_or_else(|| {
        DeploymentError::InvalidState(format!("Deployment {} cannot be rolled back", id))
    })?;

    tracing::info!(
        "Rolling back {} from {} to {}",
        deployment.tenant_id,
        deployment.version,
        target.version
    );

    let rollback = Deployment::new(
        &deployment.tenant_id,
        &target.version,
        Environment::Production,
        Some(deployment.id),
    );
    insert_new(repo, rollback).await
}

// =============================================================================
// Logs
// =============================================================================

/// Get all log entries for a deployment
pub async fn get_logs(repo: &dyn Repository, id: Uuid) -> Result<Vec<LogEntry>> {
    get_deployment(repo, id).await?;
    Ok(repo.find_logs(id).await?)
}

/// Add log entries to a deployment
pub async fn add_logs(repo: &dyn Repository, id: Uuid, entries: Vec<LogEntry>) -> Result<()> {
    if entries.iter().any(|e| e.message.is_empty()) {
        return Err(DeploymentError::ValidationError(
            "Log message cannot be empty".to_string(),
        ));
    }
    if entries.is_empty() {
        return Ok(());
    }

    get_deployment(repo, id).await?;
    repo.append_logs(id, &entries).await?;

    tracing::debug!("Added {} log entries for deployment: {}", entries.len(), id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryRepository;
    use crate::service::tenant_service;
    use slipway_core::dto::tenant::CreateTenant;

    async fn setup() -> (InMemoryRepository, String) {
        let repo = InMemoryRepository::new();
        let tenant = tenant_service::create_tenant(
            &repo,
            CreateTenant {
                subdomain: "alpha".to_string(),
                repository: "acme/alpha".to_string(),
            },
        )
        .await
        .unwrap();
        (repo, tenant.id)
    }

    fn request(tenant_id: &str, version: &str, environment: Environment) -> CreateDeployment {
        CreateDeployment {
            tenant_id: tenant_id.to_string(),
            version: version.to_string(),
            environment,
        }
    }

    async fn deploy_successfully(repo: &InMemoryRepository, tenant_id: &str, version: &str) -> Deployment {
        let d = create_deployment(repo, request(tenant_id, version, Environment::Production))
            .await
            .unwrap();
        claim_deployment(repo, d.id, "runner-1").await.unwrap();
        record_commit(repo, d.id, "abc123").await.unwrap();
        mark_deploying(repo, d.id).await.unwrap();
        complete_deployment(
            repo,
            d.id,
            CompleteDeployment::Success {
                url: "https://alpha.apps.example.com".to_string(),
            },
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_second_attempt_while_pending_is_already_in_progress() {
        let (repo, tenant_id) = setup().await;
        create_deployment(&repo, request(&tenant_id, "v1", Environment::Preview))
            .await
            .unwrap();

        let second = create_deployment(&repo, request(&tenant_id, "v2", Environment::Preview)).await;
        assert!(matches!(second, Err(DeploymentError::AlreadyInProgress { .. })));

        let active = repo
            .list_deployments(&DeploymentQuery {
                tenant_id: Some(tenant_id.clone()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(active.iter().filter(|d| !d.status.is_terminal()).count(), 1);
    }

    #[tokio::test]
    async fn test_second_attempt_while_building_is_already_in_progress() {
        let (repo, tenant_id) = setup().await;
        let first = create_deployment(&repo, request(&tenant_id, "v1", Environment::Staging))
            .await
            .unwrap();
        claim_deployment(&repo, first.id, "runner-1").await.unwrap();

        let second = create_deployment(&repo, request(&tenant_id, "v2", Environment::Staging)).await;
        assert!(matches!(second, Err(DeploymentError::AlreadyInProgress { .. })));
    }

    #[tokio::test]
    async fn test_new_attempt_allowed_after_terminal() {
        let (repo, tenant_id) = setup().await;
        deploy_successfully(&repo, &tenant_id, "v1").await;

        assert!(
            create_deployment(&repo, request(&tenant_id, "v2", Environment::Production))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_unknown_tenant() {
        let repo = InMemoryRepository::new();
        assert!(matches!(
            create_deployment(&repo, request("nope", "v1", Environment::Preview)).await,
            Err(DeploymentError::TenantNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_claim_appends_log_and_only_once() {
        let (repo, tenant_id) = setup().await;
        let d = create_deployment(&repo, request(&tenant_id, "v1", Environment::Preview))
            .await
            .unwrap();

        let info = claim_deployment(&repo, d.id, "runner-1").await.unwrap();
        assert_eq!(info.deployment.status, DeploymentStatus::Building);
        assert_eq!(info.tenant.subdomain, "alpha");

        let logs = get_logs(&repo, d.id).await.unwrap();
        assert!(logs.iter().any(|l| l.message.contains("runner-1")));

        assert!(matches!(
            claim_deployment(&repo, d.id, "runner-2").await,
            Err(DeploymentError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_success_requires_url() {
        let (repo, tenant_id) = setup().await;
        let d = create_deployment(&repo, request(&tenant_id, "v1", Environment::Preview))
            .await
            .unwrap();
        claim_deployment(&repo, d.id, "runner-1").await.unwrap();
        mark_deploying(&repo, d.id).await.unwrap();

        let result = complete_deployment(
            &repo,
            d.id,
            CompleteDeployment::Success { url: "  ".to_string() },
        )
        .await;
        assert!(matches!(result, Err(DeploymentError::ValidationError(_))));
        assert_eq!(
            get_deployment(&repo, d.id).await.unwrap().status,
            DeploymentStatus::Deploying
        );
    }

    #[tokio::test]
    async fn test_failure_is_terminal_with_reason() {
        let (repo, tenant_id) = setup().await;
        let d = create_deployment(&repo, request(&tenant_id, "v1", Environment::Preview))
            .await
            .unwrap();
        claim_deployment(&repo, d.id, "runner-1").await.unwrap();

        let failed = complete_deployment(
            &repo,
            d.id,
            CompleteDeployment::Failed {
                failure: DeploymentFailure::new(FailureKind::SyncConflict, "branch kept moving"),
            },
        )
        .await
        .unwrap();
        assert_eq!(failed.status, DeploymentStatus::Failed);
        assert_eq!(failed.error.unwrap().kind, FailureKind::SyncConflict);

        assert!(cancel_deployment(&repo, d.id).await.is_err());
    }

    #[tokio::test]
    async fn test_cancel_only_from_pending_or_building() {
        let (repo, tenant_id) = setup().await;
        let d = create_deployment(&repo, request(&tenant_id, "v1", Environment::Preview))
            .await
            .unwrap();
        claim_deployment(&repo, d.id, "runner-1").await.unwrap();
        mark_deploying(&repo, d.id).await.unwrap();

        assert!(matches!(
            cancel_deployment(&repo, d.id).await,
            Err(DeploymentError::InvalidState(_))
        ));

        let other = create_deployment(&repo, request(&tenant_id, "v1", Environment::Staging))
            .await
            .unwrap();
        let cancelled = cancel_deployment(&repo, other.id).await.unwrap();
        assert_eq!(cancelled.status, DeploymentStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_heartbeat_keeps_lease_alive() {
        let (repo, tenant_id) = setup().await;
        let d = create_deployment(&repo, request(&tenant_id, "v1", Environment::Staging))
            .await
            .unwrap();

        // unclaimed attempts are reported, not renewed
        let pending = heartbeat(&repo, d.id).await.unwrap();
        assert_eq!(pending.status, DeploymentStatus::Pending);
        assert!(pending.heartbeat_at.is_none());

        let claimed = claim_deployment(&repo, d.id, "runner-1").await.unwrap().deployment;
        let renewed = heartbeat(&repo, d.id).await.unwrap();
        assert!(renewed.heartbeat_at >= claimed.heartbeat_at);

        let expired = expire_stale_leases(&repo, chrono::Duration::minutes(5))
            .await
            .unwrap();
        assert!(expired.is_empty());
        assert_eq!(
            get_deployment(&repo, d.id).await.unwrap().status,
            DeploymentStatus::Building
        );
    }

    #[tokio::test]
    async fn test_stale_lease_frees_the_pair() {
        let (repo, tenant_id) = setup().await;
        let d = create_deployment(&repo, request(&tenant_id, "v1", Environment::Production))
            .await
            .unwrap();
        claim_deployment(&repo, d.id, "runner-1").await.unwrap();
        mark_deploying(&repo, d.id).await.unwrap();

        // The runner went away without reporting
        let mut stale = get_deployment(&repo, d.id).await.unwrap();
        stale.heartbeat_at = Some(Utc::now() - chrono::Duration::minutes(30));
        repo.update_deployment(&stale, DeploymentStatus::Deploying)
            .await
            .unwrap();

        assert!(matches!(
            create_deployment(&repo, request(&tenant_id, "v2", Environment::Production)).await,
            Err(DeploymentError::AlreadyInProgress { .. })
        ));

        let expired = expire_stale_leases(&repo, chrono::Duration::minutes(5))
            .await
            .unwrap();
        assert_eq!(expired, vec![d.id]);

        let failed = get_deployment(&repo, d.id).await.unwrap();
        assert_eq!(failed.status, DeploymentStatus::Failed);
        let failure = failed.error.unwrap();
        assert_eq!(failure.kind, FailureKind::Timeout);
        assert!(failure.message.contains("runner-1"));

        let logs = get_logs(&repo, d.id).await.unwrap();
        assert!(logs.iter().any(|l| l.message.contains("no heartbeat")));

        // The late report of the lost runner is refused
        assert!(matches!(
            complete_deployment(
                &repo,
                d.id,
                CompleteDeployment::Success {
                    url: "https://alpha.apps.example.com".to_string(),
                },
            )
            .await,
            Err(DeploymentError::InvalidState(_))
        ));

        // A runner asking about the attempt learns it is over
        assert_eq!(
            heartbeat(&repo, d.id).await.unwrap().status,
            DeploymentStatus::Failed
        );

        assert!(
            create_deployment(&repo, request(&tenant_id, "v2", Environment::Production))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_rollback_flow() {
        let (repo, tenant_id) = setup().await;
        let v1 = deploy_successfully(&repo, &tenant_id, "v1").await;
        let v2 = deploy_successfully(&repo, &tenant_id, "v2").await;

        // first attempt has nothing earlier to go back to
        assert!(!rollback_eligibility(&repo, v1.id).await.unwrap().can_rollback);

        let eligibility = rollback_eligibility(&repo, v2.id).await.unwrap();
        assert!(eligibility.can_rollback);
        assert_eq!(eligibility.target.unwrap().id, v1.id);

        let rollback = rollback_deployment(&repo, v2.id).await.unwrap();
        assert_eq!(rollback.version, "v1");
        assert_eq!(rollback.rollback_from, Some(v2.id));
        assert_eq!(rollback.status, DeploymentStatus::Pending);

        // a rollback already points at v2
        assert!(!rollback_eligibility(&repo, v2.id).await.unwrap().can_rollback);
    }

    #[tokio::test]
    async fn test_add_logs_validation() {
        let (repo, tenant_id) = setup().await;
        let d = create_deployment(&repo, request(&tenant_id, "v1", Environment::Preview))
            .await
            .unwrap();

        let bad = vec![LogEntry::now(LogLevel::Info, "")];
        assert!(matches!(
            add_logs(&repo, d.id, bad).await,
            Err(DeploymentError::ValidationError(_))
        ));

        add_logs(&repo, d.id, vec![LogEntry::now(LogLevel::Info, "synced")])
            .await
            .unwrap();
        assert_eq!(get_logs(&repo, d.id).await.unwrap().len(), 2);
    }
}
