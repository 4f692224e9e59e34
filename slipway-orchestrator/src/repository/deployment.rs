//! Deployment Repository
//!
//! Handles all database operations related to deployment attempts.

use chrono::{DateTime, Utc};
use slipway_core::domain::deployment::{
    Deployment, DeploymentFailure, DeploymentStatus, FailureKind,
};
use slipway_core::domain::environment::Environment;
use slipway_core::dto::deployment::DeploymentQuery;
use sqlx::PgPool;
use uuid::Uuid;

const COLUMNS: &str = r#"
    id, tenant_id, version, environment, status, requested_at, started_at,
    completed_at, runner_id, heartbeat_at, commit_sha, url, error_kind, error_message,
    rollback_from
"#;

/// Insert a new deployment attempt
///
/// Violates `deployments_one_active_per_env` if the pair already has an
/// active attempt.
pub async fn create(pool: &PgPool, deployment: &Deployment) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO deployments (id, tenant_id, version, environment, status, requested_at, rollback_from)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(deployment.id)
    .bind(&deployment.tenant_id)
    .bind(&deployment.version)
    .bind(deployment.environment.as_str())
    .bind(deployment.status.as_str())
    .bind(deployment.requested_at)
    .bind(deployment.rollback_from)
    .execute(pool)
    .await?;

    Ok(())
}

/// Find a deployment by ID
pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Deployment>, sqlx::Error> {
    let row = sqlx::query_as::<_, DeploymentRow>(&format!(
        "SELECT {} FROM deployments WHERE id = $1",
        COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.map(Deployment::try_from).transpose()
}

/// Find deployments matching the optional filters, newest first
pub async fn find_by_query(
    pool: &PgPool,
    query: &DeploymentQuery,
) -> Result<Vec<Deployment>, sqlx::Error> {
    let rows = sqlx::query_as::<_, DeploymentRow>(&format!(
        r#"
        SELECT {}
        FROM deployments
        WHERE ($1::text IS NULL OR tenant_id = $1)
          AND ($2::text IS NULL OR environment = $2)
          AND ($3::text IS NULL OR status = $3)
        ORDER BY requested_at DESC
        "#,
        COLUMNS
    ))
    .bind(query.tenant_id.as_deref())
    .bind(query.environment.map(|e| e.as_str()))
    .bind(query.status.map(|s| s.as_str()))
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(Deployment::try_from).collect()
}

/// Find pending deployments, oldest first
pub async fn find_pending(pool: &PgPool) -> Result<Vec<Deployment>, sqlx::Error> {
    let rows = sqlx::query_as::<_, DeploymentRow>(&format!(
        "SELECT {} FROM deployments WHERE status = 'pending' ORDER BY requested_at ASC",
        COLUMNS
    ))
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(Deployment::try_from).collect()
}

/// Find deployments a runner holds, oldest claim first
pub async fn find_claimed(pool: &PgPool) -> Result<Vec<Deployment>, sqlx::Error> {
    let rows = sqlx::query_as::<_, DeploymentRow>(&format!(
        r#"
        SELECT {}
        FROM deployments
        WHERE status IN ('building', 'deploying')
        ORDER BY started_at ASC
        "#,
        COLUMNS
    ))
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(Deployment::try_from).collect()
}

/// Write every mutable column, guarded by the expected current status
pub async fn update_if_status(
    pool: &PgPool,
    deployment: &Deployment,
    expected: DeploymentStatus,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE deployments
        SET status = $1, started_at = $2, completed_at = $3, runner_id = $4,
            heartbeat_at = $5, commit_sha = $6, url = $7, error_kind = $8, error_message = $9
        WHERE id = $10 AND status = $11
        "#,
    )
    .bind(deployment.status.as_str())
    .bind(deployment.started_at)
    .bind(deployment.completed_at)
    .bind(&deployment.runner_id)
    .bind(deployment.heartbeat_at)
    .bind(&deployment.commit_sha)
    .bind(&deployment.url)
    .bind(deployment.error.as_ref().map(|e| e.kind.as_str()))
    .bind(deployment.error.as_ref().map(|e| e.message.as_str()))
    .bind(deployment.id)
    .bind(expected.as_str())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct DeploymentRow {
    id: Uuid,
    tenant_id: String,
    version: String,
    environment: String,
    status: String,
    requested_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    runner_id: Option<String>,
    heartbeat_at: Option<DateTime<Utc>>,
    commit_sha: Option<String>,
    url: Option<String>,
    error_kind: Option<String>,
    error_message: Option<String>,
    rollback_from: Option<Uuid>,
}

impl TryFrom<DeploymentRow> for Deployment {
    type Error = sqlx::Error;

    fn try_from(row: DeploymentRow) -> Result<Self, Self::Error> {
        let environment = row
            .environment
            .parse::<Environment>()
            .map_err(|e| sqlx::Error::Decode(e.into()))?;
        let status = DeploymentStatus::parse(&row.status).ok_or_else(|| {
            sqlx::Error::Decode(format!("unknown deployment status: {}", row.status).into())
        })?;

        let error = match (row.error_kind, row.error_message) {
            (Some(kind), Some(message)) => Some(DeploymentFailure {
                kind: FailureKind::parse(&kind).unwrap_or(FailureKind::Internal),
                message,
            }),
            _ => None,
        };

        Ok(Deployment {
            id: row.id,
            tenant_id: row.tenant_id,
            version: row.version,
            environment,
            status,
            requested_at: row.requested_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            runner_id: row.runner_id,
            heartbeat_at: row.heartbeat_at,
            commit_sha: row.commit_sha,
            url: row.url,
            error,
            rollback_from: row.rollback_from,
        })
    }
}
