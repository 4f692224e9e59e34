//! Repository Module
//!
//! Data access layer for the orchestrator. [`Repository`] is the seam the
//! services program against; [`PgRepository`] persists to Postgres through the
//! per-entity query modules and [`InMemoryRepository`] keeps everything in
//! process for development and tests.
//!
//! Both enforce the same rule: at most one non-terminal deployment per
//! (tenant, environment). Postgres does it with a partial unique index, the
//! in-memory store under its lock.

pub mod deployment;
pub mod log;
pub mod memory;
pub mod tenant;

// Re-export for convenience
pub use deployment as deployment_repository;
pub use log as log_repository;
pub use memory::InMemoryRepository;
pub use tenant as tenant_repository;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use slipway_core::domain::deployment::{Deployment, DeploymentStatus};
use slipway_core::domain::log::LogEntry;
use slipway_core::domain::tenant::Tenant;
use slipway_core::dto::deployment::DeploymentQuery;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::{ONE_ACTIVE_DEPLOYMENT_INDEX, UNIQUE_SUBDOMAIN_CONSTRAINT};

/// Repository error type
#[derive(Debug)]
pub enum RepositoryError {
    /// A pending/building/deploying attempt already exists for the pair
    ActiveDeploymentExists,
    SubdomainTaken,
    DatabaseError(sqlx::Error),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        let constraint = err
            .as_database_error()
            .filter(|db| db.is_unique_violation())
            .and_then(|db| db.constraint().map(str::to_string));

        match constraint.as_deref() {
            Some(ONE_ACTIVE_DEPLOYMENT_INDEX) => RepositoryError::ActiveDeploymentExists,
            Some(UNIQUE_SUBDOMAIN_CONSTRAINT) => RepositoryError::SubdomainTaken,
            _ => RepositoryError::DatabaseError(err),
        }
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Storage for tenants, deployments and deployment logs
#[async_trait]
pub trait Repository: Send + Sync {
    async fn insert_tenant(&self, tenant: &Tenant) -> RepositoryResult<()>;

    async fn find_tenant(&self, id: &str) -> RepositoryResult<Option<Tenant>>;

    async fn list_tenants(&self) -> RepositoryResult<Vec<Tenant>>;

    /// Sets `repository_permissions_changed_at`; false if the tenant is unknown
    async fn touch_tenant_permissions(&self, id: &str, at: DateTime<Utc>) -> RepositoryResult<bool>;

    /// Inserts a new attempt
    ///
    /// Fails with [`RepositoryError::ActiveDeploymentExists`] if the pair
    /// already has a non-terminal attempt.
    async fn insert_deployment(&self, deployment: &Deployment) -> RepositoryResult<()>;

    async fn find_deployment(&self, id: Uuid) -> RepositoryResult<Option<Deployment>>;

    /// Newest first
    async fn list_deployments(&self, query: &DeploymentQuery) -> RepositoryResult<Vec<Deployment>>;

    /// Pending attempts, oldest first
    async fn list_pending(&self) -> RepositoryResult<Vec<Deployment>>;

    /// Attempts a runner holds (building or deploying)
    async fn list_claimed(&self) -> RepositoryResult<Vec<Deployment>>;

    /// Writes `deployment` only if the stored status is still `expected`
    ///
    /// Returns false when another writer moved the attempt first.
    async fn update_deployment(
        &self,
        deployment: &Deployment,
        expected: DeploymentStatus,
    ) -> RepositoryResult<bool>;

    async fn append_logs(&self, deployment_id: Uuid, entries: &[LogEntry]) -> RepositoryResult<()>;

    async fn find_logs(&self, deployment_id: Uuid) -> RepositoryResult<Vec<LogEntry>>;
}

/// [`Repository`] backed by Postgres
#[derive(Debug, Clone)]
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository for PgRepository {
    async fn insert_tenant(&self, tenant: &Tenant) -> RepositoryResult<()> {
        Ok(tenant_repository::create(&self.pool, tenant).await?)
    }

    async fn find_tenant(&self, id: &str) -> RepositoryResult<Option<Tenant>> {
        Ok(tenant_repository::find_by_id(&self.pool, id).await?)
    }

    async fn list_tenants(&self) -> RepositoryResult<Vec<Tenant>> {
        Ok(tenant_repository::list_all(&self.pool).await?)
    }

    async fn touch_tenant_permissions(&self, id: &str, at: DateTime<Utc>) -> RepositoryResult<bool> {
        Ok(tenant_repository::update_permissions_changed_at(&self.pool, id, at).await?)
    }

    async fn insert_deployment(&self, deployment: &Deployment) -> RepositoryResult<()> {
        Ok(deployment_repository::create(&self.pool, deployment).await?)
    }

    async fn find_deployment(&self, id: Uuid) -> RepositoryResult<Option<Deployment>> {
        Ok(deployment_repository::find_by_id(&self.pool, id).await?)
    }

    async fn list_deployments(&self, query: &DeploymentQuery) -> RepositoryResult<Vec<Deployment>> {
        Ok(deployment_repository::find_by_query(&self.pool, query).await?)
    }

    async fn list_pending(&self) -> RepositoryResult<Vec<Deployment>> {
        Ok(deployment_repository::find_pending(&self.pool).await?)
    }

    async fn list_claimed(&self) -> RepositoryResult<Vec<Deployment>> {
        Ok(deployment_repository::find_claimed(&self.pool).await?)
    }

    async fn update_deployment(
        &self,
        deployment: &Deployment,
        expected: DeploymentStatus,
    ) -> RepositoryResult<bool> {
        Ok(deployment_repository::update_if_status(&self.pool, deployment, expected).await?)
    }

    async fn append_logs(&self, deployment_id: Uuid, entries: &[LogEntry]) -> RepositoryResult<()> {
        Ok(log_repository::add_entries(&self.pool, deployment_id, entries).await?)
    }

    async fn find_logs(&self, deployment_id: Uuid) -> RepositoryResult<Vec<LogEntry>> {
        Ok(log_repository::find_by_deployment(&self.pool, deployment_id).await?)
    }
}
