//! In-memory repository
//!
//! Used when no database is configured, and by the service and API tests.
//! One lock guards all state, so the active-attempt check and the insert are a
//! single step just like the partial unique index makes them in Postgres.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use slipway_core::domain::deployment::{Deployment, DeploymentStatus};
use slipway_core::domain::log::LogEntry;
use slipway_core::domain::tenant::Tenant;
use slipway_core::dto::deployment::DeploymentQuery;
use uuid::Uuid;

use super::{Repository, RepositoryError, RepositoryResult};

#[derive(Debug, Default)]
struct State {
    tenants: HashMap<String, Tenant>,
    deployments: HashMap<Uuid, Deployment>,
    logs: HashMap<Uuid, Vec<LogEntry>>,
}

#[derive(Debug, Default)]
pub struct InMemoryRepository {
    state: RwLock<State>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, State> {
        // A panic while holding the lock leaves plain data behind; keep serving it
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn matches_query(deployment: &Deployment, query: &DeploymentQuery) -> bool {
    query
        .tenant_id
        .as_ref()
        .is_none_or(|id| &deployment.tenant_id == id)
        && query.environment.is_none_or(|env| deployment.environment == env)
        && query.status.is_none_or(|status| deployment.status == status)
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn insert_tenant(&self, tenant: &Tenant) -> RepositoryResult<()> {
        let mut state = self.write();
        if state.tenants.values().any(|t| t.subdomain == tenant.subdomain) {
            return Err(RepositoryError::SubdomainTaken);
        }
        state.tenants.insert(tenant.id.clone(), tenant.clone());
        Ok(())
    }

    async fn find_tenant(&self, id: &str) -> RepositoryResult<Option<Tenant>> {
        Ok(self.read().tenants.get(id).cloned())
    }

    async fn list_tenants(&self) -> RepositoryResult<Vec<Tenant>> {
        let mut tenants: Vec<Tenant> = self.read().tenants.values().cloned().collect();
        tenants.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tenants)
    }

    async fn touch_tenant_permissions(&self, id: &str, at: DateTime<Utc>) -> RepositoryResult<bool> {
        let mut state = self.write();
        match state.tenants.get_mut(id) {
            Some(tenant) => {
                tenant.repository_permissions_changed_at = at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn insert_deployment(&self, deployment: &Deployment) -> RepositoryResult<()> {
        let mut state = self.write();

        let active_exists = !deployment.status.is_terminal()
            && state.deployments.values().any(|d| {
                d.tenant_id == deployment.tenant_id
                    && d.environment == deployment.environment
                    && !d.status.is_terminal()
            });
        if active_exists {
            return Err(RepositoryError::ActiveDeploymentExists);
        }

        state.deployments.insert(deployment.id, deployment.clone());
        Ok(())
    }

    async fn find_deployment(&self, id: Uuid) -> RepositoryResult<Option<Deployment>> {
        Ok(self.read().deployments.get(&id).cloned())
    }

    async fn list_deployments(&self, query: &DeploymentQuery) -> RepositoryResult<Vec<Deployment>> {
        let mut deployments: Vec<Deployment> = self
            .read()
            .deployments
            .values()
            .filter(|d| matches_query(d, query))
            .cloned()
            .collect();
        deployments.sort_by(|a, b| b.requested_at.cmp(&a.requested_at));
        Ok(deployments)
    }

    async fn list_pending(&self) -> RepositoryResult<Vec<Deployment>> {
        let mut pending: Vec<Deployment> = self
            .read()
            .deployments
            .values()
            .filter(|d| d.status == DeploymentStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|d| d.requested_at);
        Ok(pending)
    }

    async fn list_claimed(&self) -> RepositoryResult<Vec<Deployment>> {
        let mut claimed: Vec<Deployment> = self
            .read()
            .deployments
            .values()
            .filter(|d| d.is_claimed())
            .cloned()
            .collect();
        claimed.sort_by_key(|d| d.started_at);
        Ok(claimed)
    }

    async fn update_deployment(
        &self,
        deployment: &Deployment,
        expected: DeploymentStatus,
    ) -> RepositoryResult<bool> {
        let mut state = self.write();
        match state.deployments.get_mut(&deployment.id) {
            Some(stored) if stored.status == expected => {
                *stored = deployment.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn append_logs(&self, deployment_id: Uuid, entries: &[LogEntry]) -> RepositoryResult<()> {
        self.write()
            .logs
            .entry(deployment_id)
            .or_default()
            .extend_from_slice(entries);
        Ok(())
    }

    async fn find_logs(&self, deployment_id: Uuid) -> RepositoryResult<Vec<LogEntry>> {
        Ok(self.read().logs.get(&deployment_id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slipway_core::domain::environment::Environment;

    #[tokio::test]
    async fn test_second_active_attempt_is_rejected() {
        let repo = InMemoryRepository::new();
        let first = Deployment::new("t1", "v1", Environment::Preview, None);
        repo.insert_deployment(&first).await.unwrap();

        let second = Deployment::new("t1", "v2", Environment::Preview, None);
        assert!(matches!(
            repo.insert_deployment(&second).await,
            Err(RepositoryError::ActiveDeploymentExists)
        ));

        // other environment of the same tenant is independent
        let staging = Deployment::new("t1", "v2", Environment::Staging, None);
        assert!(repo.insert_deployment(&staging).await.is_ok());
    }

    #[tokio::test]
    async fn test_update_is_guarded_by_expected_status() {
        let repo = InMemoryRepository::new();
        let mut deployment = Deployment::new("t1", "v1", Environment::Production, None);
        repo.insert_deployment(&deployment).await.unwrap();

        deployment.mark_building("runner-a").unwrap();
        assert!(repo
            .update_deployment(&deployment, DeploymentStatus::Pending)
            .await
            .unwrap());

        // a second claim from a stale read loses
        assert!(!repo
            .update_deployment(&deployment, DeploymentStatus::Pending)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_query_filters() {
        let repo = InMemoryRepository::new();
        repo.insert_deployment(&Deployment::new("t1", "v1", Environment::Preview, None))
            .await
            .unwrap();
        repo.insert_deployment(&Deployment::new("t2", "v1", Environment::Preview, None))
            .await
            .unwrap();

        let query = DeploymentQuery {
            tenant_id: Some("t1".to_string()),
            ..Default::default()
        };
        let found = repo.list_deployments(&query).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].tenant_id, "t1");
        assert_eq!(repo.list_pending().await.unwrap().len(), 2);
        assert!(repo.list_claimed().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_claimed_lists_building_and_deploying() {
        let repo = InMemoryRepository::new();
        let mut building = Deployment::new("t1", "v1", Environment::Preview, None);
        let mut deploying = Deployment::new("t2", "v1", Environment::Preview, None);
        let pending = Deployment::new("t3", "v1", Environment::Preview, None);
        for d in [&building, &deploying, &pending] {
            repo.insert_deployment(d).await.unwrap();
        }

        building.mark_building("runner-a").unwrap();
        repo.update_deployment(&building, DeploymentStatus::Pending)
            .await
            .unwrap();
        deploying.mark_building("runner-b").unwrap();
        deploying.mark_deploying().unwrap();
        repo.update_deployment(&deploying, DeploymentStatus::Pending)
            .await
            .unwrap();

        let claimed: Vec<Uuid> = repo
            .list_claimed()
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(claimed.len(), 2);
        assert!(claimed.contains(&building.id));
        assert!(claimed.contains(&deploying.id));
    }
}
