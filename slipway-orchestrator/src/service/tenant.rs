//! Tenant Service
//!
//! Business logic for the tenant registry.

use chrono::Utc;
use slipway_core::domain::tenant::{Tenant, generate_tenant_id, validate_repository, validate_subdomain};
use slipway_core::dto::tenant::CreateTenant;

use crate::repository::{Repository, RepositoryError};

/// Service error type
#[derive(Debug)]
pub enum TenantError {
    NotFound(String),
    SubdomainTaken(String),
    ValidationError(String),
    DatabaseError(sqlx::Error),
}

impl From<RepositoryError> for TenantError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::DatabaseError(err) => TenantError::DatabaseError(err),
            RepositoryError::SubdomainTaken => {
                TenantError::SubdomainTaken("subdomain already registered".to_string())
            }
            RepositoryError::ActiveDeploymentExists => {
                TenantError::ValidationError("unexpected deployment conflict".to_string())
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, TenantError>;

/// Register a tenant under a fresh opaque id
pub async fn create_tenant(repo: &dyn Repository, req: CreateTenant) -> Result<Tenant> {
    let subdomain = req.subdomain.trim().to_ascii_lowercase();
    validate_subdomain(&subdomain).map_err(TenantError::ValidationError)?;
    validate_repository(&req.repository).map_err(TenantError::ValidationError)?;

    let now = Utc::now();
    let tenant = Tenant {
        id: generate_tenant_id(),
        subdomain,
        repository: req.repository,
        repository_permissions_changed_at: now,
        created_at: now,
    };

    repo.insert_tenant(&tenant).await.map_err(|e| match e {
        RepositoryError::SubdomainTaken => TenantError::SubdomainTaken(tenant.subdomain.clone()),
        other => other.into(),
    })?;

    tracing::info!("Tenant created: {} ({})", tenant.id, tenant.subdomain);

    Ok(tenant)
}

/// Get a tenant by ID
pub async fn get_tenant(repo: &dyn Repository, id: &str) -> Result<Tenant> {
    repo.find_tenant(id)
        .await?
        .ok_or_else(|| TenantError::NotFound(id.to_string()))
}

/// List all tenants
pub async fn list_tenants(repo: &dyn Repository) -> Result<Vec<Tenant>> {
    Ok(repo.list_tenants().await?)
}

/// Record a repository permission change
///
/// Build monitoring waits out a grace period after this timestamp.
pub async fn touch_repository_permissions(repo: &dyn Repository, id: &str) -> Result<Tenant> {
    if !repo.touch_tenant_permissions(id, Utc::now()).await? {
        return Err(TenantError::NotFound(id.to_string()));
    }

    tracing::info!("Repository permissions changed for tenant {}", id);

    get_tenant(repo, id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryRepository;

    fn request(subdomain: &str) -> CreateTenant {
        CreateTenant {
            subdomain: subdomain.to_string(),
            repository: "acme/site".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_tenant_generates_opaque_id() {
        let repo = InMemoryRepository::new();
        let tenant = create_tenant(&repo, request("Alpha")).await.unwrap();

        assert_eq!(tenant.subdomain, "alpha");
        assert_eq!(tenant.id.len(), 16);
        assert!(tenant.id.bytes().all(|b| b.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn test_create_tenant_rejects_marker_subdomain() {
        let repo = InMemoryRepository::new();
        assert!(matches!(
            create_tenant(&repo, request("shop-preview")).await,
            Err(TenantError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_create_tenant_rejects_duplicate_subdomain() {
        let repo = InMemoryRepository::new();
        create_tenant(&repo, request("alpha")).await.unwrap();
        assert!(matches!(
            create_tenant(&repo, request("alpha")).await,
            Err(TenantError::SubdomainTaken(_))
        ));
    }

    #[tokio::test]
    async fn test_touch_permissions_moves_timestamp() {
        let repo = InMemoryRepository::new();
        let tenant = create_tenant(&repo, request("alpha")).await.unwrap();

        let touched = touch_repository_permissions(&repo, &tenant.id).await.unwrap();
        assert!(touched.repository_permissions_changed_at >= tenant.repository_permissions_changed_at);

        assert!(matches!(
            touch_repository_permissions(&repo, "missing").await,
            Err(TenantError::NotFound(_))
        ));
    }
}
