//! Tenant Repository
//!
//! Handles all database operations related to tenants.

use chrono::{DateTime, Utc};
use slipway_core::domain::tenant::Tenant;
use sqlx::PgPool;

/// Insert a new tenant
pub async fn create(pool: &PgPool, tenant: &Tenant) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO tenants (id, subdomain, repository, repository_permissions_changed_at, created_at)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(&tenant.id)
    .bind(&tenant.subdomain)
    .bind(&tenant.repository)
    .bind(tenant.repository_permissions_changed_at)
    .bind(tenant.created_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Find a tenant by ID
pub async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Tenant>, sqlx::Error> {
    let row = sqlx::query_as::<_, TenantRow>(
        r#"
        SELECT id, subdomain, repository, repository_permissions_changed_at, created_at
        FROM tenants
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.into()))
}

/// List all tenants
pub async fn list_all(pool: &PgPool) -> Result<Vec<Tenant>, sqlx::Error> {
    let rows = sqlx::query_as::<_, TenantRow>(
        r#"
        SELECT id, subdomain, repository, repository_permissions_changed_at, created_at
        FROM tenants
        ORDER BY created_at DESC
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

/// Record a repository permission change
pub async fn update_permissions_changed_at(
    pool: &PgPool,
    id: &str,
    at: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE tenants
        SET repository_permissions_changed_at = $1
        WHERE id = $2
        "#,
    )
    .bind(at)
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct TenantRow {
    id: String,
    subdomain: String,
    repository: String,
    repository_permissions_changed_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl From<TenantRow> for Tenant {
    fn from(row: TenantRow) -> Self {
        Tenant {
            id: row.id,
            subdomain: row.subdomain,
            repository: row.repository,
            repository_permissions_changed_at: row.repository_permissions_changed_at,
            created_at: row.created_at,
        }
    }
}
