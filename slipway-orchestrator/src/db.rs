use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

/// Name of the partial unique index that allows one active attempt per
/// (tenant, environment)
pub const ONE_ACTIVE_DEPLOYMENT_INDEX: &str = "deployments_one_active_per_env";

pub const UNIQUE_SUBDOMAIN_CONSTRAINT: &str = "tenants_subdomain_key";

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Create tenants table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tenants (
            id VARCHAR(32) PRIMARY KEY,
            subdomain VARCHAR(63) NOT NULL,
            repository VARCHAR(255) NOT NULL,
            repository_permissions_changed_at TIMESTAMPTZ NOT NULL,
            created_at TIMESTAMPTZ NOT NULL,
            CONSTRAINT tenants_subdomain_key UNIQUE (subdomain)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create deployments table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS deployments (
            id UUID PRIMARY KEY,
            tenant_id VARCHAR(32) NOT NULL REFERENCES tenants(id) ON DELETE CASCADE,
            version VARCHAR(255) NOT NULL,
            environment VARCHAR(20) NOT NULL,
            status VARCHAR(20) NOT NULL,
            requested_at TIMESTAMPTZ NOT NULL,
            started_at TIMESTAMPTZ,
            completed_at TIMESTAMPTZ,
            runner_id VARCHAR(255),
            heartbeat_at TIMESTAMPTZ,
            commit_sha VARCHAR(64),
            url TEXT,
            error_kind VARCHAR(50),
            error_message TEXT,
            rollback_from UUID REFERENCES deployments(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Tables created before runner leases existed
    sqlx::query("ALTER TABLE deployments ADD COLUMN IF NOT EXISTS heartbeat_at TIMESTAMPTZ")
        .execute(pool)
        .await?;

    // At most one non-terminal attempt per (tenant, environment)
    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS deployments_one_active_per_env
        ON deployments(tenant_id, environment)
        WHERE status IN ('pending', 'building', 'deploying')
        "#,
    )
    .execute(pool)
    .await?;

    // Create logs table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS deployment_logs (
            id SERIAL PRIMARY KEY,
            deployment_id UUID NOT NULL REFERENCES deployments(id) ON DELETE CASCADE,
            timestamp TIMESTAMPTZ NOT NULL,
            level VARCHAR(20) NOT NULL,
            message TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes for better query performance
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_deployments_status ON deployments(status)")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_deployments_tenant ON deployments(tenant_id, environment, requested_at DESC)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_deployment_logs_deployment_id ON deployment_logs(deployment_id, timestamp)",
    )
    .execute(pool)
    .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
