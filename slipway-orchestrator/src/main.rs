use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api::AppState;
use crate::config::Config;
use crate::repository::{InMemoryRepository, PgRepository};

pub mod api;
pub mod config;
pub mod db;
pub mod repository;
pub mod service;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "slipway_orchestrator=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Slipway Orchestrator...");

    let config = Config::from_env();
    config.validate().expect("Invalid configuration");

    let repo: AppState = match &config.database_url {
        Some(database_url) => {
            tracing::info!("Connecting to database...");

            // Create database connection pool
            let pool = db::create_pool(database_url)
                .await
                .expect("Failed to create database pool");

            tracing::info!("Database connection pool created");

            // Run migrations
            db::run_migrations(&pool)
                .await
                .expect("Failed to run database migrations");

            Arc::new(PgRepository::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; deployment state is kept in memory only");
            Arc::new(InMemoryRepository::new())
        }
    };

    let lease_timeout =
        chrono::Duration::from_std(config.lease_timeout).expect("LEASE_TIMEOUT_SECS out of range");
    spawn_lease_sweeper(repo.clone(), lease_timeout, config.lease_sweep_interval);

    // Build router with all API endpoints
    let app = api::create_router(repo);

    tracing::info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}

/// Periodically fails claimed attempts whose runner stopped heartbeating
fn spawn_lease_sweeper(
    repo: AppState,
    timeout: chrono::Duration,
    every: std::time::Duration,
) -> tokio::task::JoinHandle<()> {
    tracing::info!(
        "Expiring runner leases after {}s of silence (checked every {:?})",
        timeout.num_seconds(),
        every
    );

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;

            match service::deployment_service::expire_stale_leases(repo.as_ref(), timeout).await {
                Ok(expired) if !expired.is_empty() => {
                    tracing::warn!("Expired {} stale deployment lease(s)", expired.len());
                }
                Ok(_) => {}
                Err(e) => tracing::error!("Lease sweep failed: {:?}", e),
            }
        }
    })
}
