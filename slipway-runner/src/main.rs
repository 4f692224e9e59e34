use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use slipway_client::OrchestratorClient;
use slipway_client::builds::ActionsClient;
use slipway_client::dispatch::DispatchPlatformClient;
use slipway_client::files::HttpFileSetProvider;
use slipway_client::source::GitHubSourceHost;
use slipway_runner::config::Config;
use slipway_runner::monitor::BuildMonitor;
use slipway_runner::pipeline::Pipeline;
use slipway_runner::publish::Publisher;
use slipway_runner::repository::{HttpDeploymentRepository, HttpLogRepository};
use slipway_runner::scheduler::DeploymentPoller;
use slipway_runner::scheduler::poller::PollerSettings;
use slipway_runner::sync::Synchronizer;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "slipway_runner=info,slipway_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Slipway Runner");

    let config = load_config()?;
    info!(
        "Loaded configuration: runner_id={}, orchestrator_url={}",
        config.runner_id, config.orchestrator_url
    );

    let client = Arc::new(OrchestratorClient::new(config.orchestrator_url.clone()));

    wait_for_orchestrator(&client).await?;
    info!("Orchestrator is reachable");

    let source = Arc::new(GitHubSourceHost::new(
        config.source_api_url.clone(),
        config.source_api_token.clone(),
    ));
    let builds = Arc::new(ActionsClient::new(
        config.build_api_url.clone(),
        config.source_api_token.clone(),
    ));
    let platform = Arc::new(DispatchPlatformClient::new(
        config.platform_api_url.clone(),
        config.platform_account_id.clone(),
        config.platform_api_token.clone(),
    ));
    let files = Arc::new(HttpFileSetProvider::new(config.files_api_url.clone()));

    let deployments = Arc::new(HttpDeploymentRepository::new(
        Arc::clone(&client),
        config.runner_id.clone(),
    ));
    let logs = Arc::new(HttpLogRepository::new(Arc::clone(&client)));

    let pipeline = Pipeline::new(
        files,
        Synchronizer::new(source, config.sync_max_attempts),
        BuildMonitor::new(builds.clone(), config.monitor.clone()),
        builds,
        Publisher::new(platform, config.publisher.clone()),
        deployments.clone(),
    );

    let poller = DeploymentPoller::new(PollerSettings::from(&config), deployments, logs, pipeline);

    info!(
        "Runner initialized (apps domain {}, asset offload {})",
        config.publisher.apps_domain,
        if config.publisher.asset_offload_enabled {
            "enabled"
        } else {
            "disabled"
        }
    );

    if let Err(e) = poller.run().await {
        error!("Poller error: {:#}", e);
        return Err(e);
    }

    Ok(())
}

/// Loads configuration from environment variables with fallback to defaults
fn load_config() -> Result<Config> {
    match Config::from_env() {
        Ok(config) => {
            config.validate()?;
            Ok(config)
        }
        Err(e) => {
            info!("Failed to load config from environment ({}), using defaults", e);
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }
}

/// Waits until the orchestrator answers its health check
///
/// The orchestrator may not be up yet when the runner starts (common in
/// container environments); retries with capped exponential backoff.
async fn wait_for_orchestrator(client: &OrchestratorClient) -> Result<()> {
    const MAX_RETRIES: u32 = 10;
    const INITIAL_DELAY_MS: u64 = 500;
    const MAX_DELAY_MS: u64 = 30_000;

    let mut attempt = 0;
    let mut delay_ms = INITIAL_DELAY_MS;

    loop {
        attempt += 1;

        match client.health().await {
            Ok(()) => {
                if attempt > 1 {
                    info!("Orchestrator reachable after {} attempt(s)", attempt);
                }
                return Ok(());
            }
            Err(e) => {
                if attempt >= MAX_RETRIES {
                    error!("Orchestrator unreachable after {} attempts", MAX_RETRIES);
                    return Err(anyhow::anyhow!("Orchestrator health check failed: {}", e));
                }

                warn!(
                    "Orchestrator not reachable (attempt {}/{}): {}",
                    attempt, MAX_RETRIES, e
                );
                warn!("Retrying in {} ms...", delay_ms);

                tokio::time::sleep(Duration::from_millis(delay_ms)).await;

                delay_ms = (delay_ms * 2).min(MAX_DELAY_MS);
            }
        }
    }
}
