//! Deployment command handlers
//!
//! Starting deployments, inspecting attempts and their logs, cancelling and
//! rolling back.

use anyhow::{Result, anyhow, bail};
use clap::Subcommand;
use colored::*;
use slipway_client::{ClientError, OrchestratorClient};
use slipway_core::domain::deployment::{Deployment, DeploymentStatus};
use slipway_core::domain::environment::Environment;
use slipway_core::domain::log::{LogEntry, LogLevel};
use slipway_core::dto::deployment::{CreateDeployment, DeploymentQuery};

use crate::config::Config;
use crate::id_resolver::{resolve_deployment_id, resolve_tenant};
use crate::types::IdOrPrefix;

/// Deployment subcommands
#[derive(Subcommand)]
pub enum DeploymentCommands {
    /// Get deployment details
    Get {
        /// Deployment ID or unambiguous prefix
        id: String,
    },
    /// List deployments, newest first
    List {
        /// Only this tenant (id or subdomain)
        #[arg(long)]
        tenant: Option<String>,

        /// Only this environment
        #[arg(long)]
        env: Option<Environment>,

        /// Only this status (pending, building, deploying, success, failed, cancelled)
        #[arg(long)]
        status: Option<String>,
    },
    /// Get deployment logs
    Logs {
        /// Deployment ID or unambiguous prefix
        id: String,
    },
    /// Cancel a pending or building deployment
    Cancel {
        /// Deployment ID or unambiguous prefix
        id: String,
    },
    /// Redeploy the version that was live before this production deployment
    Rollback {
        /// Deployment ID or unambiguous prefix
        id: String,
    },
}

pub async fn handle_deployment_command(command: DeploymentCommands, config: &Config) -> Result<()> {
    let client = OrchestratorClient::new(config.orchestrator_url.clone());

    match command {
        DeploymentCommands::Get { id } => get_deployment(&client, &id).await,
        DeploymentCommands::List {
            tenant,
            env,
            status,
        } => list_deployments(&client, tenant, env, status).await,
        DeploymentCommands::Logs { id } => get_deployment_logs(&client, &id).await,
        DeploymentCommands::Cancel { id } => cancel_deployment(&client, &id).await,
        DeploymentCommands::Rollback { id } => rollback_deployment(&client, &id).await,
    }
}

/// Requests a new deployment attempt
pub async fn deploy(config: &Config, tenant: &str, version: &str, env: Environment) -> Result<()> {
    let client = OrchestratorClient::new(config.orchestrator_url.clone());
    let tenant = resolve_tenant(&client, tenant).await?;

    let request = CreateDeployment {
        tenant_id: tenant.id.clone(),
        version: version.to_string(),
        environment: env,
    };

    let deployment = client
        .create_deployment(request)
        .await
        .map_err(|e| explain_refusal(e, &tenant.subdomain, env))?;

    println!("{}", "✓ Deployment requested".green().bold());
    println!("  ID:          {}", deployment.id.to_string().cyan());
    println!("  Tenant:      {} ({})", tenant.subdomain, tenant.id.dimmed());
    println!("  Version:     {}", deployment.version);
    println!("  Environment: {}", deployment.environment);
    println!(
        "\n  Follow it with: {}",
        format!("slipway deployment logs {}", &deployment.id.to_string()[..8]).dimmed()
    );

    Ok(())
}

async fn get_deployment(client: &OrchestratorClient, id: &str) -> Result<()> {
    let uuid = resolve_deployment_id(client, &IdOrPrefix::parse(id)).await?;
    let deployment = client.get_deployment(uuid).await?;

    print_deployment_details(&deployment);

    Ok(())
}

async fn list_deployments(
    client: &OrchestratorClient,
    tenant: Option<String>,
    environment: Option<Environment>,
    status: Option<String>,
) -> Result<()> {
    let tenant_id = match tenant {
        Some(key) => Some(resolve_tenant(client, &key).await?.id),
        None => None,
    };

    let status = match status {
        Some(s) => match DeploymentStatus::parse(&s) {
            Some(status) => Some(status),
            None => bail!("Unknown deployment status '{}'", s),
        },
        None => None,
    };

    let query = DeploymentQuery {
        tenant_id,
        environment,
        status,
    };
    let deployments = client.list_deployments(&query).await?;

    if deployments.is_empty() {
        println!("{}", "No deployments found.".yellow());
        return Ok(());
    }

    println!(
        "{}",
        format!("Found {} deployment(s):", deployments.len()).bold()
    );
    println!();
    for deployment in deployments {
        print_deployment_summary(&deployment);
    }

    Ok(())
}

async fn get_deployment_logs(client: &OrchestratorClient, id: &str) -> Result<()> {
    let uuid = resolve_deployment_id(client, &IdOrPrefix::parse(id)).await?;
    let logs = client.get_deployment_logs(uuid).await?;

    if logs.is_empty() {
        println!("{}", "No logs found for this deployment.".yellow());
    } else {
        println!("{}", format!("Logs for deployment {}:", uuid).bold());
        println!("{}", "─".repeat(80).dimmed());
        for log in logs {
            print_log_entry(&log);
        }
        println!("{}", "─".repeat(80).dimmed());
    }

    Ok(())
}

async fn cancel_deployment(client: &OrchestratorClient, id: &str) -> Result<()> {
    let uuid = resolve_deployment_id(client, &IdOrPrefix::parse(id)).await?;

    match client.cancel_deployment(uuid).await {
        Ok(deployment) => {
            println!(
                "{} Deployment {} cancelled",
                "✓".green(),
                deployment.id.to_string().cyan()
            );
            Ok(())
        }
        Err(e) if e.is_conflict() => {
            bail!("Deployment {} can no longer be cancelled: {}", uuid, e)
        }
        Err(e) => Err(e.into()),
    }
}

async fn rollback_deployment(client: &OrchestratorClient, id: &str) -> Result<()> {
    let uuid = resolve_deployment_id(client, &IdOrPrefix::parse(id)).await?;

    let eligibility = client.rollback_eligibility(uuid).await?;
    let Some(target) = eligibility.target.filter(|_| eligibility.can_rollback) else {
        bail!("Deployment {} has no earlier successful version to roll back to", uuid);
    };

    println!(
        "Rolling back to version {} (deployment {})",
        target.version.cyan(),
        target.id.to_string().dimmed()
    );

    let deployment = client
        .rollback_deployment(uuid)
        .await
        .map_err(|e| explain_refusal(e, &target.tenant_id, Environment::Production))?;

    println!("{}", "✓ Rollback requested".green().bold());
    println!("  ID:      {}", deployment.id.to_string().cyan());
    println!("  Version: {}", deployment.version);

    Ok(())
}

/// Turns a busy (tenant, environment) pair into an actionable message
fn explain_refusal(err: ClientError, tenant: &str, env: Environment) -> anyhow::Error {
    if err.is_already_in_progress() {
        return anyhow!(
            "A deployment of {} to {} is already in progress; wait for it or cancel it first",
            tenant,
            env
        );
    }
    err.into()
}

fn print_deployment_summary(deployment: &Deployment) {
    println!(
        "  {} Deployment {}",
        "▸".cyan(),
        deployment.id.to_string().dimmed()
    );
    println!("    Tenant:      {}", deployment.tenant_id);
    println!(
        "    Version:     {} → {}",
        deployment.version, deployment.environment
    );
    println!("    Status:      {}", colorize_status(&deployment.status));
    println!(
        "    Requested:   {}",
        deployment
            .requested_at
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
            .dimmed()
    );
    if let Some(url) = &deployment.url {
        println!("    URL:         {}", url.cyan());
    }
    println!();
}

fn print_deployment_details(deployment: &Deployment) {
    println!("{}", "Deployment Details:".bold());
    println!("  ID:          {}", deployment.id.to_string().cyan());
    println!("  Tenant:      {}", deployment.tenant_id);
    println!("  Version:     {}", deployment.version);
    println!("  Environment: {}", deployment.environment);
    println!("  Status:      {}", colorize_status(&deployment.status));
    println!(
        "  Requested:   {}",
        deployment.requested_at.format("%Y-%m-%d %H:%M:%S")
    );

    if let Some(started) = deployment.started_at {
        println!("  Started:     {}", started.format("%Y-%m-%d %H:%M:%S"));
    }

    if let Some(completed) = deployment.completed_at {
        println!("  Completed:   {}", completed.format("%Y-%m-%d %H:%M:%S"));

        if let Some(started) = deployment.started_at {
            let duration = completed.signed_duration_since(started);
            println!("  Duration:    {}s", duration.num_seconds());
        }
    }

    if let Some(runner) = &deployment.runner_id {
        println!("  Runner:      {}", runner);
    }

    if let Some(sha) = &deployment.commit_sha {
        println!("  Commit:      {}", sha.dimmed());
    }

    if let Some(from) = deployment.rollback_from {
        println!("  Rollback of: {}", from.to_string().dimmed());
    }

    if let Some(url) = &deployment.url {
        println!("  URL:         {}", url.cyan());
    }

    if let Some(error) = &deployment.error {
        println!("\n{}", "Error:".bold());
        println!("  {} {}", error.kind.as_str().red().bold(), error.message.red());
    }
}

fn print_log_entry(log: &LogEntry) {
    let level_str = format!("{:?}", log.level).to_uppercase();
    let level_colored = match log.level {
        LogLevel::Debug => level_str.dimmed(),
        LogLevel::Info => level_str.cyan(),
        LogLevel::Warning => level_str.yellow(),
        LogLevel::Error => level_str.red(),
    };

    println!(
        "{} [{}] {}",
        log.timestamp.format("%H:%M:%S").to_string().dimmed(),
        level_colored,
        log.message
    );
}

fn colorize_status(status: &DeploymentStatus) -> ColoredString {
    let status_str = status.as_str();
    match status {
        DeploymentStatus::Pending => status_str.yellow(),
        DeploymentStatus::Building | DeploymentStatus::Deploying => status_str.cyan(),
        DeploymentStatus::Success => status_str.green(),
        DeploymentStatus::Failed => status_str.red(),
        DeploymentStatus::Cancelled => status_str.dimmed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_busy_pairs_get_the_in_progress_hint() {
        let busy = ClientError::from_body(
            409,
            r#"{"error":"already in progress","code":"already_in_progress"}"#,
        );
        let message = explain_refusal(busy, "alpha", Environment::Production).to_string();
        assert!(message.starts_with("A deployment of alpha to production is already in progress"));

        let stale = ClientError::from_body(
            409,
            r#"{"error":"Deployment 42 cannot be rolled back","code":"invalid_state"}"#,
        );
        let message = explain_refusal(stale, "alpha", Environment::Production).to_string();
        assert!(message.contains("cannot be rolled back"));
        assert!(!message.contains("in progress"));
    }
}
