//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod deployment;
mod tenant;

pub use deployment::DeploymentCommands;
pub use tenant::TenantCommands;

use anyhow::Result;
use clap::Subcommand;
use slipway_core::domain::environment::Environment;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Tenant management
    Tenant {
        #[command(subcommand)]
        command: TenantCommands,
    },
    /// Deploy a version of a tenant application
    Deploy {
        /// Tenant id or subdomain
        tenant: String,

        /// Version (file set) to deploy
        version: String,

        /// Target environment: preview, staging or production
        #[arg(long, default_value = "preview")]
        env: Environment,
    },
    /// Deployment inspection and control
    Deployment {
        #[command(subcommand)]
        command: DeploymentCommands,
    },
}

/// Routes the command to the appropriate handler module
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Tenant { command } => tenant::handle_tenant_command(command, config).await,
        Commands::Deploy {
            tenant,
            version,
            env,
        } => deployment::deploy(config, &tenant, &version, env).await,
        Commands::Deployment { command } => {
            deployment::handle_deployment_command(command, config).await
        }
    }
}
