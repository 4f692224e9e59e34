//! Tenant command handlers

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use slipway_client::OrchestratorClient;
use slipway_core::domain::environment::Environment;
use slipway_core::domain::identity::deployment_url;
use slipway_core::domain::tenant::Tenant;
use slipway_core::dto::tenant::CreateTenant;

use crate::config::Config;
use crate::id_resolver::resolve_tenant;

/// Tenant subcommands
#[derive(Subcommand)]
pub enum TenantCommands {
    /// Register a new tenant
    Create {
        /// Public production subdomain
        subdomain: String,

        /// Repository at the source host (owner/name)
        #[arg(short, long)]
        repository: String,
    },
    /// List all tenants
    List,
    /// Get tenant details
    Get {
        /// Tenant id or subdomain
        tenant: String,

        /// Apps domain used to print the environment URLs
        #[arg(long, env = "APPS_DOMAIN")]
        apps_domain: Option<String>,
    },
    /// Record that repository access was just granted or changed
    TouchPermissions {
        /// Tenant id or subdomain
        tenant: String,
    },
}

pub async fn handle_tenant_command(command: TenantCommands, config: &Config) -> Result<()> {
    let client = OrchestratorClient::new(config.orchestrator_url.clone());

    match command {
        TenantCommands::Create {
            subdomain,
            repository,
        } => create_tenant(&client, subdomain, repository).await,
        TenantCommands::List => list_tenants(&client).await,
        TenantCommands::Get {
            tenant,
            apps_domain,
        } => get_tenant(&client, &tenant, apps_domain.as_deref()).await,
        TenantCommands::TouchPermissions { tenant } => touch_permissions(&client, &tenant).await,
    }
}

async fn create_tenant(
    client: &OrchestratorClient,
    subdomain: String,
    repository: String,
) -> Result<()> {
    println!("{}", "Creating tenant...".cyan());

    let tenant = client
        .create_tenant(CreateTenant {
            subdomain,
            repository,
        })
        .await?;

    println!("{}", "✓ Tenant created successfully!".green().bold());
    println!("  ID:         {}", tenant.id.cyan());
    println!("  Subdomain:  {}", tenant.subdomain);
    println!("  Repository: {}", tenant.repository);

    Ok(())
}

async fn list_tenants(client: &OrchestratorClient) -> Result<()> {
    let tenants = client.list_tenants().await?;

    if tenants.is_empty() {
        println!("{}", "No tenants found.".yellow());
        return Ok(());
    }

    println!("{}", format!("Found {} tenant(s):", tenants.len()).bold());
    println!();
    for tenant in tenants {
        println!("  {} {}", "▸".cyan(), tenant.subdomain.bold());
        println!("    ID:         {}", tenant.id.dimmed());
        println!("    Repository: {}", tenant.repository);
        println!();
    }

    Ok(())
}

async fn get_tenant(
    client: &OrchestratorClient,
    key: &str,
    apps_domain: Option<&str>,
) -> Result<()> {
    let tenant = resolve_tenant(client, key).await?;
    print_tenant_details(&tenant, apps_domain);
    Ok(())
}

async fn touch_permissions(client: &OrchestratorClient, key: &str) -> Result<()> {
    let tenant = resolve_tenant(client, key).await?;
    let tenant = client.touch_repository_permissions(&tenant.id).await?;

    println!(
        "{} Repository permissions of {} marked as changed at {}",
        "✓".green(),
        tenant.subdomain.cyan(),
        tenant
            .repository_permissions_changed_at
            .format("%Y-%m-%d %H:%M:%S")
    );
    println!(
        "{}",
        "  The next build wait starts with a grace period.".dimmed()
    );

    Ok(())
}

fn print_tenant_details(tenant: &Tenant, apps_domain: Option<&str>) {
    println!("{}", "Tenant Details:".bold());
    println!("  ID:          {}", tenant.id.cyan());
    println!("  Subdomain:   {}", tenant.subdomain);
    println!("  Repository:  {}", tenant.repository);
    println!(
        "  Created:     {}",
        tenant.created_at.format("%Y-%m-%d %H:%M:%S")
    );
    println!(
        "  Permissions: {}",
        tenant
            .repository_permissions_changed_at
            .format("%Y-%m-%d %H:%M:%S")
    );

    if let Some(apps_domain) = apps_domain {
        println!("\n{}", "URLs:".bold());
        for env in Environment::ALL {
            println!(
                "  {:<11} {}",
                env.as_str(),
                deployment_url(apps_domain, tenant, env).cyan()
            );
        }
    }
}
