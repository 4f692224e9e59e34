//! ID resolver module
//!
//! Deployments are addressed by UUID or an unambiguous prefix. Tenants are
//! addressed by their opaque id or their public subdomain.

use anyhow::{Context, Result, anyhow};
use slipway_client::OrchestratorClient;
use slipway_core::domain::tenant::Tenant;
use slipway_core::dto::deployment::DeploymentQuery;
use uuid::Uuid;

use crate::types::IdOrPrefix;

/// Resolve a deployment ID or prefix to a full UUID
///
/// If the input is already a full UUID, returns it immediately.
/// Otherwise, fetches all deployments and finds the one matching the prefix.
pub async fn resolve_deployment_id(
    client: &OrchestratorClient,
    id_or_prefix: &IdOrPrefix,
) -> Result<Uuid> {
    if let Some(uuid) = id_or_prefix.as_uuid() {
        return Ok(uuid);
    }

    let prefix = id_or_prefix.as_str().to_lowercase();

    let deployments = client
        .list_deployments(&DeploymentQuery::default())
        .await
        .context("Failed to fetch deployments for ID resolution")?;

    let matches: Vec<_> = deployments
        .iter()
        .filter(|d| d.id.to_string().starts_with(&prefix))
        .collect();

    match matches.len() {
        0 => Err(anyhow!(
            "No deployment found with ID starting with '{}'",
            prefix
        )),
        1 => Ok(matches[0].id),
        _ => {
            let ids: Vec<String> = matches.iter().map(|d| d.id.to_string()).collect();
            Err(anyhow!(
                "Ambiguous prefix '{}' matches multiple deployments: {}",
                prefix,
                ids.join(", ")
            ))
        }
    }
}

/// Resolve a tenant by opaque id or public subdomain
pub async fn resolve_tenant(client: &OrchestratorClient, key: &str) -> Result<Tenant> {
    match client.get_tenant(key).await {
        Ok(tenant) => return Ok(tenant),
        Err(e) if e.is_not_found() => {}
        Err(e) => return Err(e).context("Failed to fetch tenant"),
    }

    let key = key.to_lowercase();
    client
        .list_tenants()
        .await
        .context("Failed to fetch tenants for resolution")?
        .into_iter()
        .find(|t| t.subdomain == key)
        .ok_or_else(|| anyhow!("No tenant with id or subdomain '{}'", key))
}
