//! Tenant domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::environment::Environment;

/// Length of the opaque tenant identifier (lowercase hex)
pub const TENANT_ID_LEN: usize = 16;

/// A tenant application
///
/// `id` is opaque and only ever appears in preview/staging hostnames, so the
/// non-production namespaces never reveal the tenant's public subdomain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: String,
    /// Public, human-chosen production subdomain
    pub subdomain: String,
    /// Repository at the source host, `owner/name`
    pub repository: String,
    /// Last time repository access was granted or changed
    pub repository_permissions_changed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Generates a fresh opaque tenant identifier
pub fn generate_tenant_id() -> String {
    let simple = Uuid::new_v4().simple().to_string();
    simple[..TENANT_ID_LEN].to_string()
}

/// Checks that a string is a single lowercase DNS label
pub fn is_dns_label(label: &str) -> bool {
    !label.is_empty()
        && label.len() <= 63
        && !label.starts_with('-')
        && !label.ends_with('-')
        && label
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
}

/// Validates a production subdomain
///
/// Besides being a DNS label, a subdomain may not end in an environment marker:
/// `shop-preview` would be indistinguishable from the preview host of a tenant
/// whose opaque id is `shop`.
pub fn validate_subdomain(subdomain: &str) -> Result<(), String> {
    if !is_dns_label(subdomain) {
        return Err(format!(
            "Subdomain '{}' must be 1-63 characters of a-z, 0-9 or '-', not starting or ending with '-'",
            subdomain
        ));
    }

    if Environment::strip_marker(subdomain).is_some() {
        return Err(format!(
            "Subdomain '{}' may not end with an environment marker",
            subdomain
        ));
    }

    Ok(())
}

/// Validates a repository reference of the form `owner/name`
pub fn validate_repository(repository: &str) -> Result<(), String> {
    let mut parts = repository.split('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(owner), Some(name), None) if !owner.is_empty() && !name.is_empty() => Ok(()),
        _ => Err(format!(
            "Repository '{}' must have the form owner/name",
            repository
        )),
    }
}
