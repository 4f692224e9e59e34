//! Tenant DTOs

use serde::{Deserialize, Serialize};

/// Request to register a tenant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTenant {
    /// Public production subdomain
    pub subdomain: String,
    /// Repository at the source host, `owner/name`
    pub repository: String,
}
