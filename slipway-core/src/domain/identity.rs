//! Script identities
//!
//! A script identity is the `(namespace, script_name)` key under which a
//! tenant's bundle is published and later routed to. It is a pure function of
//! tenant and environment and never depends on the version being deployed,
//! so redeploys overwrite in place and URLs stay stable.
//!
//! The script name doubles as the hostname label: `alpha.{apps_domain}` routes
//! to script `alpha`, `3f9c...-preview.{apps_domain}` to script `3f9c...-preview`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::environment::Environment;
use crate::domain::tenant::Tenant;

/// Dispatch namespace names per environment class
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceConfig {
    pub production: String,
    pub staging: String,
    pub preview: String,
}

impl NamespaceConfig {
    pub fn for_environment(&self, env: Environment) -> &str {
        match env {
            Environment::Production => &self.production,
            Environment::Staging => &self.staging,
            Environment::Preview => &self.preview,
        }
    }

    /// Reads namespace names from NAMESPACE_PRODUCTION / NAMESPACE_STAGING /
    /// NAMESPACE_PREVIEW, falling back to the defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            production: std::env::var("NAMESPACE_PRODUCTION").unwrap_or(defaults.production),
            staging: std::env::var("NAMESPACE_STAGING").unwrap_or(defaults.staging),
            preview: std::env::var("NAMESPACE_PREVIEW").unwrap_or(defaults.preview),
        }
    }

    /// Namespaces must be distinct so environments stay isolated
    pub fn validate(&self) -> Result<(), String> {
        let names = [&self.production, &self.staging, &self.preview];
        if names.iter().any(|n| n.trim().is_empty()) {
            return Err("namespace names cannot be empty".to_string());
        }
        if self.production == self.staging
            || self.production == self.preview
            || self.staging == self.preview
        {
            return Err("namespace names must be distinct per environment".to_string());
        }
        Ok(())
    }
}

impl Default for NamespaceConfig {
    fn default() -> Self {
        Self {
            production: "prod-ns".to_string(),
            staging: "staging-ns".to_string(),
            preview: "preview-ns".to_string(),
        }
    }
}

/// `(namespace, script_name)` pair identifying a deployed script
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScriptIdentity {
    pub namespace: String,
    pub script_name: String,
}

impl ScriptIdentity {
    /// Builds the identity from a tenant key
    ///
    /// `tenant_key` is the public subdomain for production and the opaque
    /// tenant id for every other environment.
    pub fn from_key(namespaces: &NamespaceConfig, env: Environment, tenant_key: &str) -> Self {
        Self {
            namespace: namespaces.for_environment(env).to_string(),
            script_name: script_name(env, tenant_key),
        }
    }

    pub fn for_tenant(namespaces: &NamespaceConfig, tenant: &Tenant, env: Environment) -> Self {
        Self::from_key(namespaces, env, tenant_key(tenant, env))
    }
}

impl fmt::Display for ScriptIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.script_name)
    }
}

/// The part of a tenant that names its script in the given environment
pub fn tenant_key(tenant: &Tenant, env: Environment) -> &str {
    match env {
        Environment::Production => &tenant.subdomain,
        Environment::Preview | Environment::Staging => &tenant.id,
    }
}

pub fn script_name(env: Environment, tenant_key: &str) -> String {
    match env.marker() {
        Some(marker) => format!("{}{}", tenant_key, marker),
        None => tenant_key.to_string(),
    }
}

/// Public URL of a tenant environment
pub fn deployment_url(apps_domain: &str, tenant: &Tenant, env: Environment) -> String {
    format!(
        "https://{}.{}",
        script_name(env, tenant_key(tenant, env)),
        apps_domain
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn tenant() -> Tenant {
        Tenant {
            id: "3f9c0a1b2c3d4e5f".to_string(),
            subdomain: "alpha".to_string(),
            repository: "tenants/alpha".to_string(),
            repository_permissions_changed_at: Utc::now(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_production_identity_uses_subdomain() {
        let identity =
            ScriptIdentity::for_tenant(&NamespaceConfig::default(), &tenant(), Environment::Production);
        assert_eq!(identity.namespace, "prod-ns");
        assert_eq!(identity.script_name, "alpha");
    }

    #[test]
    fn test_preview_identity_hides_subdomain() {
        let identity =
            ScriptIdentity::for_tenant(&NamespaceConfig::default(), &tenant(), Environment::Preview);
        assert_eq!(identity.namespace, "preview-ns");
        assert_eq!(identity.script_name, "3f9c0a1b2c3d4e5f-preview");
        assert!(!identity.script_name.contains("alpha"));
    }

    #[test]
    fn test_urls() {
        let t = tenant();
        assert_eq!(
            deployment_url("apps.test", &t, Environment::Production),
            "https://alpha.apps.test"
        );
        assert_eq!(
            deployment_url("apps.test", &t, Environment::Staging),
            "https://3f9c0a1b2c3d4e5f-staging.apps.test"
        );
    }

    #[test]
    fn test_namespace_validation() {
        assert!(NamespaceConfig::default().validate().is_ok());
        let mut shared = NamespaceConfig::default();
        shared.preview = shared.staging.clone();
        assert!(shared.validate().is_err());
    }
}
