//! Edge configuration
//!
//! The dispatcher is configured entirely at startup: the apps domain, the
//! namespaces per environment and the closed set of reserved hostnames.

use std::path::PathBuf;

use anyhow::Context;
use slipway_core::domain::identity::NamespaceConfig;
use slipway_core::routing::{HostResolver, ReservedHostnames};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,

    /// Domain under which every tenant host is one label deep
    pub apps_domain: String,

    /// Comma separated reserved hostnames (RESERVED_HOSTNAMES)
    pub reserved_hostnames: String,

    /// Operator-managed reserved hostname list, one per line
    pub reserved_hostnames_file: Option<PathBuf>,

    /// Base URL of the platform's dispatch endpoint
    pub dispatch_url: String,

    pub namespaces: NamespaceConfig,

    /// Largest request body forwarded to a script
    pub max_body_bytes: usize,
}

impl Config {
    pub fn new(apps_domain: impl Into<String>, dispatch_url: impl Into<String>) -> Self {
        let apps_domain = apps_domain.into();
        Self {
            bind_addr: "0.0.0.0:8787".to_string(),
            reserved_hostnames: default_reserved(&apps_domain),
            apps_domain,
            reserved_hostnames_file: None,
            dispatch_url: dispatch_url.into(),
            namespaces: NamespaceConfig::default(),
            max_body_bytes: 16 * 1024 * 1024,
        }
    }

    /// Load configuration from environment variables
    ///
    /// A `.env` file in the working directory is loaded first, if present.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let apps_domain =
            std::env::var("APPS_DOMAIN").unwrap_or_else(|_| "apps.localhost".to_string());
        let dispatch_url =
            std::env::var("DISPATCH_URL").unwrap_or_else(|_| "http://localhost:8788".to_string());
        let defaults = Self::new(apps_domain, dispatch_url);

        Self {
            bind_addr: std::env::var("EDGE_BIND_ADDR").unwrap_or(defaults.bind_addr.clone()),
            reserved_hostnames: std::env::var("RESERVED_HOSTNAMES")
                .unwrap_or(defaults.reserved_hostnames.clone()),
            reserved_hostnames_file: std::env::var("RESERVED_HOSTNAMES_FILE")
                .ok()
                .map(PathBuf::from),
            namespaces: NamespaceConfig::from_env(),
            max_body_bytes: std::env::var("EDGE_MAX_BODY_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_body_bytes),
            ..defaults
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.apps_domain.trim().is_empty() {
            anyhow::bail!("APPS_DOMAIN cannot be empty");
        }

        if !self.dispatch_url.starts_with("http://") && !self.dispatch_url.starts_with("https://")
        {
            anyhow::bail!("DISPATCH_URL must start with http:// or https://");
        }

        self.namespaces.validate().map_err(anyhow::Error::msg)?;

        Ok(())
    }

    /// Merges the env list and the file into the reserved set
    pub fn load_reserved(&self) -> anyhow::Result<ReservedHostnames> {
        let mut reserved = ReservedHostnames::parse_list(&self.reserved_hostnames);

        if let Some(path) = &self.reserved_hostnames_file {
            let text = std::fs::read_to_string(path).with_context(|| {
                format!("Failed to read reserved hostnames from {}", path.display())
            })?;
            reserved.extend(ReservedHostnames::parse_list(&text));
        }

        if reserved.is_empty() {
            warn!("No reserved hostnames configured; every host under the apps domain is a tenant slot");
        } else {
            info!("Loaded {} reserved hostnames", reserved.len());
        }

        Ok(reserved)
    }

    pub fn resolver(&self) -> anyhow::Result<HostResolver> {
        Ok(HostResolver::new(
            &self.apps_domain,
            self.namespaces.clone(),
            self.load_reserved()?,
        ))
    }
}

/// The apex plus the usual system labels
fn default_reserved(apps_domain: &str) -> String {
    ["", "www.", "api.", "admin.", "dashboard."]
        .iter()
        .map(|prefix| format!("{}{}", prefix, apps_domain))
        .collect::<Vec<_>>()
        .join(",")
}
