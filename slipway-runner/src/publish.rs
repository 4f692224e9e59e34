//! Script publishing
//!
//! Uploads a built bundle as the script of a tenant environment. The script
//! identity never depends on the version, so publishing is an overwrite: the
//! environment serves the new bundle as soon as the upsert returns.
//!
//! Everything that can reject a bundle is checked before the first network
//! call, so a rejected bundle never touches the live script. Offloaded assets
//! land under a prefix derived from the bundle content, so a failed upsert
//! leaves the previous release's assets where the live script expects them.

use std::collections::HashSet;
use std::sync::Arc;

use slipway_client::dispatch::{
    ScriptBinding, ScriptMetadata, ScriptStore, ScriptUpload, asset_prefix,
};
use slipway_core::domain::bundle::{Bundle, BundleModule};
use slipway_core::domain::environment::Environment;
use slipway_core::domain::identity::{NamespaceConfig, ScriptIdentity, deployment_url};
use slipway_core::domain::tenant::Tenant;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, Result};

/// Binding through which a script finds its offloaded assets
pub const ASSETS_BASE_URL_BINDING: &str = "ASSETS_BASE_URL";

/// Multipart part carrying the upload metadata
const METADATA_PART: &str = "metadata";

/// Platform limit for one script upload
pub const DEFAULT_SCRIPT_SIZE_LIMIT: usize = 10 * 1024 * 1024;

pub const DEFAULT_COMPATIBILITY_DATE: &str = "2024-09-23";

#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub namespaces: NamespaceConfig,
    pub apps_domain: String,
    pub script_size_limit: usize,
    /// Off switch for the asset-serving path; oversized bundles then fail
    pub asset_offload_enabled: bool,
    /// Public base under which offloaded assets are served
    pub assets_public_url: String,
    pub compatibility_date: String,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            namespaces: NamespaceConfig::default(),
            apps_domain: "apps.localhost".to_string(),
            script_size_limit: DEFAULT_SCRIPT_SIZE_LIMIT,
            asset_offload_enabled: true,
            assets_public_url: "https://assets.apps.localhost".to_string(),
            compatibility_date: DEFAULT_COMPATIBILITY_DATE.to_string(),
        }
    }
}

impl PublisherConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        self.namespaces.validate().map_err(anyhow::Error::msg)?;

        if self.apps_domain.is_empty() {
            anyhow::bail!("apps_domain cannot be empty");
        }

        if self.script_size_limit == 0 {
            anyhow::bail!("script_size_limit must be greater than 0");
        }

        if self.asset_offload_enabled && !self.assets_public_url.starts_with("http") {
            anyhow::bail!("assets_public_url must be an http(s) URL when asset offload is enabled");
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishResult {
    pub identity: ScriptIdentity,
    pub url: String,
    pub etag: String,
    /// Content digest of the published bundle
    pub release: String,
    /// Number of assets shipped through the asset-serving path
    pub offloaded_assets: usize,
}

/// How a bundle gets split between the script upload and the asset path
enum Layout {
    Inline,
    Offload,
}

#[derive(Clone)]
pub struct Publisher {
    store: Arc<dyn ScriptStore>,
    config: PublisherConfig,
}

impl Publisher {
    pub fn new(store: Arc<dyn ScriptStore>, config: PublisherConfig) -> Self {
        Self { store, config }
    }

    pub fn identity(&self, tenant: &Tenant, environment: Environment) -> ScriptIdentity {
        ScriptIdentity::for_tenant(&self.config.namespaces, tenant, environment)
    }

    pub async fn publish(
        &self,
        tenant: &Tenant,
        environment: Environment,
        bundle: Bundle,
    ) -> Result<PublishResult> {
        let layout = self.plan(&bundle)?;
        let identity = self.identity(tenant, environment);
        let release = bundle.content_hash();

        let mut metadata = ScriptMetadata {
            main_module: bundle.entry_module.clone(),
            compatibility_date: self.config.compatibility_date.clone(),
            tags: vec![
                format!("tenant:{}", tenant.id),
                format!("environment:{}", environment),
            ],
            bindings: Vec::new(),
        };

        let mut modules = bundle.modules;
        let mut offloaded_assets = 0;

        match layout {
            Layout::Inline => {
                modules.extend(bundle.assets.into_iter().map(|asset| BundleModule {
                    name: asset.path,
                    content_type: asset.content_type,
                    content: asset.content,
                }));
            }
            Layout::Offload => {
                for asset in bundle.assets {
                    self.store
                        .upload_asset(
                            &identity,
                            &release,
                            &asset.path,
                            &asset.content_type,
                            asset.content,
                        )
                        .await?;
                    offloaded_assets += 1;
                }
                debug!(
                    "Offloaded {} assets for {} (release {})",
                    offloaded_assets, identity, release
                );

                metadata.bindings.push(ScriptBinding::PlainText {
                    name: ASSETS_BASE_URL_BINDING.to_string(),
                    text: format!(
                        "{}/{}",
                        self.config.assets_public_url.trim_end_matches('/'),
                        asset_prefix(&identity, &release)
                    ),
                });
            }
        }

        let info = self
            .store
            .upsert_script(&identity, ScriptUpload { metadata, modules })
            .await?;

        info!("Published {} (etag {})", identity, info.etag);

        Ok(PublishResult {
            url: deployment_url(&self.config.apps_domain, tenant, environment),
            identity,
            etag: info.etag,
            release,
            offloaded_assets,
        })
    }

    /// Checks the bundle against the upload rules without side effects
    fn plan(&self, bundle: &Bundle) -> Result<Layout> {
        if !bundle.has_module(&bundle.entry_module) {
            return Err(PipelineError::EntryModuleMismatch {
                entry: bundle.entry_module.clone(),
                modules: bundle
                    .modules
                    .iter()
                    .map(|m| m.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            });
        }

        let mut parts = HashSet::from([METADATA_PART]);
        for module in &bundle.modules {
            if !parts.insert(module.name.as_str()) {
                return Err(PipelineError::DuplicatePart {
                    name: module.name.clone(),
                });
            }
        }

        let limit = self.config.script_size_limit;
        let inline_size = bundle.inline_size();

        if inline_size <= limit {
            // Inline assets become parts named by their path
            for asset in &bundle.assets {
                if !parts.insert(asset.path.as_str()) {
                    return Err(PipelineError::DuplicatePart {
                        name: asset.path.clone(),
                    });
                }
            }
            return Ok(Layout::Inline);
        }

        if bundle.modules_size() > limit {
            return Err(PipelineError::BundleTooLarge {
                size: bundle.modules_size(),
                limit,
                reason: "executable modules alone exceed the limit",
            });
        }

        if !self.config.asset_offload_enabled {
            warn!("Bundle needs asset offload but it is disabled");
            return Err(PipelineError::BundleTooLarge {
                size: inline_size,
                limit,
                reason: "asset offload is disabled",
            });
        }

        Ok(Layout::Offload)
    }
}
