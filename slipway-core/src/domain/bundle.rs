//! Build output bundles
//!
//! A bundle is what the external build produces for one commit: executable
//! modules (one of which is the entry point) plus static assets.

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

/// Executable module shipped inline with the script
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleModule {
    /// Module name; also the multipart part name on upload
    pub name: String,
    pub content_type: String,
    pub content: Vec<u8>,
}

/// Static asset that may be offloaded to blob serving
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleAsset {
    pub path: String,
    pub content_type: String,
    pub content: Vec<u8>,
}

/// Built bundle for one commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bundle {
    /// Name of the module the platform should execute
    pub entry_module: String,
    pub modules: Vec<BundleModule>,
    #[serde(default)]
    pub assets: Vec<BundleAsset>,
}

pub const JS_MODULE_CONTENT_TYPE: &str = "application/javascript+module";

impl Bundle {
    pub fn modules_size(&self) -> usize {
        self.modules.iter().map(|m| m.content.len()).sum()
    }

    pub fn assets_size(&self) -> usize {
        self.assets.iter().map(|a| a.content.len()).sum()
    }

    /// Size of the upload when everything ships inline
    pub fn inline_size(&self) -> usize {
        self.modules_size() + self.assets_size()
    }

    pub fn has_module(&self, name: &str) -> bool {
        self.modules.iter().any(|m| m.name == name)
    }

    /// Short content digest; identical bundles share it
    ///
    /// Every field is length-prefixed so distinct bundles cannot produce the
    /// same byte stream.
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha1::new();
        let mut field = |bytes: &[u8]| {
            hasher.update((bytes.len() as u64).to_be_bytes());
            hasher.update(bytes);
        };

        field(self.entry_module.as_bytes());
        for module in &self.modules {
            field(module.name.as_bytes());
            field(module.content_type.as_bytes());
            field(&module.content);
        }
        for asset in &self.assets {
            field(asset.path.as_bytes());
            field(asset.content_type.as_bytes());
            field(&asset.content);
        }

        hex::encode(&hasher.finalize()[..8])
    }
}
