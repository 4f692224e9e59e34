//! Per-attempt workspaces
//!
//! Every deployment attempt gets its own directory, named after the attempt
//! plus a random nonce so a retried attempt never sees a previous run's files.
//! The path is handed to every call that touches build outputs; nothing in the
//! runner resolves paths against the process working directory.

use std::io;
use std::path::{Path, PathBuf};

use slipway_client::ClientError;
use slipway_client::builds::BundleManifest;
use slipway_core::domain::bundle::Bundle;
use tracing::debug;
use uuid::Uuid;

use crate::error::Result;

const BUNDLE_FILE: &str = "bundle.json";

#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Creates `{base}/{attempt_id}-{nonce}`
    pub async fn create(base: &Path, attempt_id: Uuid) -> io::Result<Self> {
        let nonce = Uuid::new_v4().simple().to_string();
        let root = base.join(format!("{}-{}", attempt_id, &nonce[..8]));

        tokio::fs::create_dir_all(&root).await?;
        debug!("Created workspace {}", root.display());

        Ok(Self { root })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Where the build output manifest is downloaded to
    pub fn bundle_path(&self) -> PathBuf {
        self.root.join(BUNDLE_FILE)
    }

    /// Reads the downloaded build output back as a bundle
    pub async fn load_bundle(&self) -> Result<Bundle> {
        let raw = tokio::fs::read(self.bundle_path()).await?;
        let manifest: BundleManifest = serde_json::from_slice(&raw)
            .map_err(|e| ClientError::ParseError(format!("invalid bundle manifest: {}", e)))?;

        Ok(manifest.into_bundle()?)
    }

    /// Removes the workspace directory and everything in it
    pub async fn cleanup(&self) -> io::Result<()> {
        match tokio::fs::remove_dir_all(&self.root).await {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use slipway_core::domain::bundle::{BundleModule, JS_MODULE_CONTENT_TYPE};

    #[tokio::test]
    async fn test_workspaces_are_unique_per_attempt() {
        let base = tempfile::tempdir().unwrap();
        let attempt = Uuid::new_v4();

        let first = Workspace::create(base.path(), attempt).await.unwrap();
        let second = Workspace::create(base.path(), attempt).await.unwrap();

        assert_ne!(first.path(), second.path());
        assert!(first.path().starts_with(base.path()));
        assert!(
            first
                .path()
                .file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with(&attempt.to_string())
        );
        assert!(first.path().is_dir());
    }

    #[tokio::test]
    async fn test_load_bundle_from_manifest() {
        let base = tempfile::tempdir().unwrap();
        let workspace = Workspace::create(base.path(), Uuid::new_v4()).await.unwrap();

        let bundle = Bundle {
            entry_module: "index.js".to_string(),
            modules: vec![BundleModule {
                name: "index.js".to_string(),
                content_type: JS_MODULE_CONTENT_TYPE.to_string(),
                content: b"export default {}".to_vec(),
            }],
            assets: vec![],
        };
        let json = serde_json::to_vec(&BundleManifest::from_bundle(&bundle)).unwrap();
        tokio::fs::write(workspace.bundle_path(), json).await.unwrap();

        assert_eq!(workspace.load_bundle().await.unwrap(), bundle);
    }

    #[tokio::test]
    async fn test_missing_or_corrupt_manifest() {
        let base = tempfile::tempdir().unwrap();
        let workspace = Workspace::create(base.path(), Uuid::new_v4()).await.unwrap();

        assert!(matches!(
            workspace.load_bundle().await,
            Err(PipelineError::Workspace(_))
        ));

        tokio::fs::write(workspace.bundle_path(), b"not json").await.unwrap();
        assert!(matches!(
            workspace.load_bundle().await,
            Err(PipelineError::Upstream(ClientError::ParseError(_)))
        ));
    }

    #[tokio::test]
    async fn test_cleanup_removes_directory() {
        let base = tempfile::tempdir().unwrap();
        let workspace = Workspace::create(base.path(), Uuid::new_v4()).await.unwrap();
        let path = workspace.path().to_path_buf();
        tokio::fs::write(workspace.bundle_path(), b"{}").await.unwrap();

        workspace.cleanup().await.unwrap();
        assert!(!path.exists());
    }
}
