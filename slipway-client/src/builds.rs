//! CI build status and build outputs
//!
//! Runs are looked up by commit SHA. A run that was triggered moments after
//! the repository's permissions changed can stay invisible to our credential
//! for a while; that window reads as [`BuildRunLookup::NotFoundYet`], never as
//! an error.

use std::path::Path;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, Result};
use crate::{check_status, handle_response};
use slipway_core::domain::build::{BuildRunLookup, TerminalBuildStatus};
use slipway_core::domain::bundle::{Bundle, BundleAsset, BundleModule};

/// Lookup of the build run triggered by a commit
#[async_trait]
pub trait BuildStatusSource: Send + Sync {
    async fn run_for_commit(&self, repository: &str, commit_sha: &str) -> Result<BuildRunLookup>;
}

/// Download of a finished run's bundle
#[async_trait]
pub trait ArtifactSource: Send + Sync {
    /// Writes the run's bundle manifest to `dest`
    async fn download_bundle(&self, repository: &str, run_id: u64, dest: &Path) -> Result<()>;
}

// =============================================================================
// Bundle manifest (wire form)
// =============================================================================

/// Bundle as published by the build, with base64 file contents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleManifest {
    pub entry_module: String,
    pub modules: Vec<ManifestModule>,
    #[serde(default)]
    pub assets: Vec<ManifestAsset>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestModule {
    pub name: String,
    pub content_type: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestAsset {
    pub path: String,
    pub content_type: String,
    pub content: String,
}

impl BundleManifest {
    pub fn into_bundle(self) -> Result<Bundle> {
        let decode = |what: &str, content: &str| {
            BASE64
                .decode(content)
                .map_err(|e| ClientError::ParseError(format!("invalid base64 in {}: {}", what, e)))
        };

        let modules = self
            .modules
            .into_iter()
            .map(|m| {
                Ok(BundleModule {
                    content: decode(&m.name, &m.content)?,
                    name: m.name,
                    content_type: m.content_type,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let assets = self
            .assets
            .into_iter()
            .map(|a| {
                Ok(BundleAsset {
                    content: decode(&a.path, &a.content)?,
                    path: a.path,
                    content_type: a.content_type,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Bundle {
            entry_module: self.entry_module,
            modules,
            assets,
        })
    }

    pub fn from_bundle(bundle: &Bundle) -> Self {
        Self {
            entry_module: bundle.entry_module.clone(),
            modules: bundle
                .modules
                .iter()
                .map(|m| ManifestModule {
                    name: m.name.clone(),
                    content_type: m.content_type.clone(),
                    content: BASE64.encode(&m.content),
                })
                .collect(),
            assets: bundle
                .assets
                .iter()
                .map(|a| ManifestAsset {
                    path: a.path.clone(),
                    content_type: a.content_type.clone(),
                    content: BASE64.encode(&a.content),
                })
                .collect(),
        }
    }
}

// =============================================================================
// GitHub Actions implementation
// =============================================================================

/// [`BuildStatusSource`] and [`ArtifactSource`] backed by a GitHub
/// Actions-shaped API
#[derive(Debug, Clone)]
pub struct ActionsClient {
    base_url: String,
    token: String,
    client: Client,
}

impl ActionsClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            client: Client::new(),
        }
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", "slipway")
    }
}

#[derive(Debug, Deserialize)]
struct RunList {
    #[serde(default)]
    workflow_runs: Vec<WorkflowRun>,
}

#[derive(Debug, Deserialize)]
struct WorkflowRun {
    id: u64,
    status: String,
    conclusion: Option<String>,
}

impl WorkflowRun {
    fn lookup(&self) -> BuildRunLookup {
        if self.status != "completed" {
            return BuildRunLookup::Running { run_id: self.id };
        }

        let status = match self.conclusion.as_deref() {
            Some("success") => TerminalBuildStatus::Succeeded,
            Some("cancelled") | Some("skipped") => TerminalBuildStatus::Cancelled,
            _ => TerminalBuildStatus::Failed,
        };

        BuildRunLookup::Finished {
            run_id: self.id,
            status,
        }
    }
}

#[async_trait]
impl BuildStatusSource for ActionsClient {
    async fn run_for_commit(&self, repository: &str, commit_sha: &str) -> Result<BuildRunLookup> {
        let response = self
            .get(&format!("/repos/{}/actions/runs", repository))
            .query(&[("head_sha", commit_sha)])
            .send()
            .await?;

        // Permissions not propagated yet, or the run not indexed yet
        if matches!(response.status(), StatusCode::NOT_FOUND | StatusCode::FORBIDDEN) {
            return Ok(BuildRunLookup::NotFoundYet);
        }

        let runs: RunList = handle_response(response).await?;

        // Newest run first
        Ok(runs
            .workflow_runs
            .first()
            .map(WorkflowRun::lookup)
            .unwrap_or(BuildRunLookup::NotFoundYet))
    }
}

#[async_trait]
impl ArtifactSource for ActionsClient {
    async fn download_bundle(&self, repository: &str, run_id: u64, dest: &Path) -> Result<()> {
        let response = self
            .get(&format!("/repos/{}/actions/runs/{}/bundle", repository, run_id))
            .send()
            .await?;

        let body = check_status(response).await?.bytes().await?;

        // Reject garbage before it lands in the workspace
        serde_json::from_slice::<BundleManifest>(&body)
            .map_err(|e| ClientError::ParseError(format!("invalid bundle manifest: {}", e)))?;

        tokio::fs::write(dest, &body).await?;
        Ok(())
    }
}
