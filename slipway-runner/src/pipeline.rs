//! Deployment pipeline
//!
//! Drives one claimed attempt from file set to live script:
//!
//! ```text
//! fetch files -> sync (one commit) -> await build -> download -> publish
//! ```
//!
//! Cancellation is honored up to the `deploying` transition. Once the tracker
//! accepted `deploying`, the bundle is published no matter what.

use std::sync::Arc;

use slipway_client::DeploymentExecutionInfo;
use slipway_client::builds::ArtifactSource;
use slipway_client::files::FileSetProvider;
use slipway_core::domain::build::TerminalBuildStatus;
use tracing::{info, warn};

use crate::context::Context;
use crate::error::{PipelineError, Result};
use crate::monitor::BuildMonitor;
use crate::publish::{PublishResult, Publisher};
use crate::repository::DeploymentRepository;
use crate::sync::Synchronizer;

#[derive(Clone)]
pub struct Pipeline {
    files: Arc<dyn FileSetProvider>,
    synchronizer: Synchronizer,
    monitor: BuildMonitor,
    artifacts: Arc<dyn ArtifactSource>,
    publisher: Publisher,
    deployments: Arc<dyn DeploymentRepository>,
}

impl Pipeline {
    pub fn new(
        files: Arc<dyn FileSetProvider>,
        synchronizer: Synchronizer,
        monitor: BuildMonitor,
        artifacts: Arc<dyn ArtifactSource>,
        publisher: Publisher,
        deployments: Arc<dyn DeploymentRepository>,
    ) -> Self {
        Self {
            files,
            synchronizer,
            monitor,
            artifacts,
            publisher,
            deployments,
        }
    }

    pub async fn run(&self, ctx: &Context, info: &DeploymentExecutionInfo) -> Result<PublishResult> {
        let deployment = &info.deployment;
        let tenant = &info.tenant;
        let environment = deployment.environment;

        ctx.log_info(format!(
            "Deploying version {} of tenant {} to {}",
            deployment.version, tenant.id, environment
        ));

        let file_set = self
            .files
            .fetch_file_set(&tenant.id, &deployment.version)
            .await?;
        file_set.validate()?;
        ctx.log_info(format!("Fetched {} files", file_set.len()));

        ensure_not_cancelled(ctx)?;

        let branch = environment.branch();
        let commit = self
            .synchronizer
            .sync(
                &tenant.repository,
                branch,
                &file_set,
                &format!("Deploy {} to {}", deployment.version, environment),
            )
            .await?;
        ctx.log_info(format!(
            "Committed {} to {} ({} blobs uploaded)",
            commit.sha, branch, commit.blobs_uploaded
        ));

        self.deployments
            .record_commit(deployment.id, &commit.sha)
            .await?;

        let build = self
            .monitor
            .await_build(
                &tenant.repository,
                &commit.sha,
                tenant.repository_permissions_changed_at,
                &ctx.cancel,
            )
            .await?;

        match build.status {
            TerminalBuildStatus::Succeeded => {
                ctx.log_info(format!("Build run {} succeeded", build.run_id));
            }
            TerminalBuildStatus::Failed => {
                return Err(PipelineError::BuildFailed {
                    run_id: build.run_id,
                });
            }
            TerminalBuildStatus::Cancelled => {
                return Err(PipelineError::BuildCancelled {
                    run_id: build.run_id,
                });
            }
        }

        ensure_not_cancelled(ctx)?;

        if let Err(e) = self.deployments.mark_deploying(deployment.id).await {
            // The tracker refuses `deploying` once the attempt was cancelled
            if e.is_conflict() {
                info!("Deployment {} was cancelled before publishing", deployment.id);
                return Err(PipelineError::Cancelled);
            }
            return Err(e.into());
        }

        let bundle_path = ctx.workspace.bundle_path();
        self.artifacts
            .download_bundle(&tenant.repository, build.run_id, &bundle_path)
            .await?;
        let bundle = ctx.workspace.load_bundle().await?;
        ctx.log_info(format!(
            "Downloaded bundle: {} modules, {} assets",
            bundle.modules.len(),
            bundle.assets.len()
        ));

        let result = self.publisher.publish(tenant, environment, bundle).await?;
        if result.offloaded_assets > 0 {
            ctx.log_info(format!(
                "Offloaded {} assets to the asset path",
                result.offloaded_assets
            ));
        }
        ctx.log_debug(format!("Release {} (etag {})", result.release, result.etag));
        ctx.log_info(format!("Published {} at {}", result.identity, result.url));

        Ok(result)
    }
}

fn ensure_not_cancelled(ctx: &Context) -> Result<()> {
    if ctx.cancel.is_cancelled() {
        warn!("Deployment {} cancelled", ctx.deployment_id);
        return Err(PipelineError::Cancelled);
    }
    Ok(())
}
