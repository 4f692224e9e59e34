//! Deployment poller
//!
//! Polls the orchestrator for pending deployments and executes them.
//! Each attempt runs in its own task with a context holding its logs,
//! workspace and cancellation token. Concurrency is bounded by a semaphore;
//! per-(tenant, environment) exclusion is the orchestrator's job.
//!
//! While an attempt runs, a watcher heartbeats the orchestrator to keep the
//! runner's lease. The final report is retried, since an attempt whose
//! outcome never arrives holds its (tenant, environment) pair until the lease
//! expires.

use anyhow::Result;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{self, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use slipway_core::domain::deployment::{DeploymentFailure, FailureKind};

use crate::config::Config;
use crate::context::Context;
use crate::pipeline::Pipeline;
use crate::repository::{DeploymentRepository, LogRepository};
use crate::workspace::Workspace;

/// Intervals and limits the poller runs with
#[derive(Debug, Clone)]
pub struct PollerSettings {
    pub poll_interval: Duration,
    pub log_send_interval: Duration,
    /// How often a running attempt heartbeats and checks whether it was cancelled
    pub cancel_check_interval: Duration,
    pub max_parallel_deployments: usize,
    pub workspace_base: PathBuf,
    pub report_retry: ReportRetry,
}

impl From<&Config> for PollerSettings {
    fn from(config: &Config) -> Self {
        Self {
            poll_interval: config.poll_interval,
            log_send_interval: config.log_send_interval,
            cancel_check_interval: config.poll_interval,
            max_parallel_deployments: config.max_parallel_deployments,
            workspace_base: config.workspace_base.clone(),
            report_retry: ReportRetry::default(),
        }
    }
}

/// Backoff for the final status report
#[derive(Debug, Clone)]
pub struct ReportRetry {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ReportRetry {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Deployment poller that continuously polls for and executes attempts
pub struct DeploymentPoller {
    settings: PollerSettings,
    deployments: Arc<dyn DeploymentRepository>,
    logs: Arc<dyn LogRepository>,
    pipeline: Arc<Pipeline>,
    semaphore: Arc<Semaphore>,
}

impl DeploymentPoller {
    pub fn new(
        settings: PollerSettings,
        deployments: Arc<dyn DeploymentRepository>,
        logs: Arc<dyn LogRepository>,
        pipeline: Pipeline,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(settings.max_parallel_deployments));
        Self {
            settings,
            deployments,
            logs,
            pipeline: Arc::new(pipeline),
            semaphore,
        }
    }

    /// Starts the polling loop
    pub async fn run(&self) -> Result<()> {
        info!(
            "Starting deployment poller (interval: {:?}, max parallel: {})",
            self.settings.poll_interval, self.settings.max_parallel_deployments
        );

        let mut interval = time::interval(self.settings.poll_interval);

        loop {
            interval.tick().await;

            debug!("Polling for pending deployments");

            match self.poll_once().await {
                Ok(started) => {
                    if !started.is_empty() {
                        info!("Started {} deployment(s) this cycle", started.len());
                    }
                }
                Err(e) => {
                    error!("Error during poll cycle: {:#}", e);
                }
            }
        }
    }

    /// Performs a single poll cycle
    ///
    /// Returns the handles of the attempts started. The loop does not wait for
    /// them: a long build must not hold up other tenants.
    pub async fn poll_once(&self) -> Result<Vec<JoinHandle<()>>> {
        let pending = self.deployments.fetch_pending().await?;

        if pending.is_empty() {
            debug!("No deployments pending");
            return Ok(Vec::new());
        }

        let mut handles = Vec::new();

        for deployment in pending {
            // Skip for now when at capacity; it stays pending for the next cycle
            match self.semaphore.clone().try_acquire_owned() {
                Ok(permit) => handles.push(self.spawn_deployment_task(deployment.id, permit)),
                Err(_) => {
                    debug!(
                        "Max parallel deployments reached, leaving {} for later",
                        deployment.id
                    );
                    break;
                }
            }
        }

        Ok(handles)
    }

    fn spawn_deployment_task(&self, id: Uuid, permit: OwnedSemaphorePermit) -> JoinHandle<()> {
        let settings = self.settings.clone();
        let deployments = Arc::clone(&self.deployments);
        let logs = Arc::clone(&self.logs);
        let pipeline = Arc::clone(&self.pipeline);

        tokio::spawn(async move {
            if let Err(e) = execute_deployment(id, settings, deployments, logs, pipeline).await {
                error!("Deployment {} did not complete cleanly: {:#}", id, e);
            }
            drop(permit);
        })
    }
}

/// Claims and drives one attempt, then reports its outcome
async fn execute_deployment(
    id: Uuid,
    settings: PollerSettings,
    deployments: Arc<dyn DeploymentRepository>,
    logs: Arc<dyn LogRepository>,
    pipeline: Arc<Pipeline>,
) -> Result<()> {
    let info = match deployments.claim(id).await {
        Ok(info) => info,
        Err(e) if e.is_conflict() || e.is_not_found() => {
            debug!("Deployment {} was taken by someone else: {}", id, e);
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    info!(
        "Claimed deployment {} ({} {} -> {})",
        id, info.tenant.id, info.deployment.version, info.deployment.environment
    );

    let tracker = deployments.as_ref();

    let workspace = match Workspace::create(&settings.workspace_base, id).await {
        Ok(workspace) => workspace,
        Err(e) => {
            let failure = DeploymentFailure::new(
                FailureKind::Internal,
                format!("Failed to create workspace: {}", e),
            );
            report_with_retry(id, &settings.report_retry, move || {
                tracker.complete_failed(id, failure.clone())
            })
            .await?;
            return Err(e.into());
        }
    };

    let ctx = Context::new(id, workspace);

    let stop_logs = CancellationToken::new();
    let log_sender = spawn_log_sender(
        Arc::clone(&ctx),
        Arc::clone(&logs),
        settings.log_send_interval,
        stop_logs.clone(),
    );
    let cancel_watcher = spawn_cancel_watcher(
        Arc::clone(&ctx),
        Arc::clone(&deployments),
        settings.cancel_check_interval,
    );

    let result = pipeline.run(&ctx, &info).await;

    cancel_watcher.abort();
    let _ = cancel_watcher.await;

    let report = match result {
        Ok(published) => {
            info!("Deployment {} live at {}", id, published.url);
            let url = published.url.as_str();
            report_with_retry(id, &settings.report_retry, move || {
                tracker.complete_success(id, url)
            })
            .await
        }
        Err(e) => match e.failure() {
            Some(failure) => {
                warn!("Deployment {} failed: {}", id, failure);
                ctx.log_error(failure.message.clone());
                report_with_retry(id, &settings.report_retry, move || {
                    tracker.complete_failed(id, failure.clone())
                })
                .await
            }
            None => {
                info!("Deployment {} stopped after cancellation", id);
                ctx.log_warning("Deployment cancelled");
                Ok(())
            }
        },
    };

    // The sender ships whatever is still buffered before it exits
    stop_logs.cancel();
    let _ = log_sender.await;

    if let Err(e) = ctx.workspace.cleanup().await {
        warn!("Failed to clean up workspace for {}: {}", id, e);
    }

    report?;
    Ok(())
}

/// Sends a final status report, retrying transient failures with capped backoff
///
/// A 4xx is returned at once: the tracker has already moved the attempt on,
/// for instance after a cancellation or an expired lease.
async fn report_with_retry<F, Fut>(
    id: Uuid,
    retry: &ReportRetry,
    mut report: F,
) -> slipway_client::Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = slipway_client::Result<()>>,
{
    let mut delay = retry.initial_delay;
    let mut attempt = 1;

    loop {
        match report().await {
            Ok(()) => return Ok(()),
            Err(e) if e.is_client_error() || attempt >= retry.max_attempts => return Err(e),
            Err(e) => {
                warn!(
                    "Reporting the outcome of {} failed (attempt {}/{}): {}; retrying in {:?}",
                    id, attempt, retry.max_attempts, e, delay
                );
                time::sleep(delay).await;
                delay = delay.saturating_mul(2).min(retry.max_delay);
                attempt += 1;
            }
        }
    }
}

/// Periodically ships buffered logs to the orchestrator
///
/// Once `stop` fires, the buffer is drained one last time and the task ends.
fn spawn_log_sender(
    ctx: Arc<Context>,
    logs: Arc<dyn LogRepository>,
    interval: Duration,
    stop: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);

        loop {
            let stopping = tokio::select! {
                _ = stop.cancelled() => true,
                _ = ticker.tick() => false,
            };

            let entries = ctx.drain_logs();
            if !entries.is_empty() {
                debug!("Sending {} logs for {}", entries.len(), ctx.deployment_id);
                if let Err(e) = logs.send_logs(ctx.deployment_id, entries).await {
                    error!("Failed to send logs for {}: {}", ctx.deployment_id, e);
                }
            }

            if stopping {
                return;
            }
        }
    })
}

/// Heartbeats the attempt and trips its cancellation token once the tracker
/// reports it finished elsewhere (cancelled, or failed by an expired lease)
fn spawn_cancel_watcher(
    ctx: Arc<Context>,
    deployments: Arc<dyn DeploymentRepository>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);

        loop {
            ticker.tick().await;

            match deployments.heartbeat(ctx.deployment_id).await {
                Ok(status) if status.is_terminal() => {
                    info!("Deployment {} is {} remotely; stopping", ctx.deployment_id, status);
                    ctx.cancel.cancel();
                    return;
                }
                Ok(_) => {}
                Err(e) => debug!("Heartbeat for {} failed: {}", ctx.deployment_id, e),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use slipway_client::ClientError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn retry() -> ReportRetry {
        ReportRetry {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(3),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_report_retries_transient_failures_with_capped_backoff() {
        let calls = &AtomicU32::new(0);
        let started = time::Instant::now();

        let result = report_with_retry(Uuid::new_v4(), &retry(), || async move {
            match calls.fetch_add(1, Ordering::SeqCst) {
                0 | 1 | 2 => Err(ClientError::api_error(503, "orchestrator restarting")),
                _ => Ok(()),
            }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        // 1s + 2s + 3s (capped)
        assert_eq!(started.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_report_gives_up_after_max_attempts() {
        let calls = &AtomicU32::new(0);

        let result = report_with_retry(Uuid::new_v4(), &retry(), || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ClientError::InternalError("connection reset".to_string()))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_report_rejected_by_tracker_is_not_retried() {
        let calls = &AtomicU32::new(0);

        let result = report_with_retry(Uuid::new_v4(), &retry(), || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ClientError::from_body(
                409,
                r#"{"error":"cannot move deployment from failed to success","code":"invalid_state"}"#,
            ))
        })
        .await;

        assert!(result.unwrap_err().is_conflict());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
