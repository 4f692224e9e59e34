//! Build trigger monitor
//!
//! Waits for the external build of a commit to finish. Right after a
//! repository's permissions change, the CI system can run the build but keep
//! answering "not found" to our credential for a while. Lookups that come back
//! [`BuildRunLookup::NotFoundYet`] are therefore retried like a running build;
//! only the attempt budget or the overall timeout turns them into a failure.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use slipway_client::builds::BuildStatusSource;
use slipway_core::domain::build::{BuildRunLookup, CompletedBuild};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, Result};

/// Polling policy of the monitor
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Upper bound for the whole wait, grace period included
    pub timeout: Duration,
    /// Delay before the second poll; doubles after every poll
    pub poll_interval: Duration,
    pub max_interval: Duration,
    pub max_attempts: u32,
    /// Extra wait before the first poll when permissions changed recently
    pub grace_period: Duration,
    /// How recent a permission change has to be to trigger the grace period
    pub recency_window: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30 * 60),
            poll_interval: Duration::from_secs(5),
            max_interval: Duration::from_secs(60),
            max_attempts: 30,
            grace_period: Duration::from_secs(15),
            recency_window: Duration::from_secs(10 * 60),
        }
    }
}

impl MonitorConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.poll_interval.is_zero() {
            anyhow::bail!("build poll interval must be greater than 0");
        }
        if self.max_interval < self.poll_interval {
            anyhow::bail!("build max interval must not be below the poll interval");
        }
        if self.max_attempts == 0 {
            anyhow::bail!("build max attempts must be greater than 0");
        }
        if self.timeout.is_zero() {
            anyhow::bail!("build timeout must be greater than 0");
        }
        Ok(())
    }
}

/// Polls the CI system until a commit's build reaches a terminal status
#[derive(Clone)]
pub struct BuildMonitor {
    source: Arc<dyn BuildStatusSource>,
    config: MonitorConfig,
}

impl BuildMonitor {
    pub fn new(source: Arc<dyn BuildStatusSource>, config: MonitorConfig) -> Self {
        Self { source, config }
    }

    /// Waits for the build of `commit_sha`
    ///
    /// Returns the finished build whatever its conclusion; failed and
    /// cancelled builds are for the caller to judge.
    pub async fn await_build(
        &self,
        repository: &str,
        commit_sha: &str,
        permissions_changed_at: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<CompletedBuild> {
        let wait = self.poll_until_finished(repository, commit_sha, permissions_changed_at, cancel);

        match tokio::time::timeout(self.config.timeout, wait).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "Build for {}@{} did not finish within {:?}",
                    repository, commit_sha, self.config.timeout
                );
                Err(PipelineError::BuildMonitorTimeout {
                    commit_sha: commit_sha.to_string(),
                    reason: format!("timed out after {:?}", self.config.timeout),
                })
            }
        }
    }

    fn in_grace_window(&self, permissions_changed_at: DateTime<Utc>) -> bool {
        let since = Utc::now().signed_duration_since(permissions_changed_at);
        match since.to_std() {
            Ok(elapsed) => elapsed < self.config.recency_window,
            // Timestamp in the future: treat as just changed
            Err(_) => true,
        }
    }

    async fn poll_until_finished(
        &self,
        repository: &str,
        commit_sha: &str,
        permissions_changed_at: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<CompletedBuild> {
        if self.in_grace_window(permissions_changed_at) {
            info!(
                "Repository permissions changed recently; waiting {:?} before polling",
                self.config.grace_period
            );
            sleep_or_cancel(self.config.grace_period, cancel).await?;
        }

        let mut delay = self.config.poll_interval;

        for attempt in 1..=self.config.max_attempts {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }

            match self.source.run_for_commit(repository, commit_sha).await {
                Ok(BuildRunLookup::Finished { run_id, status }) => {
                    info!("Build run {} for {} finished: {}", run_id, commit_sha, status);
                    return Ok(CompletedBuild { run_id, status });
                }
                Ok(BuildRunLookup::Running { run_id }) => {
                    debug!("Build run {} still running (poll {})", run_id, attempt);
                }
                Ok(BuildRunLookup::NotFoundYet) => {
                    debug!(
                        "No build visible yet for {} (poll {}/{})",
                        commit_sha, attempt, self.config.max_attempts
                    );
                }
                Err(e) => {
                    warn!("Build status lookup failed (poll {}): {}", attempt, e);
                }
            }

            if attempt < self.config.max_attempts {
                sleep_or_cancel(delay, cancel).await?;
                delay = next_delay(delay, self.config.max_interval);
            }
        }

        Err(PipelineError::BuildMonitorTimeout {
            commit_sha: commit_sha.to_string(),
            reason: format!("no finished build after {} polls", self.config.max_attempts),
        })
    }
}

/// Doubles the poll delay up to `max_interval`
fn next_delay(delay: Duration, max_interval: Duration) -> Duration {
    delay.saturating_mul(2).min(max_interval)
}

async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> Result<()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PipelineError::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}
