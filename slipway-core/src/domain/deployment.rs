//! Deployment attempt domain types
//!
//! One attempt exists per (version, environment) deploy request. The state
//! machine is:
//!
//! ```text
//! pending -> building -> deploying -> success
//!    |          |            |
//!    |          |            +------> failed
//!    +----------+--> cancelled / failed
//! ```
//!
//! Transition methods only mutate the in-memory record; persistence and the
//! per-(tenant, environment) uniqueness rule live in the orchestrator.
//!
//! A claimed attempt is held under a lease. The runner renews it with
//! heartbeats; an attempt whose lease ran out is failed so the pair can take
//! new deployments again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::environment::Environment;
use crate::domain::log::{LogEntry, LogLevel};

/// Deployment attempt record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    pub id: Uuid,
    pub tenant_id: String,
    /// Version (immutable file set) being deployed
    pub version: String,
    pub environment: Environment,
    pub status: DeploymentStatus,
    pub requested_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub runner_id: Option<String>,
    /// Last sign of life from the runner holding the attempt
    #[serde(default)]
    pub heartbeat_at: Option<DateTime<Utc>>,
    /// Commit produced by source synchronization
    pub commit_sha: Option<String>,
    /// Resulting public URL (set on success)
    pub url: Option<String>,
    pub error: Option<DeploymentFailure>,
    /// Attempt this one rolls back, if it is a rollback
    pub rollback_from: Option<Uuid>,
}

/// Deployment lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    Pending,
    Building,
    Deploying,
    Success,
    Failed,
    Cancelled,
}

impl DeploymentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeploymentStatus::Success | DeploymentStatus::Failed | DeploymentStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::Pending => "pending",
            DeploymentStatus::Building => "building",
            DeploymentStatus::Deploying => "deploying",
            DeploymentStatus::Success => "success",
            DeploymentStatus::Failed => "failed",
            DeploymentStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(DeploymentStatus::Pending),
            "building" => Some(DeploymentStatus::Building),
            "deploying" => Some(DeploymentStatus::Deploying),
            "success" => Some(DeploymentStatus::Success),
            "failed" => Some(DeploymentStatus::Failed),
            "cancelled" => Some(DeploymentStatus::Cancelled),
            _ => None,
        }
    }

    /// Non-terminal statuses, as stored in the database
    pub const ACTIVE: [DeploymentStatus; 3] = [
        DeploymentStatus::Pending,
        DeploymentStatus::Building,
        DeploymentStatus::Deploying,
    ];
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a deployment ended in `failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Branch kept moving under the synchronizer
    SyncConflict,
    /// Bundle exceeds the inline script limit and cannot be split
    BundleTooLarge,
    /// Declared entry module is not among the uploaded modules
    EntryModuleMismatch,
    /// Two upload parts would share a name
    InvalidBundle,
    /// The file set for the version was rejected
    InvalidFileSet,
    /// External build finished unsuccessfully
    BuildFailed,
    /// External build was cancelled
    BuildCancelled,
    /// Build never became visible or never finished in time
    Timeout,
    /// An upstream API call failed
    Upstream,
    Internal,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::SyncConflict => "sync_conflict",
            FailureKind::BundleTooLarge => "bundle_too_large",
            FailureKind::EntryModuleMismatch => "entry_module_mismatch",
            FailureKind::InvalidBundle => "invalid_bundle",
            FailureKind::InvalidFileSet => "invalid_file_set",
            FailureKind::BuildFailed => "build_failed",
            FailureKind::BuildCancelled => "build_cancelled",
            FailureKind::Timeout => "timeout",
            FailureKind::Upstream => "upstream",
            FailureKind::Internal => "internal",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        [
            FailureKind::SyncConflict,
            FailureKind::BundleTooLarge,
            FailureKind::EntryModuleMismatch,
            FailureKind::InvalidBundle,
            FailureKind::InvalidFileSet,
            FailureKind::BuildFailed,
            FailureKind::BuildCancelled,
            FailureKind::Timeout,
            FailureKind::Upstream,
            FailureKind::Internal,
        ]
        .into_iter()
        .find(|kind| kind.as_str() == s)
    }
}

/// Terminal failure reason of a deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl DeploymentFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for DeploymentFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)
    }
}

/// Rejected state transition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("cannot move deployment from {from} to {to}")]
    InvalidTransition {
        from: DeploymentStatus,
        to: DeploymentStatus,
    },

    #[error("a successful deployment requires a resulting URL")]
    MissingUrl,

    #[error("a failed deployment requires a reason")]
    MissingReason,

    #[error("deployment is {0}, no runner holds it")]
    NotClaimed(DeploymentStatus),
}

impl Deployment {
    /// Creates a new pending attempt
    pub fn new(
        tenant_id: impl Into<String>,
        version: impl Into<String>,
        environment: Environment,
        rollback_from: Option<Uuid>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.into(),
            version: version.into(),
            environment,
            status: DeploymentStatus::Pending,
            requested_at: Utc::now(),
            started_at: None,
            completed_at: None,
            runner_id: None,
            heartbeat_at: None,
            commit_sha: None,
            url: None,
            error: None,
            rollback_from,
        }
    }

    fn ensure_status(&self, allowed: &[DeploymentStatus], to: DeploymentStatus) -> Result<(), TransitionError> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(TransitionError::InvalidTransition {
                from: self.status,
                to,
            })
        }
    }

    /// pending -> building
    ///
    /// Returns the log entry that must be appended to the attempt's log.
    pub fn mark_building(&mut self, runner_id: impl Into<String>) -> Result<LogEntry, TransitionError> {
        self.ensure_status(&[DeploymentStatus::Pending], DeploymentStatus::Building)?;

        let runner_id = runner_id.into();
        let now = Utc::now();
        self.status = DeploymentStatus::Building;
        self.started_at = Some(now);
        self.heartbeat_at = Some(now);
        self.runner_id = Some(runner_id.clone());

        Ok(LogEntry {
            timestamp: now,
            level: LogLevel::Info,
            message: format!(
                "Building {} for {} on runner {}",
                self.version, self.environment, runner_id
            ),
        })
    }

    /// building -> deploying
    pub fn mark_deploying(&mut self) -> Result<(), TransitionError> {
        self.ensure_status(&[DeploymentStatus::Building], DeploymentStatus::Deploying)?;
        self.status = DeploymentStatus::Deploying;
        Ok(())
    }

    /// deploying -> success
    pub fn mark_success(&mut self, url: impl Into<String>) -> Result<(), TransitionError> {
        let url = url.into();
        if url.trim().is_empty() {
            return Err(TransitionError::MissingUrl);
        }
        self.ensure_status(&[DeploymentStatus::Deploying], DeploymentStatus::Success)?;

        self.status = DeploymentStatus::Success;
        self.completed_at = Some(Utc::now());
        self.url = Some(url);
        Ok(())
    }

    /// any non-terminal -> failed
    pub fn mark_failed(&mut self, failure: DeploymentFailure) -> Result<(), TransitionError> {
        if failure.message.trim().is_empty() {
            return Err(TransitionError::MissingReason);
        }
        self.ensure_status(&DeploymentStatus::ACTIVE, DeploymentStatus::Failed)?;

        self.status = DeploymentStatus::Failed;
        self.completed_at = Some(Utc::now());
        self.error = Some(failure);
        Ok(())
    }

    /// pending | building -> cancelled
    ///
    /// Deploying attempts cannot be cancelled: upload has started and
    /// publishing is the point of no return.
    pub fn mark_cancelled(&mut self) -> Result<(), TransitionError> {
        self.ensure_status(
            &[DeploymentStatus::Pending, DeploymentStatus::Building],
            DeploymentStatus::Cancelled,
        )?;
        self.status = DeploymentStatus::Cancelled;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Whether a runner currently holds the attempt
    pub fn is_claimed(&self) -> bool {
        matches!(
            self.status,
            DeploymentStatus::Building | DeploymentStatus::Deploying
        )
    }

    /// Renews the runner's lease
    pub fn heartbeat(&mut self, at: DateTime<Utc>) -> Result<(), TransitionError> {
        if !self.is_claimed() {
            return Err(TransitionError::NotClaimed(self.status));
        }
        self.heartbeat_at = Some(at);
        Ok(())
    }

    /// True when a claimed attempt has not been heard from for `timeout`
    pub fn lease_expired(&self, now: DateTime<Utc>, timeout: chrono::Duration) -> bool {
        let Some(last_seen) = self.heartbeat_at.or(self.started_at) else {
            return false;
        };
        self.is_claimed() && now - last_seen > timeout
    }

    fn is_successful_production(&self) -> bool {
        self.status == DeploymentStatus::Success && self.environment == Environment::Production
    }

    /// Earlier successful production attempt this one would roll back to
    ///
    /// `history` is every attempt of the same tenant. Candidates that were
    /// themselves rolled back, or that carry the same version, are skipped so a
    /// rollback can never land on the version it is rolling away from.
    pub fn rollback_target<'a>(&self, history: &'a [Deployment]) -> Option<&'a Deployment> {
        if !self.is_successful_production() {
            return None;
        }

        let already_rolled_back = history.iter().any(|d| d.rollback_from == Some(self.id));
        if already_rolled_back {
            return None;
        }

        history
            .iter()
            .filter(|d| {
                d.id != self.id
                    && d.tenant_id == self.tenant_id
                    && d.is_successful_production()
                    && d.requested_at < self.requested_at
                    && d.version != self.version
                    && !history.iter().any(|r| r.rollback_from == Some(d.id))
            })
            .max_by_key(|d| d.requested_at)
    }

    pub fn can_rollback(&self, history: &[Deployment]) -> bool {
        self.rollback_target(history).is_some()
    }
}
