//! Pipeline errors
//!
//! Every way a deployment attempt can end early. Each variant except
//! [`PipelineError::Cancelled`] maps to the [`DeploymentFailure`] recorded as
//! the attempt's terminal reason.

use slipway_client::ClientError;
use slipway_core::domain::deployment::{DeploymentFailure, FailureKind};
use slipway_core::domain::file_set::FileSetError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("branch {branch} kept moving; gave up after {attempts} synchronization attempts")]
    SyncConflict { branch: String, attempts: u32 },

    #[error("invalid file set: {0}")]
    InvalidFileSet(#[from] FileSetError),

    #[error("bundle of {size} bytes exceeds the {limit} byte script limit ({reason})")]
    BundleTooLarge {
        size: usize,
        limit: usize,
        reason: &'static str,
    },

    #[error("entry module '{entry}' is not among the uploaded modules [{modules}]")]
    EntryModuleMismatch { entry: String, modules: String },

    #[error("upload part '{name}' appears more than once in the bundle")]
    DuplicatePart { name: String },

    #[error("build run {run_id} failed")]
    BuildFailed { run_id: u64 },

    #[error("build run {run_id} was cancelled")]
    BuildCancelled { run_id: u64 },

    #[error("build for commit {commit_sha} did not finish: {reason}")]
    BuildMonitorTimeout { commit_sha: String, reason: String },

    #[error("deployment was cancelled")]
    Cancelled,

    #[error("upstream call failed: {0}")]
    Upstream(#[from] ClientError),

    #[error("workspace error: {0}")]
    Workspace(#[from] std::io::Error),
}

impl PipelineError {
    /// Terminal reason to record, or `None` when the attempt was cancelled
    pub fn failure(&self) -> Option<DeploymentFailure> {
        let kind = match self {
            PipelineError::Cancelled => return None,
            PipelineError::SyncConflict { .. } => FailureKind::SyncConflict,
            PipelineError::InvalidFileSet(_) => FailureKind::InvalidFileSet,
            PipelineError::BundleTooLarge { .. } => FailureKind::BundleTooLarge,
            PipelineError::EntryModuleMismatch { .. } => FailureKind::EntryModuleMismatch,
            PipelineError::DuplicatePart { .. } => FailureKind::InvalidBundle,
            PipelineError::BuildFailed { .. } => FailureKind::BuildFailed,
            PipelineError::BuildCancelled { .. } => FailureKind::BuildCancelled,
            PipelineError::BuildMonitorTimeout { .. } => FailureKind::Timeout,
            PipelineError::Upstream(_) => FailureKind::Upstream,
            PipelineError::Workspace(_) => FailureKind::Internal,
        };

        Some(DeploymentFailure::new(kind, self.to_string()))
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_mapping() {
        let err = PipelineError::SyncConflict {
            branch: "main".to_string(),
            attempts: 3,
        };
        let failure = err.failure().unwrap();
        assert_eq!(failure.kind, FailureKind::SyncConflict);
        assert!(failure.message.contains("3 synchronization attempts"));

        let err = PipelineError::BuildMonitorTimeout {
            commit_sha: "abc".to_string(),
            reason: "timed out after 1800s".to_string(),
        };
        assert_eq!(err.failure().unwrap().kind, FailureKind::Timeout);

        assert!(PipelineError::Cancelled.failure().is_none());
    }

    #[test]
    fn test_empty_file_set_maps_to_invalid() {
        let failure = PipelineError::from(FileSetError::Empty).failure().unwrap();
        assert_eq!(failure.kind, FailureKind::InvalidFileSet);
        assert!(!failure.message.is_empty());
    }
}
