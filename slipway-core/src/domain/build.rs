//! External build run types
//!
//! Build runs belong to the remote CI system. Slipway only observes them by
//! commit SHA.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Result of looking up the build run for a commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum BuildRunLookup {
    /// The run is not (yet) visible to our credential
    NotFoundYet,
    /// The run exists and has not finished
    Running { run_id: u64 },
    /// The run has finished
    Finished {
        run_id: u64,
        status: TerminalBuildStatus,
    },
}

/// Any status after which the monitor stops polling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TerminalBuildStatus {
    Succeeded,
    Failed,
    Cancelled,
}

impl fmt::Display for TerminalBuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminalBuildStatus::Succeeded => write!(f, "succeeded"),
            TerminalBuildStatus::Failed => write!(f, "failed"),
            TerminalBuildStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A finished build as seen by the monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedBuild {
    pub run_id: u64,
    pub status: TerminalBuildStatus,
}
