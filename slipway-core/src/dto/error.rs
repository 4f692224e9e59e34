//! Error body returned by the orchestrator API

use serde::{Deserialize, Serialize};

/// Machine-readable reason next to the human message
///
/// Several reasons share an HTTP status (two kinds of 409 on the rollback
/// route), so callers branch on the code rather than the message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    NotFound,
    BadRequest,
    /// The (tenant, environment) pair already has an active attempt
    AlreadyInProgress,
    /// The attempt is not in a state that allows the transition
    InvalidState,
    SubdomainTaken,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::NotFound => "not_found",
            ErrorCode::BadRequest => "bad_request",
            ErrorCode::AlreadyInProgress => "already_in_progress",
            ErrorCode::InvalidState => "invalid_state",
            ErrorCode::SubdomainTaken => "subdomain_taken",
            ErrorCode::Internal => "internal",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    /// Absent in bodies from older orchestrators
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
}
