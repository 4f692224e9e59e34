//! Error types for the Slipway clients

use slipway_core::dto::error::{ErrorBody, ErrorCode};
use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur when talking to the orchestrator or an external API
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// API returned an error status code
    #[error("API error (status {status}): {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Error message from the API
        message: String,
        /// Machine-readable reason, when the orchestrator sent one
        code: Option<ErrorCode>,
    },

    /// Failed to parse response
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// Resource not found
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Writing a downloaded artifact failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl ClientError {
    /// Create an API error from status code and message
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::ApiError {
            status,
            message: message.into(),
            code: None,
        }
    }

    /// Build an API error from a raw response body
    ///
    /// Orchestrator bodies are `{"error": ..., "code": ...}`; anything else is
    /// kept verbatim as the message.
    pub fn from_body(status: u16, body: &str) -> Self {
        match serde_json::from_str::<ErrorBody>(body) {
            Ok(parsed) => Self::ApiError {
                status,
                message: parsed.error,
                code: parsed.code,
            },
            Err(_) => Self::api_error(status, body),
        }
    }

    /// Machine-readable reason of an API error
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::ApiError { code, .. } => *code,
            _ => None,
        }
    }

    /// The (tenant, environment) pair already has an active attempt
    pub fn is_already_in_progress(&self) -> bool {
        self.code() == Some(ErrorCode::AlreadyInProgress)
    }

    /// Check if this error is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_)) || matches!(self, Self::ApiError { status: 404, .. })
    }

    /// Check if this is a 409 from the orchestrator (see [`Self::code`] for which kind)
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::ApiError { status: 409, .. })
    }

    /// Check if this error is a client error (4xx status)
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::ApiError { status, .. } if *status >= 400 && *status < 500)
    }

    /// Check if this error is a server error (5xx status)
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::ApiError { status, .. } if *status >= 500)
    }
}
