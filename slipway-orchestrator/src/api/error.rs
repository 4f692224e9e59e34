//! API Error Handling
//!
//! Unified error types and conversion for API responses. Every error body
//! carries a machine-readable `code` next to the message.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use slipway_core::dto::error::{ErrorBody, ErrorCode};

use crate::service::deployment_service::DeploymentError;
use crate::service::tenant_service::TenantError;

/// API error type
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(ErrorCode, String),
    DatabaseError(sqlx::Error),
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, ErrorCode::NotFound, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, ErrorCode::BadRequest, msg),
            ApiError::Conflict(code, msg) => (StatusCode::CONFLICT, code, msg),
            ApiError::DatabaseError(err) => {
                tracing::error!("Database error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorCode::Internal,
                    "Internal server error".to_string(),
                )
            }
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::Internal, msg)
            }
        };

        let body = ErrorBody {
            error: message,
            code: Some(code),
        };
        (status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::DatabaseError(err)
    }
}

impl From<DeploymentError> for ApiError {
    fn from(err: DeploymentError) -> Self {
        match err {
            DeploymentError::NotFound(id) => ApiError::NotFound(format!("Deployment {} not found", id)),
            DeploymentError::TenantNotFound(id) => {
                ApiError::NotFound(format!("Tenant {} not found", id))
            }
            DeploymentError::AlreadyInProgress {
                tenant_id,
                environment,
            } => ApiError::Conflict(
                ErrorCode::AlreadyInProgress,
                format!(
                    "A {} deployment for tenant {} is already in progress",
                    environment, tenant_id
                ),
            ),
            DeploymentError::InvalidState(msg) => ApiError::Conflict(ErrorCode::InvalidState, msg),
            DeploymentError::ValidationError(msg) => ApiError::BadRequest(msg),
            DeploymentError::DatabaseError(err) => ApiError::DatabaseError(err),
        }
    }
}

impl From<TenantError> for ApiError {
    fn from(err: TenantError) -> Self {
        match err {
            TenantError::NotFound(id) => ApiError::NotFound(format!("Tenant {} not found", id)),
            TenantError::SubdomainTaken(subdomain) => {
                ApiError::Conflict(
                    ErrorCode::SubdomainTaken,
                    format!("Subdomain {} is already registered", subdomain),
                )
            }
            TenantError::ValidationError(msg) => ApiError::BadRequest(msg),
            TenantError::DatabaseError(err) => ApiError::DatabaseError(err),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
