//! Dispatch outcomes that are not a script response
//!
//! "Not handled here" (reserved or foreign host) and "route not found" (tenant
//! slot without a script) are both 404s, told apart by the
//! `x-slipway-dispatch` header so the fronting proxy can route reserved hosts
//! elsewhere.

use axum::{
    Json,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use slipway_client::ClientError;
use slipway_core::domain::identity::ScriptIdentity;
use thiserror::Error;

/// Response header describing how the dispatcher treated the request
pub const DISPATCH_HEADER: &str = "x-slipway-dispatch";

pub const NOT_HANDLED: &str = "not-handled";
pub const ROUTE_NOT_FOUND: &str = "route-not-found";

#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("missing Host header")]
    MissingHost,

    #[error("{0} is a reserved hostname")]
    ReservedHostnameRefused(String),

    #[error("{0} is not a tenant hostname")]
    ForeignHost(String),

    #[error("no script deployed for {0}")]
    RouteNotFound(ScriptIdentity),

    #[error("invalid request: {0}")]
    BadRequest(String),

    #[error("forwarding failed: {0}")]
    Upstream(#[from] ClientError),
}

impl IntoResponse for RoutingError {
    fn into_response(self) -> Response {
        let (status, marker) = match &self {
            RoutingError::MissingHost
            | RoutingError::ReservedHostnameRefused(_)
            | RoutingError::ForeignHost(_) => (StatusCode::NOT_FOUND, Some(NOT_HANDLED)),
            RoutingError::RouteNotFound(_) => (StatusCode::NOT_FOUND, Some(ROUTE_NOT_FOUND)),
            RoutingError::BadRequest(_) => (StatusCode::BAD_REQUEST, None),
            RoutingError::Upstream(err) => {
                tracing::error!("Dispatch forwarding failed: {}", err);
                (StatusCode::BAD_GATEWAY, None)
            }
        };

        let message = match &self {
            RoutingError::Upstream(_) => "Bad gateway".to_string(),
            other => other.to_string(),
        };

        let mut response = (status, Json(serde_json::json!({ "error": message }))).into_response();
        if let Some(marker) = marker {
            response
                .headers_mut()
                .insert(DISPATCH_HEADER, HeaderValue::from_static(marker));
        }
        response
    }
}
