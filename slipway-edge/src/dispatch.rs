//! Request dispatch
//!
//! The single handler behind every tenant hostname. Reserved hostnames are
//! refused before anything else looks at the host.

use axum::{
    body::{Body, to_bytes},
    extract::{Request, State},
    http::{HeaderName, HeaderValue, StatusCode, header},
    response::Response,
};
use slipway_client::dispatch::{ForwardRequest, ForwardResponse, Forwarded};
use slipway_core::routing::Resolution;
use tracing::debug;

use crate::EdgeState;
use crate::error::RoutingError;

/// Connection-scoped headers that are never forwarded
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

pub const FORWARDED_HOST_HEADER: &str = "x-forwarded-host";

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| h.eq_ignore_ascii_case(name))
}

pub async fn dispatch(
    State(state): State<EdgeState>,
    request: Request,
) -> Result<Response, RoutingError> {
    let host = request_host(&request).ok_or(RoutingError::MissingHost)?;

    let identity = match state.resolver.resolve(&host) {
        Resolution::Reserved => {
            debug!("Refusing reserved hostname {}", host);
            return Err(RoutingError::ReservedHostnameRefused(host));
        }
        Resolution::Foreign => {
            debug!("Not a tenant hostname: {}", host);
            return Err(RoutingError::ForeignHost(host));
        }
        Resolution::Tenant { identity, .. } => identity,
    };

    let forward = forward_request(request, &host, state.max_body_bytes).await?;

    match state.forwarder.forward(&identity, forward).await? {
        Forwarded::Response(response) => Ok(into_response(response)),
        Forwarded::ScriptMissing => {
            debug!("No script deployed for {}", identity);
            Err(RoutingError::RouteNotFound(identity))
        }
    }
}

fn request_host(request: &Request) -> Option<String> {
    request
        .headers()
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .or_else(|| request.uri().authority().map(|a| a.as_str().to_string()))
}

/// Strips connection-scoped headers and buffers the body
async fn forward_request(
    request: Request,
    host: &str,
    max_body_bytes: usize,
) -> Result<ForwardRequest, RoutingError> {
    let (parts, body) = request.into_parts();

    // Headers named in `Connection` are hop-by-hop too
    let connection_scoped: Vec<String> = parts
        .headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(|token| token.trim().to_ascii_lowercase())
        .collect();

    let mut headers: Vec<(String, String)> = parts
        .headers
        .iter()
        .filter(|(name, _)| {
            let name = name.as_str();
            !is_hop_by_hop(name)
                && !connection_scoped.iter().any(|c| c == name)
                && name != header::HOST.as_str()
                && name != header::CONTENT_LENGTH.as_str()
        })
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();
    headers.push((FORWARDED_HOST_HEADER.to_string(), host.to_string()));

    let body = to_bytes(body, max_body_bytes)
        .await
        .map_err(|e| RoutingError::BadRequest(format!("unreadable body: {}", e)))?;

    Ok(ForwardRequest {
        method: parts.method.as_str().to_string(),
        path_and_query: parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string()),
        headers,
        body: body.to_vec(),
    })
}

fn into_response(forwarded: ForwardResponse) -> Response {
    let mut response = Response::new(Body::from(forwarded.body));
    *response.status_mut() = StatusCode::from_u16(forwarded.status).unwrap_or(StatusCode::BAD_GATEWAY);

    for (name, value) in forwarded.headers {
        if is_hop_by_hop(&name) || name.eq_ignore_ascii_case("content-length") {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            response.headers_mut().append(name, value);
        }
    }

    response
}
