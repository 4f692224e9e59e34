//! API Module
//!
//! HTTP API layer for the orchestrator.
//! Each submodule handles endpoints for a specific domain.

pub mod deployment;
pub mod error;
pub mod health;
pub mod tenant;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::repository::Repository;

/// Shared handler state
pub type AppState = Arc<dyn Repository>;

/// Create the main API router with all endpoints
pub fn create_router(repo: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Tenant endpoints
        .route(
            "/api/tenants",
            post(tenant::create_tenant).get(tenant::list_tenants),
        )
        .route("/api/tenants/{id}", get(tenant::get_tenant))
        .route("/api/tenants/{id}/permissions", post(tenant::touch_permissions))
        // Deployment endpoints
        .route(
            "/api/deployments",
            post(deployment::create_deployment).get(deployment::list_deployments),
        )
        .route("/api/deployments/pending", get(deployment::list_pending))
        .route("/api/deployments/{id}", get(deployment::get_deployment))
        .route("/api/deployments/{id}/cancel", post(deployment::cancel_deployment))
        .route(
            "/api/deployments/{id}/rollback",
            get(deployment::rollback_eligibility).post(deployment::rollback_deployment),
        )
        // Runner endpoints
        .route("/api/deployments/{id}/claim", post(deployment::claim_deployment))
        .route("/api/deployments/{id}/commit", post(deployment::record_commit))
        .route("/api/deployments/{id}/deploying", post(deployment::mark_deploying))
        .route("/api/deployments/{id}/heartbeat", post(deployment::heartbeat))
        .route("/api/deployments/{id}/complete", post(deployment::complete_deployment))
        .route(
            "/api/deployments/{id}/logs",
            get(deployment::get_logs).post(deployment::add_logs),
        )
        // Add state and middleware
        .with_state(repo)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryRepository;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    fn router() -> Router {
        create_router(Arc::new(InMemoryRepository::new()))
    }

    async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(match body {
                Some(json) => Body::from(json.to_string()),
                None => Body::empty(),
            })
            .unwrap();

        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn create_tenant(router: &Router) -> String {
        let (status, tenant) = send(
            router,
            "POST",
            "/api/tenants",
            Some(json!({ "subdomain": "alpha", "repository": "acme/alpha" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        tenant["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_health() {
        let (status, _) = send(&router(), "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_duplicate_deployment_is_conflict() {
        let router = router();
        let tenant_id = create_tenant(&router).await;
        let body = json!({ "tenant_id": tenant_id, "version": "v1", "environment": "production" });

        let (status, first) = send(&router, "POST", "/api/deployments", Some(body.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(first["status"], "pending");

        let (status, error) = send(&router, "POST", "/api/deployments", Some(body)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(error["error"].as_str().unwrap().contains("already in progress"));
        assert_eq!(error["code"], "already_in_progress");
    }

    #[tokio::test]
    async fn test_invalid_transition_has_its_own_code() {
        let router = router();
        let tenant_id = create_tenant(&router).await;
        let (_, deployment) = send(
            &router,
            "POST",
            "/api/deployments",
            Some(json!({ "tenant_id": tenant_id, "version": "v1", "environment": "staging" })),
        )
        .await;
        let cancel = format!("/api/deployments/{}/cancel", deployment["id"].as_str().unwrap());

        let (status, _) = send(&router, "POST", &cancel, None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, error) = send(&router, "POST", &cancel, None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(error["code"], "invalid_state");
    }

    #[tokio::test]
    async fn test_runner_lifecycle_over_http() {
        let router = router();
        let tenant_id = create_tenant(&router).await;
        let (_, deployment) = send(
            &router,
            "POST",
            "/api/deployments",
            Some(json!({ "tenant_id": tenant_id, "version": "v1", "environment": "preview" })),
        )
        .await;
        let id = deployment["id"].as_str().unwrap().to_string();

        let (status, pending) = send(&router, "GET", "/api/deployments/pending", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(pending.as_array().unwrap().len(), 1);

        let (status, info) = send(
            &router,
            "POST",
            &format!("/api/deployments/{}/claim", id),
            Some(json!({ "runner_id": "runner-1" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(info["deployment"]["status"], "building");
        assert_eq!(info["tenant"]["subdomain"], "alpha");

        let (status, _) = send(
            &router,
            "POST",
            &format!("/api/deployments/{}/commit", id),
            Some(json!({ "commit_sha": "abc123" })),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = send(&router, "POST", &format!("/api/deployments/{}/deploying", id), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, beat) = send(&router, "POST", &format!("/api/deployments/{}/heartbeat", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(beat["status"], "deploying");
        assert!(beat["heartbeat_at"].is_string());

        let (status, _) = send(
            &router,
            "POST",
            &format!("/api/deployments/{}/complete", id),
            Some(json!({ "outcome": "success", "url": "https://x-preview.apps.example.com" })),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, done) = send(&router, "GET", &format!("/api/deployments/{}", id), None).await;
        assert_eq!(done["status"], "success");
        assert_eq!(done["commit_sha"], "abc123");

        let (_, logs) = send(&router, "GET", &format!("/api/deployments/{}/logs", id), None).await;
        assert!(logs.as_array().unwrap().len() >= 3);
    }

    #[tokio::test]
    async fn test_unknown_deployment_is_not_found() {
        let (status, body) = send(
            &router(),
            "GET",
            &format!("/api/deployments/{}", uuid::Uuid::new_v4()),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].is_string());
        assert_eq!(body["code"], "not_found");
    }

    #[tokio::test]
    async fn test_invalid_subdomain_is_bad_request() {
        let (status, _) = send(
            &router(),
            "POST",
            "/api/tenants",
            Some(json!({ "subdomain": "-bad-", "repository": "acme/alpha" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
