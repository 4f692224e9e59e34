//! Slipway Edge
//!
//! One stateless dispatcher for every tenant and environment. The inbound
//! `Host` decides the script; nothing is looked up per tenant, so deploying a
//! new tenant never touches this process.

pub mod config;
pub mod dispatch;
pub mod error;

use std::sync::Arc;

use axum::Router;
use slipway_client::dispatch::ScriptForwarder;
use slipway_core::routing::HostResolver;
use tower_http::trace::TraceLayer;

/// Shared handler state
#[derive(Clone)]
pub struct EdgeState {
    pub resolver: Arc<HostResolver>,
    pub forwarder: Arc<dyn ScriptForwarder>,
    pub max_body_bytes: usize,
}

impl EdgeState {
    pub fn new(
        resolver: HostResolver,
        forwarder: Arc<dyn ScriptForwarder>,
        max_body_bytes: usize,
    ) -> Self {
        Self {
            resolver: Arc::new(resolver),
            forwarder,
            max_body_bytes,
        }
    }
}

/// Every path on every host goes to the dispatcher
pub fn create_router(state: EdgeState) -> Router {
    Router::new()
        .fallback(dispatch::dispatch)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DISPATCH_HEADER, NOT_HANDLED, ROUTE_NOT_FOUND};
    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use slipway_client::ClientError;
    use slipway_client::dispatch::{
        ForwardRequest, Forwarded, ScriptMetadata, ScriptStore, ScriptUpload,
    };
    use slipway_client::testing::InMemoryPlatform;
    use slipway_core::domain::bundle::{BundleModule, JS_MODULE_CONTENT_TYPE};
    use slipway_core::domain::identity::{NamespaceConfig, ScriptIdentity};
    use slipway_core::routing::ReservedHostnames;
    use tower::ServiceExt;

    fn resolver() -> HostResolver {
        HostResolver::new(
            "apps.test",
            NamespaceConfig::default(),
            ReservedHostnames::new(["apps.test", "www.apps.test", "api.apps.test"]),
        )
    }

    fn app(platform: Arc<InMemoryPlatform>) -> Router {
        create_router(EdgeState::new(resolver(), platform, 1024 * 1024))
    }

    async fn deploy(platform: &InMemoryPlatform, namespace: &str, script: &str, code: &str) {
        let upload = ScriptUpload {
            metadata: ScriptMetadata {
                main_module: "index.js".to_string(),
                compatibility_date: "2024-09-23".to_string(),
                tags: vec![],
                bindings: vec![],
            },
            modules: vec![BundleModule {
                name: "index.js".to_string(),
                content_type: JS_MODULE_CONTENT_TYPE.to_string(),
                content: code.as_bytes().to_vec(),
            }],
        };
        let identity = ScriptIdentity {
            namespace: namespace.to_string(),
            script_name: script.to_string(),
        };
        platform.upsert_script(&identity, upload).await.unwrap();
    }

    fn get(host: &str, uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header("host", host)
            .body(Body::empty())
            .unwrap()
    }

    fn dispatch_marker(response: &axum::response::Response) -> Option<&str> {
        response
            .headers()
            .get(DISPATCH_HEADER)
            .and_then(|v| v.to_str().ok())
    }

    #[tokio::test]
    async fn test_reserved_hostname_is_not_handled() {
        let platform = Arc::new(InMemoryPlatform::new());
        deploy(&platform, "prod-ns", "www", "should never run").await;
        deploy(&platform, "prod-ns", "api", "should never run").await;

        for host in ["www.apps.test", "API.apps.test:443", "apps.test", "www.apps.test."] {
            let response = app(platform.clone()).oneshot(get(host, "/")).await.unwrap();

            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{}", host);
            assert_eq!(dispatch_marker(&response), Some(NOT_HANDLED), "{}", host);
        }
        assert!(platform.forwarded().is_empty());
    }

    #[tokio::test]
    async fn test_foreign_hosts_are_not_handled() {
        let platform = Arc::new(InMemoryPlatform::new());

        for host in ["alpha.other.test", "a.b.apps.test", "-preview.apps.test"] {
            let response = app(platform.clone()).oneshot(get(host, "/")).await.unwrap();
            assert_eq!(dispatch_marker(&response), Some(NOT_HANDLED), "{}", host);
        }
        assert!(platform.forwarded().is_empty());
    }

    #[tokio::test]
    async fn test_tenant_without_script_is_route_not_found() {
        let platform = Arc::new(InMemoryPlatform::new());

        let response = app(platform.clone())
            .oneshot(get("ghost.apps.test", "/"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(dispatch_marker(&response), Some(ROUTE_NOT_FOUND));
        assert_eq!(platform.forwarded().len(), 1);
    }

    #[tokio::test]
    async fn test_production_host_forwards_into_prod_namespace() {
        let platform = Arc::new(InMemoryPlatform::new());
        deploy(&platform, "prod-ns", "alpha", "alpha v1").await;

        let request = Request::builder()
            .method("POST")
            .uri("/api/items?page=2")
            .header("host", "Alpha.apps.test:8443")
            .header("connection", "keep-alive, x-session")
            .header("x-session", "drop me")
            .header("x-request-id", "abc")
            .body(Body::from("payload"))
            .unwrap();

        let response = app(platform.clone()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(dispatch_marker(&response).is_none());
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"alpha v1");

        let forwarded = platform.forwarded();
        let (identity, request) = &forwarded[0];
        assert_eq!(identity.namespace, "prod-ns");
        assert_eq!(identity.script_name, "alpha");
        assert_eq!(request.method, "POST");
        assert_eq!(request.path_and_query, "/api/items?page=2");
        assert_eq!(request.body, b"payload");

        let names: Vec<_> = request.headers.iter().map(|(n, _)| n.as_str()).collect();
        assert!(names.contains(&"x-request-id"));
        assert!(names.contains(&"x-forwarded-host"));
        assert!(!names.contains(&"connection"));
        assert!(!names.contains(&"x-session"));
        assert!(!names.contains(&"host"));
    }

    #[tokio::test]
    async fn test_preview_host_uses_opaque_id() {
        let platform = Arc::new(InMemoryPlatform::new());
        deploy(&platform, "preview-ns", "3f9c0a1b2c3d4e5f-preview", "preview build").await;

        let response = app(platform.clone())
            .oneshot(get("3f9c0a1b2c3d4e5f-preview.apps.test", "/"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"preview build");
    }

    struct FailingForwarder;

    #[async_trait]
    impl ScriptForwarder for FailingForwarder {
        async fn forward(
            &self,
            _identity: &ScriptIdentity,
            _request: ForwardRequest,
        ) -> slipway_client::Result<Forwarded> {
            Err(ClientError::InternalError("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_forwarding_failure_is_bad_gateway() {
        let app = create_router(EdgeState::new(resolver(), Arc::new(FailingForwarder), 1024));

        let response = app.oneshot(get("alpha.apps.test", "/")).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert!(dispatch_marker(&response).is_none());
    }
}
