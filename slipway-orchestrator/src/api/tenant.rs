//! Tenant API Handlers
//!
//! HTTP endpoints for the tenant registry.

use axum::{
    Json,
    extract::{Path, State},
};
use slipway_core::domain::tenant::Tenant;
use slipway_core::dto::tenant::CreateTenant;

use crate::api::AppState;
use crate::api::error::ApiResult;
use crate::service::tenant_service;

/// POST /api/tenants
pub async fn create_tenant(
    State(repo): State<AppState>,
    Json(req): Json<CreateTenant>,
) -> ApiResult<Json<Tenant>> {
    tracing::info!("Creating tenant: {}", req.subdomain);

    let tenant = tenant_service::create_tenant(repo.as_ref(), req).await?;
    Ok(Json(tenant))
}

/// GET /api/tenants
pub async fn list_tenants(State(repo): State<AppState>) -> ApiResult<Json<Vec<Tenant>>> {
    tracing::debug!("Listing tenants");

    let tenants = tenant_service::list_tenants(repo.as_ref()).await?;
    Ok(Json(tenants))
}

/// GET /api/tenants/{id}
pub async fn get_tenant(
    State(repo): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Tenant>> {
    tracing::debug!("Getting tenant: {}", id);

    let tenant = tenant_service::get_tenant(repo.as_ref(), &id).await?;
    Ok(Json(tenant))
}

/// POST /api/tenants/{id}/permissions
/// Record that repository permissions were just granted or changed
pub async fn touch_permissions(
    State(repo): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Tenant>> {
    let tenant = tenant_service::touch_repository_permissions(repo.as_ref(), &id).await?;
    Ok(Json(tenant))
}
