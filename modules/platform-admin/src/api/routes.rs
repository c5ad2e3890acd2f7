//! Platform-admin-only tenant management and cross-tenant stats (spec
//! §6.1). Every route declares [`RoutePolicy::RequirePlatformAdmin`] and
//! extracts [`PlatformAdminContext`] rather than a plain `RequestContext` —
//! a non-admin caller 403s before the handler body runs at all.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Extension, Path};
use axum::routing::{get, put};
use axum::{Json, Router};
use futures::stream::TryStreamExt;
use modkit::api::PlatformAdminContext;
use modkit::{RouteDecl, RoutePolicy, SharedAuthState};
use modkit_auth::Tenant;
use modkit_db::{Database, MongoDirectory};
use modkit_errors::{ApiError, ApiResult};
use uuid::Uuid;

use super::dto::{CreateTenantBody, PlatformStatsResponse, TenantListResponse, TenantResponse, UpdateTenantBody};

pub fn build(directory: Arc<MongoDirectory>, db: Arc<Database>) -> (Router<SharedAuthState>, Vec<RouteDecl>) {
    let router = Router::new()
        .route("/api/platform/tenants", get(list_tenants).post(create_tenant))
        .route("/api/platform/tenants/:id", put(update_tenant).delete(delete_tenant))
        .route("/api/platform/stats", get(platform_stats))
        .layer(Extension(directory))
        .layer(Extension(db));

    let decls = vec![
        RouteDecl::new("GET", "/api/platform/tenants", RoutePolicy::RequirePlatformAdmin),
        RouteDecl::new("POST", "/api/platform/tenants", RoutePolicy::RequirePlatformAdmin),
        RouteDecl::new("PUT", "/api/platform/tenants/:id", RoutePolicy::RequirePlatformAdmin),
        RouteDecl::new("DELETE", "/api/platform/tenants/:id", RoutePolicy::RequirePlatformAdmin),
        RouteDecl::new("GET", "/api/platform/stats", RoutePolicy::RequirePlatformAdmin),
    ];
    (router, decls)
}

async fn list_tenants(
    PlatformAdminContext(_ctx): PlatformAdminContext,
    Extension(directory): Extension<Arc<MongoDirectory>>,
) -> ApiResult<Json<TenantListResponse>> {
    let tenants = directory.list_tenants().await?;
    Ok(Json(TenantListResponse {
        data: tenants.iter().map(TenantResponse::from).collect(),
    }))
}

async fn create_tenant(
    PlatformAdminContext(_ctx): PlatformAdminContext,
    Extension(directory): Extension<Arc<MongoDirectory>>,
    Json(body): Json<CreateTenantBody>,
) -> ApiResult<(http::StatusCode, Json<TenantResponse>)> {
    let tenant = Tenant {
        id: Uuid::new_v4().to_string(),
        slug: body.slug,
        name: body.name,
        status: body.status.unwrap_or(modkit_auth::TenantStatus::Active),
        quotas: body.quotas,
    };
    directory.create_tenant(&tenant).await?;
    Ok((http::StatusCode::CREATED, Json(TenantResponse::from(&tenant))))
}

async fn update_tenant(
    PlatformAdminContext(_ctx): PlatformAdminContext,
    Path(id): Path<String>,
    Extension(directory): Extension<Arc<MongoDirectory>>,
    Json(body): Json<UpdateTenantBody>,
) -> ApiResult<Json<TenantResponse>> {
    let mut patch = bson::Document::new();
    if let Some(name) = &body.name {
        patch.insert("name", name);
    }
    if let Some(status) = body.status {
        patch.insert("status", bson::to_bson(&status).map_err(|e| ApiError::validation(format!("invalid status: {e}")))?);
    }
    if let Some(quotas) = &body.quotas {
        patch.insert("quotas", bson::to_bson(quotas).map_err(|e| ApiError::validation(format!("invalid quotas: {e}")))?);
    }
    if patch.is_empty() {
        return Err(ApiError::validation("update body must set at least one field"));
    }
    let tenant = directory.update_tenant(&id, patch).await?;
    Ok(Json(TenantResponse::from(&tenant)))
}

async fn delete_tenant(
    PlatformAdminContext(_ctx): PlatformAdminContext,
    Path(id): Path<String>,
    Extension(directory): Extension<Arc<MongoDirectory>>,
) -> ApiResult<Json<serde_json::Value>> {
    directory.delete_tenant(&id).await?;
    Ok(Json(serde_json::json!({ "id": id, "deleted": true })))
}

/// Cross-tenant counts (spec §6.1 "GET /api/platform/stats"): the one place
/// in the backend that legitimately counts across every tenant rather than
/// filtering by one, since the caller is a platform admin by construction
/// (`PlatformAdminContext`, not a tenant-scoped `Repository`).
async fn platform_stats(
    PlatformAdminContext(_ctx): PlatformAdminContext,
    Extension(directory): Extension<Arc<MongoDirectory>>,
    Extension(db): Extension<Arc<Database>>,
) -> ApiResult<Json<PlatformStatsResponse>> {
    let tenants = directory.list_tenants().await?;
    let tenant_count = tenants.len() as u64;
    let active_tenant_count = tenants.iter().filter(|t| t.is_active()).count() as u64;

    let users: mongodb::Collection<bson::Document> = db.collection("users");
    let user_count = users
        .count_documents(bson::doc! {})
        .await
        .map_err(|e| ApiError::database(format!("mongo error: {e}")))?;

    let documents: mongodb::Collection<bson::Document> = db.collection("documents");
    let pipeline = vec![
        bson::doc! { "$match": { "deleted": { "$ne": true } } },
        bson::doc! { "$group": { "_id": "$type", "count": { "$sum": 1 } } },
    ];
    let cursor = documents.aggregate(pipeline).await.map_err(|e| ApiError::database(format!("mongo error: {e}")))?;
    let rows: Vec<bson::Document> = cursor.try_collect().await.map_err(|e| ApiError::database(format!("mongo error: {e}")))?;
    let mut document_count_by_type = HashMap::new();
    for row in rows {
        if let (Some(doc_type), Ok(count)) = (row.get_str("_id").ok(), row.get_i32("count")) {
            document_count_by_type.insert(doc_type.to_owned(), u64::from(u32::try_from(count).unwrap_or(0)));
        }
    }

    Ok(Json(PlatformStatsResponse {
        tenant_count,
        active_tenant_count,
        user_count,
        document_count_by_type,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenant_response_projects_core_fields() {
        let tenant = Tenant {
            id: "t1".to_owned(),
            slug: "acme".to_owned(),
            name: "Acme".to_owned(),
            status: modkit_auth::TenantStatus::Active,
            quotas: None,
        };
        let response = TenantResponse::from(&tenant);
        assert_eq!(response.slug, "acme");
        assert_eq!(response.id, "t1");
    }
}
