//! Login, session, and tenant-discovery routes (spec §4.6, §6.1). Every
//! handler resolves tenant membership through `MongoDirectory` directly —
//! these three records (`Tenant`/`User`/`Membership`) are not polymorphic
//! `Document`s, so they never go through `modkit_db::Repository` (spec §3.2,
//! §9 "pure schemas + services").

use std::sync::Arc;

use axum::extract::{Extension, Query};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use modkit::{RouteDecl, RoutePolicy, SharedAuthState};
use modkit_audit::{AuditEvent, AuditEventType, AuditTrailHandle};
use modkit_auth::{AuthService, MembershipDirectory, RequestContext, Tenant};
use modkit_db::MongoDirectory;
use modkit_errors::{ApiError, ApiResult};
use serde_json::{Value, json};

use super::dto::{DiscoverTenantsQuery, LoginBody, MeResponse, PublicUser, RefreshResponse, TenantSummary, UpdateProfileBody};

pub fn build(directory: Arc<MongoDirectory>, audit: Arc<AuditTrailHandle>, auth_service: Arc<AuthService>) -> (Router<SharedAuthState>, Vec<RouteDecl>) {
    let router = Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/me", get(me))
        .route("/api/auth/refresh", post(refresh))
        .route("/api/auth/profile", put(update_profile))
        .route("/api/tenants/discover", get(discover_tenants))
        .layer(Extension(directory))
        .layer(Extension(audit))
        .layer(Extension(auth_service));

    let decls = vec![
        RouteDecl::new("POST", "/api/auth/login", RoutePolicy::Public),
        RouteDecl::new("GET", "/api/auth/me", RoutePolicy::RequireAuth),
        RouteDecl::new("POST", "/api/auth/refresh", RoutePolicy::RequireAuth),
        RouteDecl::new("PUT", "/api/auth/profile", RoutePolicy::RequireAuth),
        RouteDecl::new("GET", "/api/tenants/discover", RoutePolicy::Public),
    ];
    (router, decls)
}

fn summarize(tenant: &Tenant) -> TenantSummary {
    TenantSummary {
        id: tenant.id.clone(),
        slug: tenant.slug.clone(),
        name: tenant.name.clone(),
    }
}

/// Candidate tenants a user may enter: platform admins get every active
/// tenant, everyone else their memberships (spec §4.6 "Tenant resolution
/// for login").
async fn candidate_tenants(directory: &MongoDirectory, user: &modkit_auth::User) -> Vec<Tenant> {
    directory.tenants_for_user(&user.id).await
}

async fn login(
    Extension(directory): Extension<Arc<MongoDirectory>>,
    Extension(audit): Extension<Arc<AuditTrailHandle>>,
    Extension(auth_service): Extension<Arc<AuthService>>,
    Json(body): Json<LoginBody>,
) -> ApiResult<Json<Value>> {
    let user = directory
        .find_user_by_email(&body.email)
        .await?
        .ok_or_else(|| ApiError::unauthenticated("invalid email or password"))?;
    if !modkit_auth::verify_password(&body.password, &user.password_hash) {
        return Err(ApiError::unauthenticated("invalid email or password"));
    }

    let candidates = candidate_tenants(&directory, &user).await;

    let resolved: Option<Tenant> = if let Some(slug) = &body.tenant_slug {
        let tenant = directory
            .find_tenant_by_slug(slug)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("tenant '{slug}' not found")))?;
        if !user.is_platform_admin() && !candidates.iter().any(|t| t.id == tenant.id) {
            return Err(ApiError::forbidden("no membership in requested tenant"));
        }
        Some(tenant)
    } else {
        match candidates.len() {
            0 if user.is_platform_admin() => None,
            0 => return Err(ApiError::unauthenticated("no tenant membership; login fails")),
            1 => Some(candidates[0].clone()),
            _ => {
                let options: Vec<Value> = candidates.iter().map(|t| json!({ "slug": t.slug, "name": t.name })).collect();
                return Err(ApiError::validation("multiple tenants available; specify tenantSlug").with_details(json!({ "tenants": options })));
            }
        }
    };

    let tenant_id = resolved.as_ref().map(|t| t.id.as_str());
    let token = auth_service.issue_token(&user.id, tenant_id, user.platform_role)?;

    let event = AuditEvent::new(AuditEventType::Login, user.id.clone(), tenant_id.unwrap_or("*"), "user", user.id.clone());
    if let Err(e) = audit.0.record(event).await {
        tracing::warn!(user_id = %user.id, error = %e, "failed to record login audit event");
    }

    Ok(Json(json!({
        "token": token,
        "user": PublicUser::from(&user),
    })))
}

async fn me(ctx: RequestContext, Extension(directory): Extension<Arc<MongoDirectory>>) -> ApiResult<Json<MeResponse>> {
    let user = directory
        .find_user_by_id(&ctx.tenant_context.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("user not found"))?;

    let tenant = match ctx.tenant_context.filter_tenant_id() {
        Some(tenant_id) => directory.find_tenant_by_id(tenant_id).await?.map(|t| summarize(&t)),
        None => None,
    };

    Ok(Json(MeResponse {
        user: PublicUser::from(&user),
        tenant,
    }))
}

async fn refresh(ctx: RequestContext, Extension(auth_service): Extension<Arc<AuthService>>) -> ApiResult<Json<RefreshResponse>> {
    let tenant_id = ctx.tenant_context.filter_tenant_id();
    let token = auth_service.issue_token(&ctx.tenant_context.user_id, tenant_id, ctx.tenant_context.platform_role)?;
    Ok(Json(RefreshResponse { token }))
}

async fn update_profile(
    ctx: RequestContext,
    Extension(directory): Extension<Arc<MongoDirectory>>,
    Json(body): Json<UpdateProfileBody>,
) -> ApiResult<Json<PublicUser>> {
    let mut patch = bson::Document::new();
    if let Some(name) = &body.display_name {
        patch.insert("displayName", name);
    }
    if !patch.is_empty() {
        directory.update_user(&ctx.tenant_context.user_id, patch).await?;
    }

    let user = directory
        .find_user_by_id(&ctx.tenant_context.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("user not found"))?;
    Ok(Json(PublicUser::from(&user)))
}

async fn discover_tenants(Extension(directory): Extension<Arc<MongoDirectory>>, Query(q): Query<DiscoverTenantsQuery>) -> ApiResult<Json<Value>> {
    let Some(user) = directory.find_user_by_email(&q.email).await? else {
        return Ok(Json(json!({ "tenants": [] })));
    };
    let candidates = candidate_tenants(&directory, &user).await;
    match candidates.as_slice() {
        [] => Ok(Json(json!({ "tenants": [] }))),
        [only] => Ok(Json(json!({ "tenantSlug": only.slug, "tenantName": only.name }))),
        many => {
            let tenants: Vec<Value> = many.iter().map(|t| json!({ "slug": t.slug, "name": t.name })).collect();
            Ok(Json(json!({ "tenants": tenants })))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summarize_projects_tenant_fields() {
        let tenant = Tenant {
            id: "t1".to_owned(),
            slug: "acme".to_owned(),
            name: "Acme".to_owned(),
            status: modkit_auth::TenantStatus::Active,
            quotas: None,
        };
        let summary = summarize(&tenant);
        assert_eq!(summary.slug, "acme");
        assert_eq!(summary.name, "Acme");
    }
}
