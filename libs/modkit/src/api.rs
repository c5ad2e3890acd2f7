//! Route framework contract (spec §4.6 "Route framework contract", §4.7).
//!
//! Every route declares one of [`RoutePolicy`]'s variants. `RouteDecl`
//! records that declaration next to the method and path so the startup
//! validator ([`validate_route_policies`]) can refuse to start the server if
//! a route module ever returns a route with no policy attached — the
//! contract is enforced at the type level (every [`RouteDecl`] is built with
//! a policy, there is no "none" to forget), and the validator exists to make
//! that invariant checkable and logged (spec §8 invariant 6).

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use http::header::AUTHORIZATION;
use modkit_auth::{AuthService, AuthorizationService, MembershipDirectory, PlatformRole, RequestContext, TenantContext};
use modkit_errors::ApiError;

/// The authentication/authorization policy a route declares (spec §4.6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutePolicy {
    RequireAuth,
    RequirePlatformAdmin,
    RequireTenantAdmin,
    RequirePermission(&'static str),
    OptionalAuth,
    Public,
}

#[derive(Debug, Clone)]
pub struct RouteDecl {
    pub method: &'static str,
    pub path: &'static str,
    pub policy: RoutePolicy,
}

impl RouteDecl {
    #[must_use]
    pub fn new(method: &'static str, path: &'static str, policy: RoutePolicy) -> Self {
        Self { method, path, policy }
    }
}

/// Startup validator (spec §4.7, §8 invariant 6): counts registrations,
/// refuses to start if any two routes collide, and logs a registration
/// summary. Every `RouteDecl` already carries a policy by construction, so
/// the "missing policy" failure mode from the original spec text is
/// structurally impossible here; this still rejects the other startup-time
/// mistake — two modules claiming the same method+path.
///
/// # Errors
/// Returns an error naming the colliding route.
pub fn validate_route_policies(routes: &[RouteDecl]) -> anyhow::Result<()> {
    let mut seen = std::collections::HashSet::new();
    for route in routes {
        let key = (route.method, route.path);
        if !seen.insert(key) {
            anyhow::bail!("duplicate route registration: {} {}", route.method, route.path);
        }
    }
    tracing::info!(
        route_count = routes.len(),
        public = routes.iter().filter(|r| r.policy == RoutePolicy::Public).count(),
        authenticated = routes
            .iter()
            .filter(|r| !matches!(r.policy, RoutePolicy::Public))
            .count(),
        "route registration summary"
    );
    Ok(())
}

/// The concrete `AuthorizationService` every route handler depends on. Not
/// generic over the directory implementation — `modkit-db`'s repository
/// provides `Arc<dyn MembershipDirectory>` once at bootstrap, and every
/// downstream consumer shares that one type.
pub type DynAuthorizationService = AuthorizationService<Arc<dyn MembershipDirectory>>;

/// Shared axum state every route-bearing module's router must carry, either
/// directly or through a wrapper that implements this trait. Supplies the
/// two services the context extractors below need.
pub trait AuthState: Send + Sync + 'static {
    fn auth_service(&self) -> &AuthService;
    fn authorization_service(&self) -> &DynAuthorizationService;
}

fn bearer_token(parts: &Parts) -> Result<&str, ApiError> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::unauthenticated("missing Authorization header"))?;
    AuthService::extract_bearer(header).ok_or_else(|| ApiError::unauthenticated("expected a Bearer token"))
}

fn correlation_id(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get("x-correlation-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}

async fn authenticate<S: AuthState>(parts: &Parts, state: &S) -> Result<RequestContext, ApiError> {
    let token = bearer_token(parts)?;
    let claims = state.auth_service().verify_token(token)?;

    let tenant_context = match claims.platform_role {
        Some(PlatformRole::PlatformAdmin) => match claims.tenant_id {
            Some(tenant_id) => TenantContext::platform_admin_scoped(tenant_id, claims.sub),
            None => TenantContext::platform_admin(claims.sub),
        },
        _ => {
            let tenant_id = claims
                .tenant_id
                .ok_or_else(|| ApiError::unauthenticated("token carries no tenant"))?;
            TenantContext::scoped(tenant_id, claims.sub)
        }
    };

    let mut ctx = RequestContext::new(tenant_context);
    if let Some(id) = correlation_id(parts) {
        ctx = ctx.with_correlation_id(id);
    }
    Ok(ctx)
}

/// Extractor for `requireAuth`: 401s if the token is missing, malformed, or
/// expired.
#[axum::async_trait]
impl<S: AuthState> FromRequestParts<S> for RequestContext {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        authenticate(parts, state).await
    }
}

/// Extractor for `optionalAuth`: never rejects; callers get `None` if no
/// valid token was presented.
pub struct OptionalContext(pub Option<RequestContext>);

#[axum::async_trait]
impl<S: AuthState> FromRequestParts<S> for OptionalContext {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match authenticate(parts, state).await {
            Ok(ctx) => Ok(Self(Some(ctx))),
            Err(e) if e.kind == modkit_errors::ErrorKind::Unauthenticated => Ok(Self(None)),
            Err(e) => Err(e),
        }
    }
}

/// Extractor for `requirePlatformAdmin`: 403s if authenticated but not a
/// platform admin.
pub struct PlatformAdminContext(pub RequestContext);

#[axum::async_trait]
impl<S: AuthState> FromRequestParts<S> for PlatformAdminContext {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let ctx = authenticate(parts, state).await?;
        if !ctx.tenant_context.is_platform_admin {
            return Err(ApiError::forbidden("platform admin required"));
        }
        Ok(Self(ctx))
    }
}

/// Extractor for `requireTenantAdmin`: 403s unless the caller is a platform
/// admin or holds `Owner`/`Admin` membership in the resolved tenant.
pub struct TenantAdminContext(pub RequestContext);

#[axum::async_trait]
impl<S: AuthState> FromRequestParts<S> for TenantAdminContext {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let ctx = authenticate(parts, state).await?;
        let is_admin = state
            .authorization_service()
            .has_role_in_tenant(
                &ctx.tenant_context.user_id,
                ctx.tenant_context.is_platform_admin,
                &ctx.tenant_context.tenant_id,
                &[
                    modkit_auth::MembershipRole::Owner,
                    modkit_auth::MembershipRole::Admin,
                ],
            )
            .await;
        if !is_admin {
            return Err(ApiError::forbidden("tenant admin required"));
        }
        Ok(Self(ctx))
    }
}

/// The concrete axum state every route-bearing module's router is built
/// with (spec §9 "Global state -> dependency injection": constructed once
/// at bootstrap, held as `Arc` fields, never a process global). Registered
/// in the `ModuleCtx`'s `ServiceRegistry` so every module's
/// `register_rest` can fetch the same instance and call `.with_state(..)`
/// on its own sub-router before returning it.
#[derive(Clone)]
pub struct SharedAuthState {
    auth_service: Arc<AuthService>,
    authorization_service: Arc<DynAuthorizationService>,
}

impl SharedAuthState {
    #[must_use]
    pub fn new(auth_service: Arc<AuthService>, authorization_service: Arc<DynAuthorizationService>) -> Self {
        Self {
            auth_service,
            authorization_service,
        }
    }

    #[must_use]
    pub fn auth_service_arc(&self) -> &Arc<AuthService> {
        &self.auth_service
    }

    #[must_use]
    pub fn authorization_service_arc(&self) -> &Arc<DynAuthorizationService> {
        &self.authorization_service
    }
}

impl AuthState for SharedAuthState {
    fn auth_service(&self) -> &AuthService {
        &self.auth_service
    }

    fn authorization_service(&self) -> &DynAuthorizationService {
        &self.authorization_service
    }
}

/// `requirePermission(p)` is not an extractor (the permission string is
/// route-specific, not type-specific) — handlers call this explicitly after
/// extracting a plain `RequestContext`.
///
/// # Errors
/// Returns `ApiError::forbidden` if the caller lacks `permission` in their
/// current tenant.
pub async fn require_permission(
    ctx: &RequestContext,
    authz: &DynAuthorizationService,
    permission: &'static str,
) -> Result<(), ApiError> {
    let allowed = authz
        .has_permission_in_tenant(
            &ctx.tenant_context.user_id,
            ctx.tenant_context.is_platform_admin,
            &ctx.tenant_context.tenant_id,
            permission,
        )
        .await;
    if allowed {
        Ok(())
    } else {
        Err(ApiError::forbidden(format!("missing permission '{permission}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_routes_are_rejected() {
        let routes = vec![
            RouteDecl::new("GET", "/x", RoutePolicy::Public),
            RouteDecl::new("GET", "/x", RoutePolicy::RequireAuth),
        ];
        assert!(validate_route_policies(&routes).is_err());
    }

    #[test]
    fn distinct_routes_pass() {
        let routes = vec![
            RouteDecl::new("GET", "/x", RoutePolicy::Public),
            RouteDecl::new("POST", "/x", RoutePolicy::RequireAuth),
        ];
        assert!(validate_route_policies(&routes).is_ok());
    }
}
