use std::sync::Arc;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use axum::Router;
use modkit::{Module, ModuleCtx, RestApiCapability, RouteDecl, SharedAuthState};
use modkit_audit::AuditTrailHandle;
use modkit_db::{Database, MongoDirectory};
use tracing::info;

/// Owns the `MongoDirectory` auth-api's handlers query directly for login,
/// tenant discovery, and profile updates — `AuthService`/`AuthorizationService`
/// are shared services other modules also depend on and are registered once
/// at bootstrap (spec §9 "Global state -> dependency injection"), so this
/// module only stores the directory handle it needs beyond them.
#[modkit::module(name = "auth-api", capabilities = [rest])]
pub struct AuthApiModule {
    directory: ArcSwapOption<MongoDirectory>,
    audit: ArcSwapOption<AuditTrailHandle>,
}

impl Default for AuthApiModule {
    fn default() -> Self {
        Self {
            directory: ArcSwapOption::from(None),
            audit: ArcSwapOption::from(None),
        }
    }
}

#[async_trait]
impl Module for AuthApiModule {
    async fn init(&self, ctx: &ModuleCtx) -> anyhow::Result<()> {
        info!("Initializing auth-api module");
        let db = ctx.service::<Database>()?;
        let audit = ctx.service::<AuditTrailHandle>()?;
        self.directory.store(Some(Arc::new(MongoDirectory::new(db.inner()))));
        self.audit.store(Some(audit));
        Ok(())
    }
}

impl RestApiCapability for AuthApiModule {
    fn register_rest(&self, ctx: &ModuleCtx, router: Router) -> anyhow::Result<(Router, Vec<RouteDecl>)> {
        let directory = self
            .directory
            .load()
            .as_ref()
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("auth-api module not initialized"))?;
        let audit = self
            .audit
            .load()
            .as_ref()
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("auth-api module not initialized"))?;
        let shared_state = ctx.service::<SharedAuthState>()?;
        let auth_service = Arc::clone(shared_state.auth_service_arc());

        let (sub_router, decls) = crate::api::routes::build(directory, audit, auth_service);
        let sub_router = sub_router.with_state((*shared_state).clone());

        info!(route_count = decls.len(), "registered auth-api routes");
        Ok((router.merge(sub_router), decls))
    }
}
