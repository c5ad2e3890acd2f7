use std::sync::Arc;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use axum::Router;
use modkit::{Module, ModuleCtx, RestApiCapability, RouteDecl, SharedAuthState};
use modkit_db::{Database, MongoDirectory};
use tracing::info;

/// Tenant CRUD and cross-tenant stats for platform administrators (spec
/// §6.1 "Platform admin"). Holds the same `MongoDirectory` `auth-api` does;
/// both are thin wrappers over the `tenants`/`users`/`memberships`
/// collections and neither owns state the other can't reconstruct.
#[modkit::module(name = "platform-admin", capabilities = [rest])]
pub struct PlatformAdminModule {
    directory: ArcSwapOption<MongoDirectory>,
    db: ArcSwapOption<Database>,
}

impl Default for PlatformAdminModule {
    fn default() -> Self {
        Self {
            directory: ArcSwapOption::from(None),
            db: ArcSwapOption::from(None),
        }
    }
}

#[async_trait]
impl Module for PlatformAdminModule {
    async fn init(&self, ctx: &ModuleCtx) -> anyhow::Result<()> {
        info!("Initializing platform-admin module");
        let db = ctx.service::<Database>()?;
        self.directory.store(Some(Arc::new(MongoDirectory::new(db.inner()))));
        self.db.store(Some(db));
        Ok(())
    }
}

impl RestApiCapability for PlatformAdminModule {
    fn register_rest(&self, ctx: &ModuleCtx, router: Router) -> anyhow::Result<(Router, Vec<RouteDecl>)> {
        let directory = self
            .directory
            .load()
            .as_ref()
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("platform-admin module not initialized"))?;
        let db = self
            .db
            .load()
            .as_ref()
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("platform-admin module not initialized"))?;
        let shared_state = ctx.service::<SharedAuthState>()?;

        let (sub_router, decls) = crate::api::routes::build(directory, db);
        let sub_router = sub_router.with_state((*shared_state).clone());

        info!(route_count = decls.len(), "registered platform-admin routes");
        Ok((router.merge(sub_router), decls))
    }
}
