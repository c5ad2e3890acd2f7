use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use axum::Router;
use modkit::{Module, ModuleCtx, RestApiCapability, RouteDecl, SharedAuthState};
use modkit_audit::AuditTrailHandle;
use modkit_db::Database;
use tracing::info;

/// Main module struct for generic document routes.
#[modkit::module(name = "documents", capabilities = [rest])]
pub struct DocumentsModule {
    db: ArcSwapOption<Database>,
    audit: ArcSwapOption<AuditTrailHandle>,
}

impl Default for DocumentsModule {
    fn default() -> Self {
        Self {
            db: ArcSwapOption::from(None),
            audit: ArcSwapOption::from(None),
        }
    }
}

#[async_trait]
impl Module for DocumentsModule {
    async fn init(&self, ctx: &ModuleCtx) -> anyhow::Result<()> {
        info!("Initializing documents module");
        let db = ctx.service::<Database>()?;
        let audit = ctx.service::<AuditTrailHandle>()?;
        self.db.store(Some(db));
        self.audit.store(Some(audit));
        Ok(())
    }
}

impl RestApiCapability for DocumentsModule {
    fn register_rest(&self, ctx: &ModuleCtx, router: Router) -> anyhow::Result<(Router, Vec<RouteDecl>)> {
        let db = self
            .db
            .load()
            .as_ref()
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("documents module not initialized"))?;
        let audit = self
            .audit
            .load()
            .as_ref()
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("documents module not initialized"))?;
        let shared_state = ctx.service::<SharedAuthState>()?;

        let (sub_router, decls) = crate::api::routes::build(db, audit);
        let sub_router = sub_router.with_state((*shared_state).clone());

        info!(route_count = decls.len(), "registered documents routes");
        Ok((router.merge(sub_router), decls))
    }
}
