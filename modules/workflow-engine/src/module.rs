use std::sync::Arc;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use axum::Router;
use modkit::{Module, ModuleCtx, RestApiCapability, RouteDecl, RunnableCapability, SharedAuthState};
use modkit_audit::AuditTrailHandle;
use modkit_db::Database;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::domain::agents::AgentRuntime;
use crate::domain::engine::ExecutionEngine;
use crate::domain::repository::{ExecutionRepository, WorkflowRepository};

/// Owns the workflow/execution repositories and the [`ExecutionEngine`]
/// built on top of them; exposes both the HTTP routes and the shutdown
/// sweep the engine needs when the server stops (spec §4.4.3 "Shutdown").
#[modkit::module(name = "workflow-engine", capabilities = [rest, runnable])]
pub struct WorkflowEngineModule {
    engine: ArcSwapOption<ExecutionEngine>,
    workflows: ArcSwapOption<WorkflowRepository>,
}

impl Default for WorkflowEngineModule {
    fn default() -> Self {
        Self {
            engine: ArcSwapOption::from(None),
            workflows: ArcSwapOption::from(None),
        }
    }
}

#[async_trait]
impl Module for WorkflowEngineModule {
    async fn init(&self, ctx: &ModuleCtx) -> anyhow::Result<()> {
        info!("Initializing workflow-engine module");
        let db = ctx.service::<Database>()?;
        let audit = ctx.service::<AuditTrailHandle>()?;

        let workflows = Arc::new(WorkflowRepository::new(db.inner()));
        let executions = Arc::new(ExecutionRepository::new(db.inner()));
        let config = ctx.config();
        let runtime = Arc::new(AgentRuntime::new(config.ai_service_url.clone(), config.ai_service_api_key.clone(), config.ai_call_timeout()));

        let engine = Arc::new(ExecutionEngine::new(Arc::clone(&workflows), executions, runtime, audit.0.clone(), Arc::clone(ctx.metrics())));

        self.engine.store(Some(engine));
        self.workflows.store(Some(workflows));
        Ok(())
    }
}

impl RestApiCapability for WorkflowEngineModule {
    fn register_rest(&self, ctx: &ModuleCtx, router: Router) -> anyhow::Result<(Router, Vec<RouteDecl>)> {
        let engine = self
            .engine
            .load()
            .as_ref()
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("workflow-engine module not initialized"))?;
        let workflows = self
            .workflows
            .load()
            .as_ref()
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("workflow-engine module not initialized"))?;
        let shared_state = ctx.service::<SharedAuthState>()?;

        let (sub_router, decls) = crate::api::routes::build(engine, workflows);
        let sub_router = sub_router.with_state((*shared_state).clone());

        info!(route_count = decls.len(), "registered workflow-engine routes");
        Ok((router.merge(sub_router), decls))
    }
}

#[async_trait]
impl RunnableCapability for WorkflowEngineModule {
    /// There is no separate background task to spawn — every execution runs
    /// as its own cooperative task started by `execute_workflow`, so this
    /// only confirms the engine is ready.
    async fn start(&self, _cancel: CancellationToken) -> anyhow::Result<()> {
        if self.engine.load().is_none() {
            anyhow::bail!("workflow-engine module started before init");
        }
        info!("workflow-engine ready to accept executions");
        Ok(())
    }

    /// Runs the shutdown sweep (spec §4.4.3 "Shutdown"): cancels every
    /// in-flight execution and marks stragglers cancelled in storage.
    async fn stop(&self, _cancel: CancellationToken) -> anyhow::Result<()> {
        if let Some(engine) = self.engine.load().as_ref() {
            engine.shutdown().await;
        }
        Ok(())
    }
}
