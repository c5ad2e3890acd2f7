use std::sync::Arc;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use axum::Router;
use modkit::{Module, ModuleCtx, RestApiCapability, RouteDecl, RunnableCapability, SharedAuthState};
use modkit_db::Database;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::domain::embedder::EmbedderClient;
use crate::domain::pipeline::{PipelineConfig, VectorPipeline};

#[modkit::module(name = "vector-pipeline", capabilities = [rest, runnable])]
pub struct VectorPipelineModule {
    pipeline: ArcSwapOption<VectorPipeline>,
}

impl Default for VectorPipelineModule {
    fn default() -> Self {
        Self {
            pipeline: ArcSwapOption::from(None),
        }
    }
}

#[async_trait]
impl Module for VectorPipelineModule {
    async fn init(&self, ctx: &ModuleCtx) -> anyhow::Result<()> {
        let db = ctx.service::<Database>()?;
        let config = ctx.config();

        if !config.vector_service_enabled {
            info!("vector pipeline disabled by configuration");
            return Ok(());
        }

        let embedder = EmbedderClient::new(
            config.embedding_service_url.clone(),
            config.embedding_api_key.clone(),
            config.embedding_model_name.clone(),
            config.ai_call_timeout(),
        );
        let pipeline_config = PipelineConfig {
            monitored_types: config.monitored_vector_types.clone(),
            worker_count: config.vector_worker_count,
            queue_capacity: config.vector_queue_capacity,
        };
        let pipeline = Arc::new(VectorPipeline::new(db, embedder, Arc::clone(ctx.metrics()), pipeline_config));
        self.pipeline.store(Some(pipeline));
        Ok(())
    }
}

impl RestApiCapability for VectorPipelineModule {
    fn register_rest(&self, ctx: &ModuleCtx, router: Router) -> anyhow::Result<(Router, Vec<RouteDecl>)> {
        let shared_state = ctx.service::<SharedAuthState>()?;
        let pipeline = self.pipeline.load().as_ref().cloned();
        let (sub_router, decls) = crate::api::routes::build(pipeline, Arc::clone(ctx.metrics()));
        let sub_router = sub_router.with_state((*shared_state).clone());

        info!(route_count = decls.len(), "registered vector-pipeline routes");
        Ok((router.merge(sub_router), decls))
    }
}

#[async_trait]
impl RunnableCapability for VectorPipelineModule {
    async fn start(&self, cancel: CancellationToken) -> anyhow::Result<()> {
        let Some(pipeline) = self.pipeline.load().as_ref().cloned() else {
            info!("vector pipeline not started: disabled by configuration");
            return Ok(());
        };
        pipeline.start(cancel);
        Ok(())
    }

    async fn stop(&self, _cancel: CancellationToken) -> anyhow::Result<()> {
        if let Some(pipeline) = self.pipeline.load().as_ref().cloned() {
            pipeline.stop().await;
        }
        Ok(())
    }
}
