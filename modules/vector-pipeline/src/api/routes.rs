//! Vector service status routes (spec §6.1 "Vector service"). Unlike the
//! rest of the HTTP surface these are unauthenticated, in line with the
//! top-level `/health`/`/metrics` operational endpoints.

use std::sync::Arc;

use axum::extract::Extension;
use axum::routing::get;
use axum::{Json, Router};
use modkit::{MetricsRegistry, RouteDecl, RoutePolicy, SharedAuthState};

use crate::domain::pipeline::VectorPipeline;
use crate::domain::status::PipelineStatus;
use super::dto::HealthResponse;

pub fn build(pipeline: Option<Arc<VectorPipeline>>, metrics: Arc<MetricsRegistry>) -> (Router<SharedAuthState>, Vec<RouteDecl>) {
    let router = Router::new()
        .route("/api/vector-service/health", get(health))
        .route("/api/vector-service/metrics", get(metrics_handler))
        .layer(Extension(pipeline))
        .layer(Extension(metrics));

    let decls = vec![
        RouteDecl::new("GET", "/api/vector-service/health", RoutePolicy::Public),
        RouteDecl::new("GET", "/api/vector-service/metrics", RoutePolicy::Public),
    ];

    (router, decls)
}

async fn health(Extension(pipeline): Extension<Option<Arc<VectorPipeline>>>) -> Json<HealthResponse> {
    let status = pipeline.map_or(PipelineStatus::Disabled, |p| p.status());
    Json(HealthResponse { status })
}

async fn metrics_handler(Extension(metrics): Extension<Arc<MetricsRegistry>>) -> String {
    metrics.render_prometheus()
}
