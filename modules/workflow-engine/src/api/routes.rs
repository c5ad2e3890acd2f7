//! Workflow execution routes (spec §6.1): start a run, inspect one, cancel
//! one, and list them. No handler here walks a graph or touches `mongodb`
//! directly — everything goes through [`ExecutionEngine`] (spec §4.2 "No
//! route may speak to the database directly", generalized to the engine's
//! own store).

use std::sync::Arc;

use axum::extract::{Extension, Path, Query};
use axum::routing::{get, post};
use axum::{Json, Router};
use modkit::{RouteDecl, RoutePolicy, SharedAuthState};
use modkit_auth::RequestContext;
use modkit_errors::{ApiError, ApiResult};
use serde_json::{Value, json};

use super::dto::{ExecuteWorkflowBody, ListExecutionsQuery};
use crate::domain::engine::ExecutionEngine;
use crate::domain::model::ExecutionStatus;
use crate::domain::repository::{ExecutionFilters, WorkflowRepository};

pub fn build(engine: Arc<ExecutionEngine>, workflows: Arc<WorkflowRepository>) -> (Router<SharedAuthState>, Vec<RouteDecl>) {
    let router = Router::new()
        .route("/api/workflows/:workflowId/execute", post(execute_workflow))
        .route("/api/executions", get(list_executions))
        .route("/api/executions/:executionId", get(get_execution))
        .route("/api/executions/:executionId/cancel", post(cancel_execution))
        .layer(Extension(engine))
        .layer(Extension(workflows));

    let decls = vec![
        RouteDecl::new("POST", "/api/workflows/:workflowId/execute", RoutePolicy::RequireAuth),
        RouteDecl::new("GET", "/api/executions", RoutePolicy::RequireAuth),
        RouteDecl::new("GET", "/api/executions/:executionId", RoutePolicy::RequireAuth),
        RouteDecl::new("POST", "/api/executions/:executionId/cancel", RoutePolicy::RequireAuth),
    ];
    (router, decls)
}

async fn execute_workflow(
    ctx: RequestContext,
    Path(workflow_id): Path<String>,
    Extension(engine): Extension<Arc<ExecutionEngine>>,
    Extension(_workflows): Extension<Arc<WorkflowRepository>>,
    Json(body): Json<ExecuteWorkflowBody>,
) -> ApiResult<(http::StatusCode, Json<Value>)> {
    let inputs = body.inputs;
    let handle = engine.execute_workflow(&workflow_id, inputs, &ctx).await?;
    Ok((
        http::StatusCode::ACCEPTED,
        Json(json!({
            "executionId": handle.execution_id,
            "status": handle.status,
        })),
    ))
}

async fn get_execution(ctx: RequestContext, Path(execution_id): Path<String>, Extension(engine): Extension<Arc<ExecutionEngine>>) -> ApiResult<Json<Value>> {
    let execution = engine.get_execution(&ctx.tenant_context, &execution_id).await?;
    let running_time_ms = execution.running_time_ms();
    let is_active = !execution.status.is_terminal();
    Ok(Json(json!({
        "executionId": execution.execution_id,
        "workflowId": execution.workflow_id,
        "tenantId": execution.tenant_id,
        "status": execution.status,
        "inputs": execution.inputs,
        "result": execution.result,
        "error": execution.error,
        "startedAt": execution.started_at,
        "completedAt": execution.completed_at,
        "checkpoints": execution.checkpoints,
        "metrics": execution.metrics,
        "runningTime": running_time_ms,
        "isActive": is_active,
        "createdAt": execution.created_at,
    })))
}

async fn cancel_execution(ctx: RequestContext, Path(execution_id): Path<String>, Extension(engine): Extension<Arc<ExecutionEngine>>) -> ApiResult<Json<Value>> {
    engine.cancel_execution(&execution_id, &ctx).await?;
    Ok(Json(json!({ "executionId": execution_id, "acknowledged": true })))
}

fn parse_status(raw: &str) -> Result<ExecutionStatus, ApiError> {
    serde_json::from_value(Value::String(raw.to_owned())).map_err(|_| ApiError::validation(format!("unknown execution status '{raw}'")))
}

async fn list_executions(ctx: RequestContext, Query(q): Query<ListExecutionsQuery>, Extension(engine): Extension<Arc<ExecutionEngine>>) -> ApiResult<Json<Value>> {
    let status = q.status.as_deref().map(parse_status).transpose()?;
    let filters = ExecutionFilters {
        workflow_id: q.workflow_id,
        status,
        page: q.page.unwrap_or(1),
        limit: q.limit.unwrap_or(20),
    };
    let page = engine.list_executions(&ctx.tenant_context, &filters).await?;
    Ok(Json(json!({
        "data": page.data,
        "total": page.total,
        "page": filters.page.max(1),
        "limit": filters.limit.clamp(1, 200),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_status_accepts_known_variants() {
        assert_eq!(parse_status("completed").expect("known"), ExecutionStatus::Completed);
        assert_eq!(parse_status("running").expect("known"), ExecutionStatus::Running);
    }

    #[test]
    fn parse_status_rejects_unknown() {
        assert!(parse_status("not-a-status").is_err());
    }
}
