//! Execution engine (§4.4.3): owns the lifecycle of every workflow run —
//! start, progress, persist, cancel, query.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use modkit::MetricsRegistry;
use modkit_audit::{AuditEventType, AuditTrail};
use modkit_auth::{RequestContext, TenantContext};
use modkit_errors::ApiError;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::agents::{self, AgentRuntime};
use super::graph::{self, CompiledGraph};
use super::model::{Checkpoint, Execution, ExecutionMetrics, ExecutionStatus, Workflow};
use super::repository::{ExecutionFilters, ExecutionPage, ExecutionRepository, ExecutionStats, WorkflowRepository};

const ACTIVE_EXECUTIONS_GAUGE: &str = "workflow_engine_active_executions";

/// One execution in flight: the cooperative-cancellation handle the engine
/// checks before walking to the next node (§4.4.3 "Cancellation is
/// cooperative").
struct RunningExecution {
    cancel: CancellationToken,
}

pub struct ExecutionEngine {
    workflows: Arc<WorkflowRepository>,
    executions: Arc<ExecutionRepository>,
    runtime: Arc<AgentRuntime>,
    audit: Arc<dyn AuditTrail>,
    metrics: Arc<MetricsRegistry>,
    running: DashMap<String, RunningExecution>,
}

/// Result handed back to the route that started the run (§4.4.3
/// `executeWorkflow`'s return shape): the engine has persisted the pending
/// record and spawned the task by the time this returns, it has not
/// necessarily finished.
pub struct ExecutionHandle {
    pub execution_id: String,
    pub status: ExecutionStatus,
}

impl ExecutionEngine {
    #[must_use]
    pub fn new(workflows: Arc<WorkflowRepository>, executions: Arc<ExecutionRepository>, runtime: Arc<AgentRuntime>, audit: Arc<dyn AuditTrail>, metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            workflows,
            executions,
            runtime,
            audit,
            metrics,
            running: DashMap::new(),
        }
    }

    #[must_use]
    pub fn active_count(&self) -> usize {
        self.running.len()
    }

    /// `executeWorkflow(metadata, inputs, context)` (§4.4.3): inserts the
    /// `pending` record, then spawns the cooperative task that walks the
    /// compiled graph. Returns as soon as the record is inserted and the
    /// task is spawned — it does not wait for completion.
    ///
    /// # Errors
    /// `ApiError::not_found` if `workflow_id` doesn't resolve in `ctx`'s
    /// tenant; `ApiError::validation` if the workflow's metadata fails
    /// graph compilation; `ApiError::database` on a driver error.
    pub async fn execute_workflow(self: &Arc<Self>, workflow_id: &str, inputs: Value, ctx: &RequestContext) -> Result<ExecutionHandle, ApiError> {
        let workflow = self.workflows.find_by_id(&ctx.tenant_context, workflow_id).await?;
        let compiled = graph::compile(&workflow.metadata)?;

        let execution = Execution {
            execution_id: Uuid::new_v4().to_string(),
            workflow_id: workflow.id.clone(),
            tenant_id: ctx.tenant_context.tenant_id.clone(),
            user_id: ctx.tenant_context.user_id.clone(),
            status: ExecutionStatus::Pending,
            inputs,
            result: None,
            error: None,
            started_at: None,
            completed_at: None,
            checkpoints: Vec::new(),
            metrics: ExecutionMetrics::default(),
            created_at: Utc::now(),
        };
        self.executions.insert(&execution).await?;

        let event = modkit_audit::AuditEvent::new(
            AuditEventType::WorkflowExecute,
            ctx.tenant_context.user_id.clone(),
            ctx.tenant_context.tenant_id.clone(),
            "execution",
            execution.execution_id.clone(),
        )
        .with_after(serde_json::json!({ "workflowId": workflow.id }));
        if let Err(e) = self.audit.record(event).await {
            tracing::warn!(execution_id = %execution.execution_id, error = %e, "failed to record audit event");
        }

        let handle = ExecutionHandle {
            execution_id: execution.execution_id.clone(),
            status: execution.status,
        };

        let engine = Arc::clone(self);
        let cancel = CancellationToken::new();
        self.running.insert(execution.execution_id.clone(), RunningExecution { cancel: cancel.clone() });
        self.metrics.incr_gauge(ACTIVE_EXECUTIONS_GAUGE);

        tokio::spawn(async move {
            engine.run(execution, compiled, cancel).await;
        });

        Ok(handle)
    }

    /// Walks the compiled graph to completion, cancellation, or failure,
    /// persisting a checkpoint after every node (§4.4.3 steps 2-4).
    async fn run(self: Arc<Self>, mut execution: Execution, graph: CompiledGraph, cancel: CancellationToken) {
        let execution_id = execution.execution_id.clone();
        execution.status = ExecutionStatus::Running;
        execution.started_at = Some(Utc::now());
        if let Err(e) = self.executions.replace(&execution).await {
            tracing::error!(execution_id, error = %e, "failed to persist running transition");
        }

        let mut current = graph.entry.clone();
        let mut state = execution.inputs.clone();
        let mut iterations: std::collections::HashMap<String, u32> = std::collections::HashMap::new();

        let outcome = loop {
            if cancel.is_cancelled() {
                break Outcome::Cancelled;
            }

            let Some(node) = graph.node(&current) else {
                break Outcome::Failed(format!("internal: node '{current}' vanished from the compiled graph"));
            };

            let count = iterations.entry(current.clone()).or_insert(0);
            *count += 1;
            if let Some(max) = node.max_iterations {
                if *count > max {
                    break Outcome::Failed(format!("node '{current}' exceeded maxIterations ({max})"));
                }
            }

            let agent = match agents::create(&node.agent_type, &node.config) {
                Ok(agent) => agent,
                Err(e) => break Outcome::Failed(e.message),
            };

            let output = match agent.invoke(&state, &self.runtime).await {
                Ok(output) => output,
                Err(e) => break Outcome::Failed(e.message),
            };

            execution.metrics.agent_calls += 1;
            state = output.clone();
            execution.push_checkpoint(Checkpoint {
                agent_id: current.clone(),
                state: output,
                message: format!("completed node '{current}'"),
                timestamp: Utc::now(),
            });
            if let Err(e) = self.executions.replace(&execution).await {
                tracing::error!(execution_id = %execution_id, error = %e, "failed to persist checkpoint");
            }

            match self.next_node(&graph, &current, &state) {
                Ok(Some(next)) => current = next,
                Ok(None) => break Outcome::Completed(state.clone()),
                Err(e) => break Outcome::Failed(e.message),
            }
        };

        self.finish(execution, outcome).await;
        self.running.remove(&execution_id);
        self.metrics.decr_gauge(ACTIVE_EXECUTIONS_GAUGE);
    }

    /// Router: picks the first outgoing edge whose condition is satisfied,
    /// or the first conditionless edge as the declared default (§4.4.2).
    /// `None` means the node has no outgoing edges — the walk is done.
    fn next_node(&self, graph: &CompiledGraph, current: &str, state: &Value) -> Result<Option<String>, ApiError> {
        let edges = graph.outgoing(current);
        let mut default = None;
        for edge in edges {
            match &edge.condition {
                Some(expr) => {
                    let bound = super::safe_eval::bind(expr, state);
                    if super::safe_eval::evaluate_condition(&bound)? {
                        return Ok(Some(edge.to.clone()));
                    }
                }
                None if default.is_none() => default = Some(edge.to.clone()),
                None => {}
            }
        }
        Ok(default)
    }

    async fn finish(&self, mut execution: Execution, outcome: Outcome) {
        execution.completed_at = Some(Utc::now());
        execution.metrics.duration_ms = execution.running_time_ms().unwrap_or(0);

        match outcome {
            Outcome::Completed(result) => {
                execution.status = ExecutionStatus::Completed;
                execution.result = Some(result);
            }
            Outcome::Failed(message) => {
                execution.status = ExecutionStatus::Failed;
                execution.error = Some(message);
            }
            Outcome::Cancelled => {
                execution.status = ExecutionStatus::Cancelled;
                execution.error = Some("cancelled".to_owned());
            }
        }

        if let Err(e) = self.executions.replace(&execution).await {
            tracing::error!(execution_id = %execution.execution_id, error = %e, "failed to persist terminal state");
        }

        let succeeded = execution.status == ExecutionStatus::Completed;
        let tenant = TenantContext::scoped(execution.tenant_id.clone(), execution.user_id.clone());
        if let Err(e) = self.workflows.record_execution_outcome(&tenant, &execution.workflow_id, succeeded, execution.metrics.duration_ms).await {
            tracing::warn!(workflow_id = %execution.workflow_id, error = %e, "failed to update workflow stats");
        }
    }

    /// `cancelExecution` (§4.4.3): acknowledges immediately; the execution's
    /// own task observes the flag before its next node and persists the
    /// terminal state itself.
    ///
    /// # Errors
    /// `ApiError::not_found` if `execution_id` names no running execution.
    pub async fn cancel_execution(&self, execution_id: &str, ctx: &RequestContext) -> Result<(), ApiError> {
        {
            let running = self
                .running
                .get(execution_id)
                .ok_or_else(|| ApiError::not_found(format!("execution '{execution_id}' is not running")))?;
            running.cancel.cancel();
        }

        let event = modkit_audit::AuditEvent::new(
            AuditEventType::WorkflowCancel,
            ctx.tenant_context.user_id.clone(),
            ctx.tenant_context.tenant_id.clone(),
            "execution",
            execution_id.to_owned(),
        );
        if let Err(e) = self.audit.record(event).await {
            tracing::warn!(execution_id, error = %e, "failed to record audit event");
        }
        Ok(())
    }

    /// # Errors
    /// `ApiError::not_found`/`ApiError::database`, see
    /// [`ExecutionRepository::find_by_id`].
    pub async fn get_execution(&self, tenant: &modkit_auth::TenantContext, execution_id: &str) -> Result<Execution, ApiError> {
        self.executions.find_by_id(tenant, execution_id).await
    }

    /// # Errors
    /// `ApiError::database` on a driver error.
    pub async fn list_executions(&self, tenant: &modkit_auth::TenantContext, filters: &ExecutionFilters) -> Result<ExecutionPage, ApiError> {
        self.executions.list(tenant, filters).await
    }

    /// # Errors
    /// `ApiError::database` on a driver error.
    pub async fn execution_stats(&self, tenant: &modkit_auth::TenantContext, workflow_id: Option<&str>) -> Result<ExecutionStats, ApiError> {
        self.executions.stats(tenant, workflow_id).await
    }

    /// Shutdown sweep (§4.4.3 "Shutdown"): cancels every in-memory running
    /// task, then catches anything left `pending`/`running`/`paused` in
    /// storage (a prior process crash, say) and marks it `cancelled` too.
    pub async fn shutdown(&self) {
        for entry in &self.running {
            entry.cancel.cancel();
        }
        // Give cooperative tasks a moment to observe the flag and persist
        // their own terminal state before the sweep below catches stragglers.
        tokio::time::sleep(Duration::from_millis(200)).await;

        let Ok(active) = self.executions.find_active().await else {
            return;
        };
        for mut execution in active {
            execution.status = ExecutionStatus::Cancelled;
            execution.error = Some("server shutdown".to_owned());
            execution.completed_at = Some(Utc::now());
            if let Err(e) = self.executions.replace(&execution).await {
                tracing::error!(execution_id = %execution.execution_id, error = %e, "failed to persist shutdown cancellation");
            }
        }
    }
}

enum Outcome {
    Completed(Value),
    Failed(String),
    Cancelled,
}
