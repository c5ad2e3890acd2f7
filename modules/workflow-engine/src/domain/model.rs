//! Workflow / Execution data model (spec §3.3).
//!
//! Unlike the generic `Document` (spec §3.1), a workflow's metadata and an
//! execution's checkpoints have a fixed shape the engine must reason about
//! structurally (node ids, edges, conditions) — so these get their own
//! dedicated collections and Rust types rather than riding the polymorphic
//! document store (spec §6.2: `workflows` and `executions` are their own
//! indexed collections).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Active,
    Inactive,
    Deprecated,
}

/// One agent declaration inside a workflow's metadata graph (spec §4.4.2
/// "Nodes: one per agent declaration").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDeclaration {
    pub id: String,
    #[serde(rename = "agentType")]
    pub agent_type: String,
    #[serde(default)]
    pub config: Value,
    /// Allows a self-loop or re-entrant edge into this node (spec §4.4.2
    /// "no cycles unless an explicit maxIterations is declared on a node").
    #[serde(rename = "maxIterations", skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,
}

/// One directed edge in the metadata graph. `condition` is a safe-evaluator
/// expression (spec §9 "sandboxed recursive-descent parser") evaluated
/// against the live execution state; edges without a condition are the
/// router's declared default for their source node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub from: String,
    pub to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowMetadata {
    pub agents: Vec<AgentDeclaration>,
    pub connections: Vec<Connection>,
    #[serde(rename = "entryPoint")]
    pub entry_point: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowStats {
    #[serde(rename = "executionCount")]
    pub execution_count: u64,
    #[serde(rename = "avgDurationMs")]
    pub avg_duration_ms: f64,
    #[serde(rename = "successRate")]
    pub success_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    #[serde(rename = "tenantId")]
    pub tenant_id: String,
    pub name: String,
    pub metadata: WorkflowMetadata,
    pub status: WorkflowStatus,
    #[serde(default)]
    pub stats: WorkflowStats,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

/// Execution state machine (spec §3.3): `Pending -> Running -> {Completed,
/// Failed, Cancelled}`; `Running <-> Paused`; the three listed terminal
/// variants are sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Paused,
}

impl ExecutionStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether `self -> next` is a legal state-machine transition (spec
    /// §3.3, §8 invariant 4).
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        use ExecutionStatus::{Cancelled, Completed, Failed, Paused, Pending, Running};
        match (self, next) {
            (Pending, Running | Cancelled) => true,
            (Running, Completed | Failed | Cancelled | Paused) => true,
            (Paused, Running | Cancelled) => true,
            _ => false,
        }
    }
}

/// A checkpoint written after each node (spec §4.4.3 "Checkpointing").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    #[serde(rename = "agentId")]
    pub agent_id: String,
    /// State snapshot at the time this checkpoint was written.
    pub state: Value,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionMetrics {
    #[serde(rename = "agentCalls")]
    pub agent_calls: u32,
    #[serde(rename = "durationMs")]
    pub duration_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    #[serde(rename = "executionId")]
    pub execution_id: String,
    #[serde(rename = "workflowId")]
    pub workflow_id: String,
    #[serde(rename = "tenantId")]
    pub tenant_id: String,
    #[serde(rename = "userId")]
    pub user_id: String,
    pub status: ExecutionStatus,
    pub inputs: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(rename = "startedAt", skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(rename = "completedAt", skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub checkpoints: Vec<Checkpoint>,
    #[serde(default)]
    pub metrics: ExecutionMetrics,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

/// Checkpoints retained per execution (spec §4.4.3 "bounded per execution,
/// FIFO, last N retained"). Older ones are dropped outright rather than
/// summarized — summarization would need an LLM call this crate has no
/// business making on the hot checkpoint path.
pub const MAX_CHECKPOINTS: usize = 50;

impl Execution {
    #[must_use]
    pub fn running_time_ms(&self) -> Option<i64> {
        let started = self.started_at?;
        let end = self.completed_at.unwrap_or_else(Utc::now);
        Some((end - started).num_milliseconds())
    }

    pub fn push_checkpoint(&mut self, checkpoint: Checkpoint) {
        self.checkpoints.push(checkpoint);
        if self.checkpoints.len() > MAX_CHECKPOINTS {
            let overflow = self.checkpoints.len() - MAX_CHECKPOINTS;
            self.checkpoints.drain(0..overflow);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_cannot_jump_straight_to_completed() {
        assert!(!ExecutionStatus::Pending.can_transition_to(ExecutionStatus::Completed));
        assert!(ExecutionStatus::Pending.can_transition_to(ExecutionStatus::Running));
    }

    #[test]
    fn terminal_states_are_sinks() {
        assert!(!ExecutionStatus::Completed.can_transition_to(ExecutionStatus::Running));
        assert!(ExecutionStatus::Completed.is_terminal());
    }

    #[test]
    fn running_and_paused_are_mutually_reachable() {
        assert!(ExecutionStatus::Running.can_transition_to(ExecutionStatus::Paused));
        assert!(ExecutionStatus::Paused.can_transition_to(ExecutionStatus::Running));
    }

    #[test]
    fn checkpoints_are_bounded_fifo() {
        let mut exec = Execution {
            execution_id: "e1".to_owned(),
            workflow_id: "w1".to_owned(),
            tenant_id: "t1".to_owned(),
            user_id: "u1".to_owned(),
            status: ExecutionStatus::Running,
            inputs: Value::Null,
            result: None,
            error: None,
            started_at: Some(Utc::now()),
            completed_at: None,
            checkpoints: Vec::new(),
            metrics: ExecutionMetrics::default(),
            created_at: Utc::now(),
        };
        for i in 0..(MAX_CHECKPOINTS + 10) {
            exec.push_checkpoint(Checkpoint {
                agent_id: format!("agent-{i}"),
                state: Value::Null,
                message: String::new(),
                timestamp: Utc::now(),
            });
        }
        assert_eq!(exec.checkpoints.len(), MAX_CHECKPOINTS);
        assert_eq!(exec.checkpoints.first().unwrap().agent_id, "agent-10");
    }
}
