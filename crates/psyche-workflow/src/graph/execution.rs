use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use psyche_core::error::PsycheError;
use psyche_core::types::{AgentResponse, Payload};

/// Lifecycle of one chain execution.
///
/// `pending -> running -> {completed | failed | timed_out}`; terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    TimedOut,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::TimedOut
        )
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::TimedOut => "timed_out",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = PsycheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ExecutionStatus::Pending),
            "running" => Ok(ExecutionStatus::Running),
            "completed" => Ok(ExecutionStatus::Completed),
            "failed" => Ok(ExecutionStatus::Failed),
            "timed_out" => Ok(ExecutionStatus::TimedOut),
            other => Err(PsycheError::InvalidInput(format!(
                "unknown execution status '{}'",
                other
            ))),
        }
    }
}

/// Outcome of one node within an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Succeeded,
    Failed,
    /// Not invoked: an upstream node did not succeed, or its condition was false.
    Skipped,
}

/// Per-node result record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeExecution {
    pub node_id: String,
    pub status: NodeStatus,
    pub success: bool,
    #[serde(default)]
    pub output_data: Payload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Seconds spent inside the agent, as reported on its response.
    pub processing_time: f64,
    pub elapsed_ms: u64,
    /// Invocations made (LOOP nodes may make several; skipped nodes make none).
    pub iterations: u32,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl NodeExecution {
    pub fn from_response(
        node_id: impl Into<String>,
        response: AgentResponse,
        started_at: DateTime<Utc>,
        elapsed_ms: u64,
        iterations: u32,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            status: if response.success {
                NodeStatus::Succeeded
            } else {
                NodeStatus::Failed
            },
            success: response.success,
            output_data: response.data,
            error: response.error,
            confidence: response.confidence,
            processing_time: response.processing_time,
            elapsed_ms,
            iterations,
            started_at,
            completed_at: Utc::now(),
        }
    }

    pub fn skipped(node_id: impl Into<String>, reason: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            node_id: node_id.into(),
            status: NodeStatus::Skipped,
            success: false,
            output_data: Payload::new(),
            error: Some(reason.into()),
            confidence: None,
            processing_time: 0.0,
            elapsed_ms: 0,
            iterations: 0,
            started_at: now,
            completed_at: now,
        }
    }
}

/// One run of a chain against one input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub execution_id: String,
    pub chain_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub status: ExecutionStatus,
    pub node_executions: HashMap<String, NodeExecution>,
    /// Node ids in the order their records were written.
    pub execution_order: Vec<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Execution {
    pub fn new(chain_id: impl Into<String>, user_id: Option<&str>) -> Self {
        Self {
            execution_id: Uuid::new_v4().to_string(),
            chain_id: chain_id.into(),
            user_id: user_id.map(str::to_string),
            status: ExecutionStatus::Pending,
            node_executions: HashMap::new(),
            execution_order: Vec::new(),
            started_at: Utc::now(),
            completed_at: None,
            error: None,
        }
    }

    /// Move `pending -> running`.
    pub fn start(&mut self) -> bool {
        if self.status != ExecutionStatus::Pending {
            return false;
        }
        self.status = ExecutionStatus::Running;
        self.started_at = Utc::now();
        true
    }

    /// Store a node result. Ignored once the execution is terminal.
    pub fn record(&mut self, node: NodeExecution) {
        if self.status.is_terminal() {
            return;
        }
        if !self.node_executions.contains_key(&node.node_id) {
            self.execution_order.push(node.node_id.clone());
        }
        self.node_executions.insert(node.node_id.clone(), node);
    }

    /// Move to a terminal status. Returns false if already terminal.
    pub fn finish(&mut self, status: ExecutionStatus, error: Option<String>) -> bool {
        if self.status.is_terminal() || !status.is_terminal() {
            return false;
        }
        self.status = status;
        self.error = error;
        self.completed_at = Some(Utc::now());
        true
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn node(&self, node_id: &str) -> Option<&NodeExecution> {
        self.node_executions.get(node_id)
    }

    /// The first unsuccessful node in recording order, preferring real failures over skips.
    pub fn first_failure(&self) -> Option<&NodeExecution> {
        let records = || {
            self.execution_order
                .iter()
                .filter_map(|id| self.node_executions.get(id))
        };
        records()
            .find(|n| n.status == NodeStatus::Failed)
            .or_else(|| records().find(|n| !n.success))
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.completed_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }
}

/// Aggregate counters for observability.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionMetrics {
    /// Executions started since the engine was created.
    pub total_executions: u64,
    pub active_executions: usize,
    pub registered_agents: usize,
    /// Retained executions per terminal status.
    pub completed: usize,
    pub failed: usize,
    pub timed_out: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(node: &str) -> NodeExecution {
        NodeExecution::from_response(
            node,
            AgentResponse::success(node, Payload::new()),
            Utc::now(),
            1,
            1,
        )
    }

    fn failed(node: &str) -> NodeExecution {
        NodeExecution::from_response(node, AgentResponse::failure(node, "boom"), Utc::now(), 1, 1)
    }

    #[test]
    fn test_state_machine() {
        let mut exec = Execution::new("c", Some("user-1"));
        assert_eq!(exec.status, ExecutionStatus::Pending);
        assert!(exec.start());
        assert!(!exec.start());
        assert!(!exec.finish(ExecutionStatus::Running, None));
        assert!(exec.finish(ExecutionStatus::Completed, None));
        assert!(!exec.finish(ExecutionStatus::Failed, Some("late".into())));
        assert_eq!(exec.status, ExecutionStatus::Completed);
        assert!(exec.completed_at.is_some());
        assert!(exec.duration_ms().is_some());
    }

    #[test]
    fn test_record_ignored_after_terminal() {
        let mut exec = Execution::new("c", None);
        exec.start();
        exec.record(ok("a"));
        exec.finish(ExecutionStatus::TimedOut, Some("deadline".into()));
        exec.record(ok("late"));
        assert_eq!(exec.execution_order, vec!["a"]);
        assert!(exec.node("late").is_none());
    }

    #[test]
    fn test_first_failure_prefers_failed_over_skipped() {
        let mut exec = Execution::new("c", None);
        exec.start();
        exec.record(ok("a"));
        exec.record(NodeExecution::skipped("b", "condition not met"));
        exec.record(failed("c"));
        assert_eq!(exec.first_failure().unwrap().node_id, "c");

        let mut exec = Execution::new("c", None);
        exec.start();
        exec.record(NodeExecution::skipped("b", "condition not met"));
        assert_eq!(exec.first_failure().unwrap().node_id, "b");
    }

    #[test]
    fn test_node_record_from_response() {
        let response = AgentResponse::success("agent", Payload::new())
            .with_confidence(0.7)
            .with_processing_time(0.25);
        let record = NodeExecution::from_response("n", response, Utc::now(), 250, 2);
        assert_eq!(record.status, NodeStatus::Succeeded);
        assert_eq!(record.confidence, Some(0.7));
        assert_eq!(record.processing_time, 0.25);
        assert_eq!(record.iterations, 2);

        let skipped = NodeExecution::skipped("s", "upstream node 'x' did not succeed");
        assert!(!skipped.success);
        assert_eq!(skipped.iterations, 0);
    }

    #[test]
    fn test_status_strings() {
        assert_eq!(ExecutionStatus::TimedOut.to_string(), "timed_out");
        assert_eq!("failed".parse::<ExecutionStatus>().unwrap(), ExecutionStatus::Failed);
        assert!("done".parse::<ExecutionStatus>().is_err());
        assert_eq!(
            serde_json::to_value(ExecutionStatus::TimedOut).unwrap(),
            serde_json::json!("timed_out")
        );
    }
}
