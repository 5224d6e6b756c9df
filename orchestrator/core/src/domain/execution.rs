// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Execution Domain Model
//!
//! Per-run mutable state of a graph execution: the branch [`Context`], the
//! [`ExecutionState`] record returned to callers, and the execution-level
//! error taxonomy.
//!
//! One [`ExecutionState`] exists per `Executor::execute` call and is owned
//! exclusively by the executor; agents only ever see a [`Context`].

use crate::domain::graph::{GraphId, NodeId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionId(pub Uuid);

impl ExecutionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one sequential branch within an execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BranchId(pub u32);

impl std::fmt::Display for BranchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "b{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Value Objects: Context (branch scratch space)
// ============================================================================

/// Scratch space nodes read and write.
///
/// A context is owned by exactly one branch. Fan-out hands each new branch a
/// clone; contexts are only merged back at explicit join nodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context {
    data: HashMap<String, Value>,
}

impl Context {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(|v| v.as_str())
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.data.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Present and not null / false / 0 / "" / [] / {}
    pub fn is_truthy(&self, key: &str) -> bool {
        match self.data.get(key) {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
            Some(Value::String(s)) => !s.is_empty(),
            Some(Value::Array(a)) => !a.is_empty(),
            Some(Value::Object(o)) => !o.is_empty(),
        }
    }

    pub fn data(&self) -> &HashMap<String, Value> {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Merge another context into this one (incoming keys win)
    pub fn merge(&mut self, other: &Context) {
        for (key, value) in &other.data {
            self.data.insert(key.clone(), value.clone());
        }
    }

    /// Merge a plain map into this one (incoming keys win)
    pub fn extend(&mut self, values: impl IntoIterator<Item = (String, Value)>) {
        self.data.extend(values);
    }

    pub fn into_inner(self) -> HashMap<String, Value> {
        self.data
    }
}

impl From<HashMap<String, Value>> for Context {
    fn from(data: HashMap<String, Value>) -> Self {
        Self { data }
    }
}

impl FromIterator<(String, Value)> for Context {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self {
            data: iter.into_iter().collect(),
        }
    }
}

// ============================================================================
// Entities: History
// ============================================================================

/// Result of a single node dispatch attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum NodeOutcome {
    Succeeded,
    Failed { reason: String },
    Cancelled,
}

impl NodeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, NodeOutcome::Succeeded)
    }
}

/// One node-dispatch attempt in an execution's history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeExecutionRecord {
    pub node_id: NodeId,
    pub branch: BranchId,
    /// 1-based attempt number (retries get their own record)
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub outcome: NodeOutcome,
}

// ============================================================================
// Aggregate: ExecutionState
// ============================================================================

/// Full record of one run of a graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionState {
    pub graph_id: GraphId,
    pub execution_id: ExecutionId,
    /// Nodes where live branches stopped (empty after natural completion)
    pub frontier: Vec<NodeId>,
    pub context: Context,
    pub status: ExecutionStatus,
    pub history: Vec<NodeExecutionRecord>,
    /// Branch-level failures, in the order they were observed
    pub errors: Vec<ExecutionError>,
    /// Number of node dispatches consumed against `max_steps`
    pub steps: usize,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl ExecutionState {
    pub fn new(graph_id: GraphId, entry: NodeId, context: Context) -> Self {
        Self {
            graph_id,
            execution_id: ExecutionId::new(),
            frontier: vec![entry],
            context,
            status: ExecutionStatus::Pending,
            history: Vec::new(),
            errors: Vec::new(),
            steps: 0,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    pub fn start(&mut self) {
        self.status = ExecutionStatus::Running;
    }

    pub fn complete(&mut self) {
        self.finish(ExecutionStatus::Completed);
    }

    pub fn fail(&mut self) {
        self.finish(ExecutionStatus::Failed);
    }

    pub fn cancel(&mut self) {
        self.finish(ExecutionStatus::Cancelled);
    }

    fn finish(&mut self, status: ExecutionStatus) {
        self.status = status;
        self.ended_at = Some(Utc::now());
    }

    /// Node ids in history order (one entry per attempt)
    pub fn node_sequence(&self) -> Vec<&str> {
        self.history.iter().map(|r| r.node_id.as_str()).collect()
    }

    /// How many times `node_id` was dispatched
    pub fn visits(&self, node_id: &str) -> usize {
        self.history
            .iter()
            .filter(|r| r.node_id.as_str() == node_id)
            .count()
    }
}

// ============================================================================
// Domain Errors
// ============================================================================

/// Execution-level failures. Every variant names the execution and node.
///
/// Branch-local variants are recorded in [`ExecutionState::errors`]; the
/// terminal ones ([`ExecutionError::is_terminal`]) end the whole run.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionError {
    #[error("Execution {execution_id}: node '{node_id}' may not route to '{target}' (no declared edge)")]
    RoutingNotAllowed {
        execution_id: ExecutionId,
        node_id: NodeId,
        target: NodeId,
    },

    #[error("Execution {execution_id}: agent '{node_id}' failed after {attempts} attempt(s): {message}")]
    AgentProcessing {
        execution_id: ExecutionId,
        node_id: NodeId,
        attempts: u32,
        message: String,
    },

    #[error("Execution {execution_id}: node '{node_id}' failed: {message}")]
    NodeFailed {
        execution_id: ExecutionId,
        node_id: NodeId,
        message: String,
    },

    #[error("Execution {execution_id}: join '{node_id}' received {arrived} of {required} branches")]
    JoinIncomplete {
        execution_id: ExecutionId,
        node_id: NodeId,
        arrived: usize,
        required: usize,
    },

    #[error("Execution {execution_id}: max steps ({max_steps}) exceeded at node '{node_id}'")]
    MaxStepsExceeded {
        execution_id: ExecutionId,
        node_id: NodeId,
        max_steps: usize,
    },

    #[error("Execution {execution_id}: timed out after {timeout:?} (last node '{node_id}')")]
    Timeout {
        execution_id: ExecutionId,
        node_id: NodeId,
        #[serde(with = "humantime_serde")]
        timeout: Duration,
    },
}

impl ExecutionError {
    pub fn execution_id(&self) -> ExecutionId {
        match self {
            ExecutionError::RoutingNotAllowed { execution_id, .. }
            | ExecutionError::AgentProcessing { execution_id, .. }
            | ExecutionError::NodeFailed { execution_id, .. }
            | ExecutionError::JoinIncomplete { execution_id, .. }
            | ExecutionError::MaxStepsExceeded { execution_id, .. }
            | ExecutionError::Timeout { execution_id, .. } => *execution_id,
        }
    }

    pub fn node_id(&self) -> &NodeId {
        match self {
            ExecutionError::RoutingNotAllowed { node_id, .. }
            | ExecutionError::AgentProcessing { node_id, .. }
            | ExecutionError::NodeFailed { node_id, .. }
            | ExecutionError::JoinIncomplete { node_id, .. }
            | ExecutionError::MaxStepsExceeded { node_id, .. }
            | ExecutionError::Timeout { node_id, .. } => node_id,
        }
    }

    /// Terminal errors end the whole execution; the rest fail one branch
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionError::MaxStepsExceeded { .. } | ExecutionError::Timeout { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_context_operations() {
        let mut context = Context::new();

        context.set("iteration", json!(1));
        assert_eq!(context.get("iteration"), Some(&json!(1)));

        context.set("iteration", json!(2));
        assert_eq!(context.get("iteration"), Some(&json!(2)));

        context.remove("iteration");
        assert_eq!(context.get("iteration"), None);
    }

    #[test]
    fn test_context_merge_incoming_wins() {
        let mut left = Context::new();
        left.set("k", json!("left"));
        left.set("only_left", json!(true));

        let mut right = Context::new();
        right.set("k", json!("right"));

        left.merge(&right);
        assert_eq!(left.get_str("k"), Some("right"));
        assert!(left.contains_key("only_left"));
    }

    #[test]
    fn test_context_truthiness() {
        let context: Context = [
            ("zero".to_string(), json!(0)),
            ("empty".to_string(), json!("")),
            ("list".to_string(), json!([1])),
            ("null".to_string(), Value::Null),
        ]
        .into_iter()
        .collect();

        assert!(!context.is_truthy("zero"));
        assert!(!context.is_truthy("empty"));
        assert!(context.is_truthy("list"));
        assert!(!context.is_truthy("null"));
        assert!(!context.is_truthy("absent"));
    }

    #[test]
    fn test_state_lifecycle() {
        let mut state = ExecutionState::new(GraphId::new(), NodeId::from("entry"), Context::new());
        assert_eq!(state.status, ExecutionStatus::Pending);
        state.start();
        assert_eq!(state.status, ExecutionStatus::Running);
        state.complete();
        assert!(state.status.is_terminal());
        assert!(state.ended_at.is_some());
    }

    #[test]
    fn test_error_carries_ids() {
        let execution_id = ExecutionId::new();
        let error = ExecutionError::RoutingNotAllowed {
            execution_id,
            node_id: "frontend".into(),
            target: "billing".into(),
        };
        assert_eq!(error.execution_id(), execution_id);
        assert_eq!(error.node_id().as_str(), "frontend");
        assert!(!error.is_terminal());
        assert!(error.to_string().contains("billing"));
    }
}
