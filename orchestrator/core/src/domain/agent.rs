// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Agent Domain
//!
//! An agent is a graph node wrapping a capability set (role, tools, model).
//! It consumes a [`Task`] together with the branch [`Context`] and produces an
//! [`AgentResult`] plus zero or more [`RoutingRequest`]s addressed to other
//! nodes. Routing requests are how agents talk to each other non-linearly;
//! the executor only honours them along declared edges.
//!
//! Model or tool invocation behind an agent is an external collaborator. An
//! implementation must be safe to retry after an [`AgentError::Processing`]
//! failure and must return promptly once the cancellation token fires.

use crate::domain::execution::Context;
use crate::domain::graph::NodeId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Agents are addressed by their node id
pub type AgentId = NodeId;

/// Specialisation of an agent
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Frontend,
    AppBuilder,
    Codegen,
    Engineering,
    Orchestrator,
    Custom(String),
}

impl AgentRole {
    /// Parse a role name; unknown names become [`AgentRole::Custom`]
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "frontend" => AgentRole::Frontend,
            "app_builder" | "appbuilder" => AgentRole::AppBuilder,
            "codegen" => AgentRole::Codegen,
            "engineering" => AgentRole::Engineering,
            "orchestrator" => AgentRole::Orchestrator,
            _ => AgentRole::Custom(name.trim().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            AgentRole::Frontend => "frontend",
            AgentRole::AppBuilder => "app_builder",
            AgentRole::Codegen => "codegen",
            AgentRole::Engineering => "engineering",
            AgentRole::Orchestrator => "orchestrator",
            AgentRole::Custom(name) => name,
        }
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static description of an agent node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub id: AgentId,
    pub name: String,
    pub role: AgentRole,
    /// Tool / skill identifiers
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    /// Opaque model reference handed to the model invoker
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl AgentConfig {
    pub fn new(id: impl Into<AgentId>, name: impl Into<String>, role: AgentRole) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role,
            capabilities: BTreeSet::new(),
            model: None,
        }
    }

    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.insert(capability.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

// ============================================================================
// Tasks
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

/// Unit of work handed to an agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub description: String,
    pub assigned_to: Option<AgentId>,
    #[serde(default)]
    pub input_data: HashMap<String, Value>,
    pub status: TaskStatus,
}

impl Task {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            id: TaskId::new(),
            description: description.into(),
            assigned_to: None,
            input_data: HashMap::new(),
            status: TaskStatus::Queued,
        }
    }

    pub fn with_input(mut self, key: impl Into<String>, value: Value) -> Self {
        self.input_data.insert(key.into(), value);
        self
    }

    pub fn assigned(mut self, agent: impl Into<AgentId>) -> Self {
        self.assigned_to = Some(agent.into());
        self
    }

    /// Derive a task for `node_id` from a branch context.
    ///
    /// The description is read from the `description` key, falling back to
    /// `fallback_description`.
    pub fn from_context(node_id: &NodeId, context: &Context, fallback_description: &str) -> Self {
        let description = context
            .get_str("description")
            .unwrap_or(fallback_description)
            .to_string();
        Self {
            id: TaskId::new(),
            description,
            assigned_to: Some(node_id.clone()),
            input_data: context.data().clone(),
            status: TaskStatus::Queued,
        }
    }

    pub fn start(&mut self) {
        self.status = TaskStatus::Running;
    }

    pub fn complete(&mut self) {
        self.status = TaskStatus::Completed;
    }

    pub fn fail(&mut self) {
        self.status = TaskStatus::Failed;
    }
}

// ============================================================================
// Results and Routing
// ============================================================================

/// Outcome of an agent processing a task
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentResult {
    pub success: bool,
    /// Merged into the branch context
    #[serde(default)]
    pub output: HashMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    /// Explicit completion: the branch ends here regardless of edges or routes
    #[serde(default)]
    pub complete: bool,
}

impl AgentResult {
    pub fn success() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    pub fn failure(explanation: impl Into<String>) -> Self {
        Self {
            success: false,
            explanation: Some(explanation.into()),
            ..Default::default()
        }
    }

    pub fn with_output(mut self, key: impl Into<String>, value: Value) -> Self {
        self.output.insert(key.into(), value);
        self
    }

    pub fn with_explanation(mut self, explanation: impl Into<String>) -> Self {
        self.explanation = Some(explanation.into());
        self
    }

    pub fn completed(mut self) -> Self {
        self.complete = true;
        self
    }
}

/// Request from an agent to execute another node with a new task.
///
/// `priority` is advisory; it does not reorder fan-out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingRequest {
    pub target: NodeId,
    pub task: Task,
    #[serde(default)]
    pub priority: i32,
}

impl RoutingRequest {
    pub fn new(target: impl Into<NodeId>, task: Task) -> Self {
        let target = target.into();
        Self {
            task: task.assigned(target.clone()),
            target,
            priority: 0,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// Everything an agent hands back to the executor
#[derive(Debug, Clone, Default)]
pub struct AgentOutput {
    pub result: AgentResult,
    pub routes: Vec<RoutingRequest>,
}

impl AgentOutput {
    pub fn new(result: AgentResult) -> Self {
        Self {
            result,
            routes: Vec::new(),
        }
    }

    /// Successful result that ends the branch
    pub fn done(result: AgentResult) -> Self {
        Self::new(result.completed())
    }

    pub fn route(mut self, request: RoutingRequest) -> Self {
        self.routes.push(request);
        self
    }
}

// ============================================================================
// Agent contract
// ============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AgentError {
    /// Transient failure of the underlying model/tool call; retried by the executor
    #[error("Agent processing failed: {0}")]
    Processing(String),

    /// Permanent failure; never retried
    #[error("Agent failed: {0}")]
    Fatal(String),

    #[error("Agent processing cancelled")]
    Cancelled,
}

impl AgentError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, AgentError::Processing(_))
    }
}

#[async_trait]
pub trait Agent: Send + Sync {
    fn config(&self) -> &AgentConfig;

    /// Process `task` against a read-only view of the branch context.
    async fn process_task(
        &self,
        task: Task,
        context: &Context,
        cancel: &CancellationToken,
    ) -> Result<AgentOutput, AgentError>;
}

/// Builds agent implementations from configuration
pub trait AgentFactory: Send + Sync {
    fn create(&self, config: &AgentConfig) -> Arc<dyn Agent>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_role_parse() {
        assert_eq!(AgentRole::parse("Frontend"), AgentRole::Frontend);
        assert_eq!(AgentRole::parse("app-builder"), AgentRole::AppBuilder);
        assert_eq!(AgentRole::parse("orchestrator"), AgentRole::Orchestrator);
        assert_eq!(AgentRole::parse("qa"), AgentRole::Custom("qa".to_string()));
    }

    #[test]
    fn test_routing_request_assigns_task() {
        let request = RoutingRequest::new("codegen", Task::new("write the API client"));
        assert_eq!(request.task.assigned_to, Some(NodeId::from("codegen")));
        assert_eq!(request.priority, 0);
    }

    #[test]
    fn test_task_from_context() {
        let mut context = Context::new();
        context.set("description", json!("Create a profile page"));
        context.set("user", json!("ada"));

        let task = Task::from_context(&"frontend".into(), &context, "fallback");
        assert_eq!(task.description, "Create a profile page");
        assert_eq!(task.input_data.get("user"), Some(&json!("ada")));
        assert_eq!(task.assigned_to, Some("frontend".into()));

        let task = Task::from_context(&"frontend".into(), &Context::new(), "fallback");
        assert_eq!(task.description, "fallback");
    }

    #[test]
    fn test_agent_error_retryability() {
        assert!(AgentError::Processing("timeout".into()).is_retryable());
        assert!(!AgentError::Fatal("bad prompt".into()).is_retryable());
        assert!(!AgentError::Cancelled.is_retryable());
    }
}
