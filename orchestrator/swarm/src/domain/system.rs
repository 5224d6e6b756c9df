// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Multi-Agent System Domain Types
//!
//! - [`SystemId`] - unique identifier (UUID newtype).
//! - [`TaskResult`] - what a task execution hands back to the caller.
//! - [`SystemError`] - failures of system composition and execution.
//! - [`STANDARD_AGENTS`] / [`STANDARD_EDGES`] - the five-role team topology.

use agent_graph_core::application::executor::ExecutorError;
use agent_graph_core::domain::agent::{AgentId, AgentRole, Task, TaskStatus};
use agent_graph_core::domain::execution::{ExecutionState, ExecutionStatus};
use agent_graph_core::domain::graph::{GraphError, NodeId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a multi-agent system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SystemId(pub Uuid);

impl SystemId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SystemId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SystemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of [`execute_task`](crate::application::MultiAgentSystem::execute_task).
///
/// The task's status mirrors the execution: `Completed` only when the
/// execution completed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub task: Task,
    pub state: ExecutionState,
}

impl TaskResult {
    pub fn new(mut task: Task, state: ExecutionState) -> Self {
        match state.status {
            ExecutionStatus::Completed => task.complete(),
            _ => task.fail(),
        }
        Self { task, state }
    }

    pub fn succeeded(&self) -> bool {
        self.task.status == TaskStatus::Completed
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    #[error("Agent '{0}' is already part of the system")]
    DuplicateAgent(AgentId),

    #[error("Unknown agent '{0}'")]
    UnknownAgent(NodeId),

    #[error("No agent with role '{role}'")]
    NotFound { role: AgentRole },

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Executor(#[from] ExecutorError),
}

impl SystemError {
    /// Partial execution state carried by terminal execution errors
    pub fn partial_state(&self) -> Option<&ExecutionState> {
        match self {
            SystemError::Executor(e) => e.partial_state(),
            _ => None,
        }
    }
}

/// Agents of the standard team: (id, display name, role)
pub const STANDARD_AGENTS: [(&str, &str, AgentRole); 5] = [
    ("orchestrator", "Orchestrator", AgentRole::Orchestrator),
    ("frontend", "Frontend", AgentRole::Frontend),
    ("app_builder", "App Builder", AgentRole::AppBuilder),
    ("codegen", "Codegen", AgentRole::Codegen),
    ("engineering", "Engineering", AgentRole::Engineering),
];

/// Specialist edges of the standard team. The orchestrator is additionally
/// connected to and from every specialist.
pub const STANDARD_EDGES: [(&str, &str); 5] = [
    ("frontend", "app_builder"),
    ("frontend", "codegen"),
    ("app_builder", "codegen"),
    ("codegen", "engineering"),
    ("engineering", "codegen"),
];

#[cfg(test)]
mod tests {
    use super::*;
    use agent_graph_core::domain::execution::Context;
    use agent_graph_core::domain::graph::GraphId;

    #[test]
    fn test_task_result_mirrors_execution_status() {
        let mut state = ExecutionState::new(GraphId::new(), NodeId::from("orchestrator"), Context::new());
        state.start();
        state.complete();
        let result = TaskResult::new(Task::new("build"), state.clone());
        assert!(result.succeeded());

        state.fail();
        let result = TaskResult::new(Task::new("build"), state);
        assert_eq!(result.task.status, TaskStatus::Failed);
    }

    #[test]
    fn test_standard_topology_ids_are_unique() {
        let mut ids: Vec<&str> = STANDARD_AGENTS.iter().map(|(id, _, _)| *id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), STANDARD_AGENTS.len());
        for (from, to) in STANDARD_EDGES {
            assert!(ids.contains(&from) && ids.contains(&to));
        }
    }
}
