// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! End-to-end tests for the multi-agent system
//!
//! 1. The standard five-role team collaborating on one task
//! 2. Composition is rejected while a task is executing
//! 3. Systems built from a manifest

use agent_graph_core::application::model_agent::ModelAgentFactory;
use agent_graph_core::domain::agent::{
    Agent, AgentConfig, AgentError, AgentFactory, AgentOutput, AgentResult, AgentRole,
    RoutingRequest, Task,
};
use agent_graph_core::domain::events::{EventFilter, EventType, EXECUTION_COMPLETED};
use agent_graph_core::domain::execution::{Context, ExecutionStatus};
use agent_graph_core::domain::graph::GraphError;
use agent_graph_core::infrastructure::llm::StaticModelInvoker;
use agent_graph_core::infrastructure::manifest_parser::ManifestParser;
use agent_graph_swarm::{create_standard_multi_agent_system, MultiAgentSystem, SystemError};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

// ============================================================================
// A deterministic web team
// ============================================================================

/// Behaves like its role would in the profile-page scenario
struct TeamMember {
    config: AgentConfig,
}

impl TeamMember {
    fn reply(&self, task: &Task, context: &Context) -> AgentOutput {
        match self.config.role {
            AgentRole::Orchestrator if context.contains_key("review") => {
                AgentOutput::done(AgentResult::success().with_output("summary", json!("shipped")))
            }
            AgentRole::Orchestrator => AgentOutput::new(AgentResult::success())
                .route(RoutingRequest::new("frontend", Task::new(task.description.clone()))),
            AgentRole::Frontend => {
                AgentOutput::new(AgentResult::success().with_output("ui_plan", json!("profile card")))
                    .route(RoutingRequest::new("app_builder", Task::new("design the profile API")))
                    .route(RoutingRequest::new("codegen", Task::new("scaffold the page")))
            }
            AgentRole::AppBuilder => AgentOutput::new(
                AgentResult::success().with_output("api_design", json!("GET /users/:id")),
            )
            .route(RoutingRequest::new(
                "codegen",
                Task::new("implement the API").with_input("api_design", json!("GET /users/:id")),
            )),
            AgentRole::Codegen if task.input_data.contains_key("api_design") => {
                AgentOutput::new(AgentResult::success().with_output("code", json!("fn get_user() {}")))
                    .route(RoutingRequest::new("engineering", Task::new("review the code")))
            }
            AgentRole::Codegen => AgentOutput::done(
                AgentResult::success().with_output("scaffold", json!("<ProfilePage/>")),
            ),
            AgentRole::Engineering => {
                AgentOutput::new(AgentResult::success().with_output("review", json!("approved")))
                    .route(RoutingRequest::new("orchestrator", Task::new("wrap up")))
            }
            AgentRole::Custom(_) => AgentOutput::done(AgentResult::success()),
        }
    }
}

#[async_trait]
impl Agent for TeamMember {
    fn config(&self) -> &AgentConfig {
        &self.config
    }

    async fn process_task(
        &self,
        task: Task,
        context: &Context,
        _cancel: &CancellationToken,
    ) -> Result<AgentOutput, AgentError> {
        Ok(self.reply(&task, context))
    }
}

struct TeamFactory;

impl AgentFactory for TeamFactory {
    fn create(&self, config: &AgentConfig) -> Arc<dyn Agent> {
        Arc::new(TeamMember {
            config: config.clone(),
        })
    }
}

#[tokio::test]
async fn test_standard_team_builds_profile_page() {
    let system = create_standard_multi_agent_system("web-team", Arc::new(TeamFactory)).unwrap();
    let mut events = system.events().subscribe_receiver(EventFilter::All).unwrap();

    let result = system
        .execute_task("orchestrator", Task::new("Create a user profile page with API integration"))
        .await
        .unwrap();
    let state = &result.state;

    assert!(result.succeeded());
    assert_eq!(state.status, ExecutionStatus::Completed);
    assert!(state.errors.is_empty());

    let sequence = state.node_sequence();
    assert_eq!(sequence[..2], ["orchestrator", "frontend"]);
    // The two codegen branches run concurrently; only causal order is fixed
    let engineering = sequence.iter().position(|id| *id == "engineering").unwrap();
    let last_orchestrator = sequence.iter().rposition(|id| *id == "orchestrator").unwrap();
    assert!(engineering < last_orchestrator);
    assert_eq!(state.visits("orchestrator"), 2);
    assert_eq!(state.visits("frontend"), 1);
    assert_eq!(state.visits("app_builder"), 1);
    assert_eq!(state.visits("codegen"), 2);
    assert_eq!(state.visits("engineering"), 1);

    for key in ["ui_plan", "api_design", "scaffold", "code", "review", "summary"] {
        assert!(state.context.contains_key(key), "missing {key}");
    }

    let mut completed = 0;
    let mut actions = 0;
    while let Ok(event) = events.try_recv() {
        match &event.event_type {
            EventType::AgentAction => actions += 1,
            other if other.is_terminal() => {
                assert_eq!(other, &EventType::custom(EXECUTION_COMPLETED));
                completed += 1;
            }
            _ => {}
        }
    }
    assert_eq!(completed, 1);
    assert_eq!(actions, 7);
}

// ============================================================================
// Composition while running
// ============================================================================

struct BlockingAgent {
    config: AgentConfig,
    started: Arc<Notify>,
}

#[async_trait]
impl Agent for BlockingAgent {
    fn config(&self) -> &AgentConfig {
        &self.config
    }

    async fn process_task(
        &self,
        _task: Task,
        _context: &Context,
        cancel: &CancellationToken,
    ) -> Result<AgentOutput, AgentError> {
        self.started.notify_one();
        cancel.cancelled().await;
        Err(AgentError::Cancelled)
    }
}

#[tokio::test]
async fn test_composition_rejected_during_execution() {
    let system = Arc::new(
        MultiAgentSystem::builder("busy", Arc::new(TeamFactory))
            .build()
            .unwrap(),
    );
    let started = Arc::new(Notify::new());
    system
        .add_agent_with(Arc::new(BlockingAgent {
            config: AgentConfig::new("orchestrator", "Orchestrator", AgentRole::Orchestrator),
            started: Arc::clone(&started),
        }))
        .unwrap();

    let cancel = CancellationToken::new();
    let running = {
        let system = Arc::clone(&system);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            system
                .execute_task_with_cancel("orchestrator", Task::new("wait"), cancel)
                .await
        })
    };
    started.notified().await;

    let err = system
        .add_agent(AgentConfig::new("codegen", "Codegen", AgentRole::Codegen))
        .err().unwrap();
    assert!(matches!(err, SystemError::Graph(GraphError::GraphLocked { .. })));
    assert!(system.get_agent_by_role(&AgentRole::Codegen).is_err());

    cancel.cancel();
    let result = tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(result.state.status, ExecutionStatus::Cancelled);
    assert!(!result.succeeded());

    system
        .add_agent(AgentConfig::new("codegen", "Codegen", AgentRole::Codegen))
        .unwrap();
    system.connect_agents("orchestrator", "codegen", None).unwrap();
    assert_eq!(system.graph().edges().len(), 1);
}

// ============================================================================
// Manifest-built systems
// ============================================================================

const MANIFEST: &str = r#"
apiVersion: agent-graph/v1
kind: AgentGraph
metadata:
  name: dry-run-team
spec:
  entry: intake
  executor:
    max_steps: 10
  context:
    audience: internal
  agents:
    - id: orchestrator
      role: orchestrator
  nodes:
    - id: intake
      kind: Task
      config:
        set: { received: true }
  edges:
    - from: intake
      to: orchestrator
"#;

#[tokio::test]
async fn test_system_from_manifest_runs_with_static_model() {
    let manifest = ManifestParser::parse_yaml(MANIFEST).unwrap();
    let factory = Arc::new(ModelAgentFactory::new(Arc::new(StaticModelInvoker::completing())));
    let system = MultiAgentSystem::from_manifest(manifest, factory).unwrap();

    assert_eq!(system.name(), "dry-run-team");
    assert_eq!(system.executor().config().max_steps, 10);
    assert_eq!(system.default_entry().unwrap().as_str(), "intake");

    let result = system
        .execute_task_default(Task::new("Summarise the quarter"))
        .await
        .unwrap();

    assert!(result.succeeded());
    assert_eq!(result.state.node_sequence(), vec!["intake", "orchestrator"]);
    assert_eq!(result.state.context.get("received"), Some(&json!(true)));
    assert_eq!(result.state.context.get("audience"), Some(&json!("internal")));
    assert!(result.state.context.contains_key("summary"));
}
