// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Multi-Agent System
//!
//! Owns a graph of agents, the registry that resolves them, and the executor
//! that runs tasks across them.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Compose agents into a routable team and run tasks on it
//! - **Dependencies:** agent-graph-core (Graph, Executor, AgentRegistry, EventStream)
//!
//! Structural changes go through [`SharedGraph`], so adding agents or edges
//! while a task is executing fails with `GraphLocked`.

use crate::domain::{SystemError, SystemId, TaskResult, STANDARD_AGENTS, STANDARD_EDGES};
use agent_graph_core::application::executor::{Executor, ExecutorConfig};
use agent_graph_core::domain::agent::{Agent, AgentConfig, AgentFactory, AgentRole, Task};
use agent_graph_core::domain::execution::Context;
use agent_graph_core::domain::graph::{
    Edge, EdgeCondition, Graph, GraphError, Node, NodeId, NodeKind, SharedGraph,
};
use agent_graph_core::domain::state::StateStore;
use agent_graph_core::domain::tracer::{NoopTracer, Tracer};
use agent_graph_core::infrastructure::agent_registry::{AgentRegistry, AgentRegistryError};
use agent_graph_core::infrastructure::event_stream::{EventStream, EventStreamConfig};
use agent_graph_core::infrastructure::handlers::HandlerRegistry;
use agent_graph_core::infrastructure::manifest_parser::GraphManifest;
use agent_graph_core::infrastructure::state_store::InMemoryStateStore;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub struct MultiAgentSystem {
    id: SystemId,
    name: String,
    created_at: DateTime<Utc>,
    graph: SharedGraph,
    agents: Arc<AgentRegistry>,
    factory: Arc<dyn AgentFactory>,
    executor: Executor,
    events: EventStream,
    state: Arc<dyn StateStore>,
    /// Serialises graph + registry updates so they stay in step
    composition: Mutex<()>,
    default_entry: Option<NodeId>,
    defaults: Context,
}

impl MultiAgentSystem {
    pub fn builder(name: impl Into<String>, factory: Arc<dyn AgentFactory>) -> MultiAgentSystemBuilder {
        MultiAgentSystemBuilder::new(name, factory)
    }

    /// Build a system from a parsed manifest. Every agent node is created
    /// through `factory`; other nodes are taken as declared.
    pub fn from_manifest(
        manifest: GraphManifest,
        factory: Arc<dyn AgentFactory>,
    ) -> Result<Self, SystemError> {
        Self::builder(manifest.name.clone(), factory)
            .manifest(manifest)
            .build()
    }

    pub fn id(&self) -> SystemId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn events(&self) -> &EventStream {
        &self.events
    }

    pub fn state_store(&self) -> Arc<dyn StateStore> {
        Arc::clone(&self.state)
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    /// Read-only view of the current topology
    pub fn graph(&self) -> Arc<Graph> {
        self.graph.snapshot()
    }

    pub fn agent_configs(&self) -> Vec<AgentConfig> {
        self.agents.configs()
    }

    /// Add an agent built by the system's factory
    pub fn add_agent(&self, config: AgentConfig) -> Result<Arc<dyn Agent>, SystemError> {
        let agent = self.factory.create(&config);
        self.add_agent_with(agent)
    }

    /// Add an agent implementation directly; its config supplies id and role
    pub fn add_agent_with(&self, agent: Arc<dyn Agent>) -> Result<Arc<dyn Agent>, SystemError> {
        let node = Node::agent(agent.config().clone());
        self.insert_agent(node, agent)
    }

    /// Add any node. Agent nodes get their implementation from the factory
    /// and keep their fan-out and join settings.
    pub fn add_node(&self, node: Node) -> Result<(), SystemError> {
        if let NodeKind::Agent { agent } = &node.kind {
            let agent = self.factory.create(agent);
            return self.insert_agent(node, agent).map(|_| ());
        }
        let _guard = self.composition.lock();
        self.graph.mutate(|graph| graph.add_node(node))?;
        Ok(())
    }

    fn insert_agent(&self, node: Node, agent: Arc<dyn Agent>) -> Result<Arc<dyn Agent>, SystemError> {
        let _guard = self.composition.lock();
        let config = agent.config().clone();
        if self.agents.contains(&config.id) {
            return Err(SystemError::DuplicateAgent(config.id));
        }

        self.graph
            .mutate(|graph| graph.add_node(node))
            .map_err(|e| match e {
                GraphError::DuplicateNode(id) => SystemError::DuplicateAgent(id),
                other => SystemError::Graph(other),
            })?;
        self.register(Arc::clone(&agent))?;

        info!(system = %self.name, agent_id = %config.id, role = %config.role, "Added agent");
        Ok(agent)
    }

    /// Declare that `from` may hand work to `to`
    pub fn connect_agents(
        &self,
        from: impl Into<NodeId>,
        to: impl Into<NodeId>,
        condition: Option<EdgeCondition>,
    ) -> Result<(), SystemError> {
        let from = from.into();
        let to = to.into();
        let edge = match condition {
            Some(condition) => Edge::when(from.clone(), to.clone(), condition),
            None => Edge::new(from.clone(), to.clone()),
        };

        let _guard = self.composition.lock();
        self.graph
            .mutate(|graph| graph.add_edge(edge))
            .map_err(|e| match e {
                GraphError::DanglingEdge { missing, .. } => SystemError::UnknownAgent(missing),
                other => SystemError::Graph(other),
            })?;
        debug!(system = %self.name, from = %from, to = %to, "Connected agents");
        Ok(())
    }

    /// First registered agent with `role`
    pub fn get_agent_by_role(&self, role: &AgentRole) -> Result<Arc<dyn Agent>, SystemError> {
        self.agents
            .first_by_role(role)
            .ok_or_else(|| SystemError::NotFound { role: role.clone() })
    }

    /// Run `task` starting at `entry`
    pub async fn execute_task(
        &self,
        entry: impl Into<NodeId>,
        task: Task,
    ) -> Result<TaskResult, SystemError> {
        self.execute_task_with_cancel(entry, task, CancellationToken::new())
            .await
    }

    /// Run `task` from the manifest's entry node, or the orchestrator
    pub async fn execute_task_default(&self, task: Task) -> Result<TaskResult, SystemError> {
        let entry = self.default_entry()?;
        self.execute_task(entry, task).await
    }

    pub fn default_entry(&self) -> Result<NodeId, SystemError> {
        match &self.default_entry {
            Some(entry) => Ok(entry.clone()),
            None => Ok(self
                .get_agent_by_role(&AgentRole::Orchestrator)?
                .config()
                .id
                .clone()),
        }
    }

    pub async fn execute_task_with_cancel(
        &self,
        entry: impl Into<NodeId>,
        mut task: Task,
        cancel: CancellationToken,
    ) -> Result<TaskResult, SystemError> {
        let entry = entry.into();
        task.start();
        if task.assigned_to.is_none() {
            task.assigned_to = Some(entry.clone());
        }

        let mut context = self.defaults.clone();
        context.extend(task.input_data.clone());
        context.set("description", json!(task.description));

        info!(system = %self.name, entry = %entry, task_id = %task.id, "Executing task");
        let lease = self.graph.lease();
        let outcome = self
            .executor
            .execute(lease.graph(), &entry, context, cancel)
            .await;
        drop(lease);

        let status = match &outcome {
            Ok(state) => state.status.as_str(),
            Err(_) => "error",
        };
        metrics::counter!("agent_graph_system_tasks_total", "status" => status).increment(1);

        Ok(TaskResult::new(task, outcome?))
    }

    fn register(&self, agent: Arc<dyn Agent>) -> Result<(), SystemError> {
        self.agents
            .register(agent)
            .map_err(|AgentRegistryError::Duplicate(id)| SystemError::DuplicateAgent(id))
    }
}

// ============================================================================
// Builder
// ============================================================================

pub struct MultiAgentSystemBuilder {
    name: String,
    factory: Arc<dyn AgentFactory>,
    executor_config: ExecutorConfig,
    event_config: EventStreamConfig,
    events: Option<EventStream>,
    state: Option<Arc<dyn StateStore>>,
    tracer: Arc<dyn Tracer>,
    handlers: HandlerRegistry,
    defaults: Context,
    graph: Option<Graph>,
    default_entry: Option<NodeId>,
    agent_configs: Vec<AgentConfig>,
}

impl MultiAgentSystemBuilder {
    fn new(name: impl Into<String>, factory: Arc<dyn AgentFactory>) -> Self {
        Self {
            name: name.into(),
            factory,
            executor_config: ExecutorConfig::default(),
            event_config: EventStreamConfig::default(),
            events: None,
            state: None,
            tracer: Arc::new(NoopTracer),
            handlers: HandlerRegistry::default(),
            defaults: Context::new(),
            graph: None,
            default_entry: None,
            agent_configs: Vec::new(),
        }
    }

    pub fn executor_config(mut self, config: ExecutorConfig) -> Self {
        self.executor_config = config;
        self
    }

    pub fn event_config(mut self, config: EventStreamConfig) -> Self {
        self.event_config = config;
        self
    }

    /// Share an existing stream instead of creating one from `event_config`
    pub fn events(mut self, events: EventStream) -> Self {
        self.events = Some(events);
        self
    }

    pub fn state_store(mut self, state: Arc<dyn StateStore>) -> Self {
        self.state = Some(state);
        self
    }

    pub fn tracer(mut self, tracer: Arc<dyn Tracer>) -> Self {
        self.tracer = tracer;
        self
    }

    pub fn handlers(mut self, handlers: HandlerRegistry) -> Self {
        self.handlers = handlers;
        self
    }

    /// Context every task starts from
    pub fn defaults(mut self, defaults: Context) -> Self {
        self.defaults = defaults;
        self
    }

    /// Take graph, entry, agents and settings from a parsed manifest
    pub fn manifest(mut self, manifest: GraphManifest) -> Self {
        self.executor_config = manifest.executor;
        self.event_config = manifest.events;
        self.defaults = manifest.context;
        self.graph = Some(manifest.graph);
        self.default_entry = Some(manifest.entry);
        self.agent_configs = manifest.agents;
        self
    }

    pub fn build(self) -> Result<MultiAgentSystem, SystemError> {
        let events = self
            .events
            .unwrap_or_else(|| EventStream::new(self.event_config));
        let agents = Arc::new(AgentRegistry::new());
        let executor = Executor::new(self.executor_config, Arc::clone(&agents), events.clone())
            .with_tracer(self.tracer)
            .with_handlers(self.handlers);
        let graph = self.graph.unwrap_or_else(|| Graph::new(self.name.clone()));

        let system = MultiAgentSystem {
            id: SystemId::new(),
            name: self.name,
            created_at: Utc::now(),
            graph: SharedGraph::new(graph),
            agents,
            factory: self.factory,
            executor,
            events,
            state: self
                .state
                .unwrap_or_else(|| Arc::new(InMemoryStateStore::new())),
            composition: Mutex::new(()),
            default_entry: self.default_entry,
            defaults: self.defaults,
        };
        for config in &self.agent_configs {
            let agent = system.factory.create(config);
            system.register(agent)?;
        }
        Ok(system)
    }
}

// ============================================================================
// Standard team
// ============================================================================

/// The five-role team: an orchestrator hub connected both ways to frontend,
/// app builder, codegen and engineering, plus the specialist hand-offs in
/// [`STANDARD_EDGES`].
pub fn create_standard_multi_agent_system(
    name: impl Into<String>,
    factory: Arc<dyn AgentFactory>,
) -> Result<MultiAgentSystem, SystemError> {
    let system = MultiAgentSystem::builder(name, factory).build()?;
    populate_standard_team(&system)?;
    Ok(system)
}

/// Add the standard agents and edges to an existing (empty) system
pub fn populate_standard_team(system: &MultiAgentSystem) -> Result<(), SystemError> {
    for (id, name, role) in STANDARD_AGENTS {
        system.add_agent(AgentConfig::new(id, name, role))?;
    }

    let (hub, _, _) = &STANDARD_AGENTS[0];
    for (id, _, _) in STANDARD_AGENTS.iter().skip(1) {
        system.connect_agents(*hub, *id, None)?;
        system.connect_agents(*id, *hub, None)?;
    }
    for (from, to) in STANDARD_EDGES {
        system.connect_agents(from, to, None)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_graph_core::application::model_agent::ModelAgentFactory;
    use agent_graph_core::infrastructure::llm::StaticModelInvoker;

    fn factory() -> Arc<dyn AgentFactory> {
        Arc::new(ModelAgentFactory::new(Arc::new(StaticModelInvoker::completing())))
    }

    #[test]
    fn test_standard_topology() {
        let system = create_standard_multi_agent_system("team", factory()).unwrap();
        let graph = system.graph();

        assert_eq!(graph.len(), 5);
        // 4 hub edges each way plus 5 specialist edges
        assert_eq!(graph.edges().len(), 13);
        assert!(graph.has_edge(&"orchestrator".into(), &"engineering".into()));
        assert!(graph.has_edge(&"engineering".into(), &"orchestrator".into()));
        assert!(graph.has_edge(&"engineering".into(), &"codegen".into()));
        assert!(!graph.has_edge(&"codegen".into(), &"frontend".into()));

        let codegen = system.get_agent_by_role(&AgentRole::Codegen).unwrap();
        assert_eq!(codegen.config().id.as_str(), "codegen");
    }

    #[test]
    fn test_duplicate_agent_rejected() {
        let system = create_standard_multi_agent_system("team", factory()).unwrap();
        let err = system
            .add_agent(AgentConfig::new("codegen", "Another", AgentRole::Codegen))
            .err().unwrap();
        assert!(matches!(err, SystemError::DuplicateAgent(id) if id.as_str() == "codegen"));
        assert_eq!(system.graph().len(), 5);
    }

    #[test]
    fn test_connect_unknown_agent_leaves_graph_unchanged() {
        let system = create_standard_multi_agent_system("team", factory()).unwrap();
        let before = system.graph().edges().len();

        let err = system.connect_agents("codegen", "qa", None).unwrap_err();
        assert!(matches!(err, SystemError::UnknownAgent(id) if id.as_str() == "qa"));
        assert_eq!(system.graph().edges().len(), before);
    }

    #[test]
    fn test_held_graph_view_does_not_block_composition() {
        let system = create_standard_multi_agent_system("team", factory()).unwrap();
        let view = system.graph();

        system
            .add_agent(AgentConfig::new("qa", "QA", AgentRole::Custom("qa".into())))
            .unwrap();
        system.connect_agents("engineering", "qa", None).unwrap();

        assert_eq!(view.len(), 5);
        assert_eq!(system.graph().len(), 6);
    }

    #[test]
    fn test_role_lookup_first_registered_wins() {
        let system = MultiAgentSystem::builder("team", factory()).build().unwrap();
        system
            .add_agent(AgentConfig::new("ui-1", "UI one", AgentRole::Frontend))
            .unwrap();
        system
            .add_agent(AgentConfig::new("ui-2", "UI two", AgentRole::Frontend))
            .unwrap();

        let agent = system.get_agent_by_role(&AgentRole::Frontend).unwrap();
        assert_eq!(agent.config().id.as_str(), "ui-1");
        assert!(matches!(
            system.get_agent_by_role(&AgentRole::Engineering),
            Err(SystemError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_default_entry_is_orchestrator() {
        let system = create_standard_multi_agent_system("team", factory()).unwrap();
        assert_eq!(system.default_entry().unwrap().as_str(), "orchestrator");

        let result = system
            .execute_task_default(Task::new("Create a user profile page with API integration"))
            .await
            .unwrap();
        assert!(result.succeeded());
        assert_eq!(result.state.node_sequence(), vec!["orchestrator"]);
        assert_eq!(result.task.assigned_to.as_ref().map(|id| id.as_str()), Some("orchestrator"));
    }
}
