// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Graph Domain Model
//!
//! Static execution topology: typed nodes (agents, tasks, data, services) and
//! directed, optionally conditional edges between them.
//!
//! # Architectural Context
//!
//! - **Bounded Context:** Execution Context
//! - **Aggregate Root:** Graph
//!
//! # Design Principles
//!
//! 1. **Arena, not pointers:** nodes reference each other by [`NodeId`] only, so
//!    cycles are plain id references and the graph is safe to share across
//!    concurrent executions behind an `Arc`.
//! 2. **Self-Validating:** mutators reject dangling edges and duplicate ids
//!    before touching any state.
//! 3. **Immutable during execution:** [`SharedGraph::mutate`] refuses to
//!    mutate a graph while any execution still holds a [`GraphLease`] on it.

use crate::domain::agent::AgentConfig;
use crate::domain::execution::Context;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

// ============================================================================
// Value Objects: Identifiers
// ============================================================================

/// Unique identifier for a Graph instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GraphId(pub Uuid);

impl GraphId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for GraphId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for GraphId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable, human-readable node identifier (e.g. "orchestrator", "codegen")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

// ============================================================================
// Entities: Nodes
// ============================================================================

/// Variant tag determining how the executor dispatches a node
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "PascalCase")]
pub enum NodeKind {
    /// Agent node: resolved to an `Agent` implementation by id at dispatch time
    Agent { agent: AgentConfig },
    /// Unit of work transforming the context
    Task,
    /// Static data injected into the context
    Data,
    /// External service call (e.g. through the language bridge)
    Service,
}

impl NodeKind {
    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::Agent { .. } => "agent",
            NodeKind::Task => "task",
            NodeKind::Data => "data",
            NodeKind::Service => "service",
        }
    }
}

/// Join capability: the node waits for `required` branches before running once
/// with their merged contexts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinSpec {
    /// Number of arriving branches to wait for.
    /// Defaults to the number of distinct declared predecessors.
    #[serde(default)]
    pub required: Option<usize>,
}

/// A typed vertex in the execution graph
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    #[serde(flatten)]
    pub kind: NodeKind,
    /// Opaque, node-specific configuration
    #[serde(default)]
    pub config: HashMap<String, Value>,
    /// Follow every satisfied outgoing edge concurrently instead of the first match
    #[serde(default)]
    pub fan_out: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join: Option<JoinSpec>,
}

impl Node {
    fn with_kind(id: impl Into<NodeId>, name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            config: HashMap::new(),
            fan_out: false,
            join: None,
        }
    }

    /// Agent node; its id and name come from the agent configuration
    pub fn agent(config: AgentConfig) -> Self {
        let id = config.id.clone();
        let name = config.name.clone();
        Self::with_kind(id, name, NodeKind::Agent { agent: config })
    }

    pub fn task(id: impl Into<NodeId>, name: impl Into<String>) -> Self {
        Self::with_kind(id, name, NodeKind::Task)
    }

    pub fn data(id: impl Into<NodeId>, name: impl Into<String>) -> Self {
        Self::with_kind(id, name, NodeKind::Data)
    }

    pub fn service(id: impl Into<NodeId>, name: impl Into<String>) -> Self {
        Self::with_kind(id, name, NodeKind::Service)
    }

    pub fn with_config(mut self, key: impl Into<String>, value: Value) -> Self {
        self.config.insert(key.into(), value);
        self
    }

    pub fn with_fan_out(mut self) -> Self {
        self.fan_out = true;
        self
    }

    pub fn with_join(mut self, join: JoinSpec) -> Self {
        self.join = Some(join);
        self
    }

    pub fn agent_config(&self) -> Option<&AgentConfig> {
        match &self.kind {
            NodeKind::Agent { agent } => Some(agent),
            _ => None,
        }
    }

    pub fn is_join(&self) -> bool {
        self.join.is_some()
    }
}

// ============================================================================
// Value Objects: Edges and Conditions
// ============================================================================

/// Arbitrary predicate over the branch context
#[derive(Clone)]
pub struct ConditionFn(Arc<dyn Fn(&Context) -> bool + Send + Sync>);

impl ConditionFn {
    pub fn new(predicate: impl Fn(&Context) -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(predicate))
    }
}

impl std::fmt::Debug for ConditionFn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ConditionFn(..)")
    }
}

/// Traversal condition evaluated against the branch context
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EdgeCondition {
    /// Always traverse
    Always,

    /// Key is present in the context
    KeyExists { key: String },

    /// Key equals a specific JSON value
    KeyEquals { key: String, value: Value },

    /// Key is present and truthy (non-null, non-false, non-zero, non-empty)
    KeyTruthy { key: String },

    Not { condition: Box<EdgeCondition> },

    All { conditions: Vec<EdgeCondition> },

    Any { conditions: Vec<EdgeCondition> },

    /// Programmatic predicate (not representable in manifests)
    #[serde(skip)]
    Custom(ConditionFn),
}

impl EdgeCondition {
    pub fn custom(predicate: impl Fn(&Context) -> bool + Send + Sync + 'static) -> Self {
        EdgeCondition::Custom(ConditionFn::new(predicate))
    }

    pub fn evaluate(&self, context: &Context) -> bool {
        match self {
            EdgeCondition::Always => true,
            EdgeCondition::KeyExists { key } => context.contains_key(key),
            EdgeCondition::KeyEquals { key, value } => context.get(key) == Some(value),
            EdgeCondition::KeyTruthy { key } => context.is_truthy(key),
            EdgeCondition::Not { condition } => !condition.evaluate(context),
            EdgeCondition::All { conditions } => conditions.iter().all(|c| c.evaluate(context)),
            EdgeCondition::Any { conditions } => conditions.iter().any(|c| c.evaluate(context)),
            EdgeCondition::Custom(predicate) => (predicate.0)(context),
        }
    }
}

/// Directed connection between two nodes, declared at construction time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<EdgeCondition>,
}

impl Edge {
    pub fn new(from: impl Into<NodeId>, to: impl Into<NodeId>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            condition: None,
        }
    }

    pub fn when(from: impl Into<NodeId>, to: impl Into<NodeId>, condition: EdgeCondition) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            condition: Some(condition),
        }
    }

    /// Unconditioned edges are always satisfied
    pub fn is_satisfied(&self, context: &Context) -> bool {
        self.condition
            .as_ref()
            .map(|c| c.evaluate(context))
            .unwrap_or(true)
    }
}

// ============================================================================
// Aggregate Root: Graph
// ============================================================================

/// Graph Aggregate Root
///
/// # Invariants
/// - Node ids are unique and non-empty
/// - Every edge endpoint references an existing node
/// - Edge declaration order is preserved (it is the traversal tie-break)
/// - Cycles are permitted; termination is the executor's `max_steps` concern
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Graph {
    pub id: GraphId,
    pub name: String,
    nodes: HashMap<NodeId, Node>,
    order: Vec<NodeId>,
    edges: Vec<Edge>,
}

impl Graph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: GraphId::new(),
            name: name.into(),
            nodes: HashMap::new(),
            order: Vec::new(),
            edges: Vec::new(),
        }
    }

    /// Add a node. Fails without mutation on empty or duplicate ids.
    pub fn add_node(&mut self, node: Node) -> Result<(), GraphError> {
        if node.id.as_str().is_empty() {
            return Err(GraphError::InvalidNodeId);
        }
        if self.nodes.contains_key(&node.id) {
            return Err(GraphError::DuplicateNode(node.id));
        }
        self.order.push(node.id.clone());
        self.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    /// Add an edge. Fails without mutation if either endpoint is unknown.
    pub fn add_edge(&mut self, edge: Edge) -> Result<(), GraphError> {
        for endpoint in [&edge.from, &edge.to] {
            if !self.nodes.contains_key(endpoint) {
                return Err(GraphError::DanglingEdge {
                    from: edge.from.clone(),
                    to: edge.to.clone(),
                    missing: endpoint.clone(),
                });
            }
        }
        self.edges.push(edge);
        Ok(())
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Nodes in declaration order
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Outgoing edges of `id` in declaration order
    pub fn outgoing<'a>(&'a self, id: &'a NodeId) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| &e.from == id)
    }

    /// Whether any edge (conditioned or not) is declared from `from` to `to`
    pub fn has_edge(&self, from: &NodeId, to: &NodeId) -> bool {
        self.edges.iter().any(|e| &e.from == from && &e.to == to)
    }

    /// Distinct predecessors of `id`, in edge declaration order
    pub fn predecessors(&self, id: &NodeId) -> Vec<&NodeId> {
        let mut seen = Vec::new();
        for edge in self.edges.iter().filter(|e| &e.to == id) {
            if !seen.contains(&&edge.from) {
                seen.push(&edge.from);
            }
        }
        seen
    }

    /// Number of branch arrivals a join node waits for (at least one)
    pub fn required_arrivals(&self, id: &NodeId) -> usize {
        let declared = self
            .node(id)
            .and_then(|n| n.join.as_ref())
            .and_then(|j| j.required);
        declared.unwrap_or_else(|| self.predecessors(id).len()).max(1)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Re-check structural invariants (used for graphs built outside the mutators,
    /// e.g. deserialized ones)
    pub fn validate(&self) -> Result<(), GraphError> {
        if self.order.len() != self.nodes.len() {
            return Err(GraphError::Corrupted(
                "node order does not match node map".to_string(),
            ));
        }
        for edge in &self.edges {
            for endpoint in [&edge.from, &edge.to] {
                if !self.nodes.contains_key(endpoint) {
                    return Err(GraphError::DanglingEdge {
                        from: edge.from.clone(),
                        to: edge.to.clone(),
                        missing: endpoint.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Pre-execution check: graph is non-empty and the entry node exists
    pub fn validate_entry(&self, entry: &NodeId) -> Result<(), GraphError> {
        if self.nodes.is_empty() {
            return Err(GraphError::NoNodes);
        }
        if !self.nodes.contains_key(entry) {
            return Err(GraphError::EntryNotFound(entry.clone()));
        }
        self.validate()
    }
}

// ============================================================================
// Shared handle enforcing structural immutability during execution
// ============================================================================

/// Mutable home of a graph that hands out read-only snapshots.
///
/// Executions take a [`GraphLease`] for their whole lifetime; while any lease
/// is alive, mutation is rejected with [`GraphError::GraphLocked`]. Plain
/// [`snapshot`](Self::snapshot)s are for inspection and never block mutation.
#[derive(Debug)]
pub struct SharedGraph {
    inner: RwLock<Arc<Graph>>,
    active: Arc<AtomicUsize>,
}

impl SharedGraph {
    pub fn new(graph: Graph) -> Self {
        Self {
            inner: RwLock::new(Arc::new(graph)),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Read-only view of the current graph
    pub fn snapshot(&self) -> Arc<Graph> {
        self.inner.read().clone()
    }

    /// Snapshot held by an execution; the graph stays locked until it drops
    pub fn lease(&self) -> GraphLease {
        let guard = self.inner.read();
        self.active.fetch_add(1, Ordering::AcqRel);
        GraphLease {
            graph: Arc::clone(&guard),
            active: Arc::clone(&self.active),
        }
    }

    /// True while any execution holds a lease
    pub fn is_locked(&self) -> bool {
        self.active.load(Ordering::Acquire) > 0
    }

    /// Apply `change` atomically: on error the graph is left untouched.
    pub fn mutate<T>(
        &self,
        change: impl FnOnce(&mut Graph) -> Result<T, GraphError>,
    ) -> Result<T, GraphError> {
        let mut guard = self.inner.write();
        if self.is_locked() {
            return Err(GraphError::GraphLocked { graph_id: guard.id });
        }

        let mut draft = Graph::clone(&guard);
        let output = change(&mut draft)?;
        *guard = Arc::new(draft);
        Ok(output)
    }
}

/// An execution's hold on a [`SharedGraph`]
#[derive(Debug)]
pub struct GraphLease {
    graph: Arc<Graph>,
    active: Arc<AtomicUsize>,
}

impl GraphLease {
    pub fn graph(&self) -> Arc<Graph> {
        Arc::clone(&self.graph)
    }
}

impl std::ops::Deref for GraphLease {
    type Target = Graph;

    fn deref(&self) -> &Graph {
        &self.graph
    }
}

impl Drop for GraphLease {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::AcqRel);
    }
}

// ============================================================================
// Domain Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphError {
    #[error("Graph must have at least one node")]
    NoNodes,

    #[error("Node id cannot be empty")]
    InvalidNodeId,

    #[error("Node '{0}' already exists")]
    DuplicateNode(NodeId),

    #[error("Entry node '{0}' not found in graph")]
    EntryNotFound(NodeId),

    #[error("Edge '{from}' -> '{to}' references unknown node '{missing}'")]
    DanglingEdge {
        from: NodeId,
        to: NodeId,
        missing: NodeId,
    },

    #[error("Graph {graph_id} is locked by an active execution")]
    GraphLocked { graph_id: GraphId },

    #[error("Graph structure is corrupted: {0}")]
    Corrupted(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn three_node_graph() -> Graph {
        let mut graph = Graph::new("test");
        graph.add_node(Node::task("a", "A")).unwrap();
        graph.add_node(Node::task("b", "B")).unwrap();
        graph.add_node(Node::data("c", "C")).unwrap();
        graph
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let mut graph = three_node_graph();
        let result = graph.add_node(Node::task("a", "again"));
        assert_eq!(result, Err(GraphError::DuplicateNode(NodeId::from("a"))));
        assert_eq!(graph.len(), 3);
    }

    #[test]
    fn test_empty_node_id_rejected() {
        let mut graph = Graph::new("test");
        assert_eq!(graph.add_node(Node::task("", "blank")), Err(GraphError::InvalidNodeId));
    }

    #[test]
    fn test_dangling_edge_leaves_graph_unchanged() {
        let mut graph = three_node_graph();
        graph.add_edge(Edge::new("a", "b")).unwrap();

        let result = graph.add_edge(Edge::new("b", "missing"));
        assert!(matches!(result, Err(GraphError::DanglingEdge { ref missing, .. }) if missing.as_str() == "missing"));
        assert_eq!(graph.edges().len(), 1);

        let result = graph.add_edge(Edge::new("ghost", "a"));
        assert!(result.is_err());
        assert_eq!(graph.edges().len(), 1);
    }

    #[test]
    fn test_cycles_are_legal() {
        let mut graph = three_node_graph();
        graph.add_edge(Edge::new("a", "b")).unwrap();
        graph.add_edge(Edge::new("b", "a")).unwrap();
        assert!(graph.validate().is_ok());
        assert!(graph.has_edge(&"b".into(), &"a".into()));
    }

    #[test]
    fn test_validate_entry() {
        let empty = Graph::new("empty");
        assert_eq!(empty.validate_entry(&"a".into()), Err(GraphError::NoNodes));

        let graph = three_node_graph();
        assert!(graph.validate_entry(&"a".into()).is_ok());
        assert_eq!(
            graph.validate_entry(&"zzz".into()),
            Err(GraphError::EntryNotFound("zzz".into()))
        );
    }

    #[test]
    fn test_outgoing_preserves_declaration_order() {
        let mut graph = three_node_graph();
        graph.add_edge(Edge::new("a", "c")).unwrap();
        graph.add_edge(Edge::new("a", "b")).unwrap();
        let id = NodeId::from("a");
        let targets: Vec<_> = graph.outgoing(&id).map(|e| e.to.as_str().to_string()).collect();
        assert_eq!(targets, vec!["c", "b"]);
    }

    #[test]
    fn test_required_arrivals() {
        let mut graph = three_node_graph();
        graph
            .add_node(Node::task("j", "Join").with_join(JoinSpec::default()))
            .unwrap();
        graph.add_edge(Edge::new("a", "j")).unwrap();
        graph.add_edge(Edge::new("b", "j")).unwrap();
        graph.add_edge(Edge::new("b", "j")).unwrap();
        assert_eq!(graph.required_arrivals(&"j".into()), 2);
        assert_eq!(graph.required_arrivals(&"a".into()), 1);
    }

    #[test]
    fn test_edge_conditions() {
        let mut context = Context::new();
        context.set("ready", json!(true));
        context.set("mode", json!("fast"));

        assert!(EdgeCondition::Always.evaluate(&context));
        assert!(EdgeCondition::KeyExists { key: "ready".into() }.evaluate(&context));
        assert!(EdgeCondition::KeyTruthy { key: "ready".into() }.evaluate(&context));
        assert!(!EdgeCondition::KeyTruthy { key: "missing".into() }.evaluate(&context));
        assert!(EdgeCondition::KeyEquals { key: "mode".into(), value: json!("fast") }.evaluate(&context));
        assert!(EdgeCondition::Not {
            condition: Box::new(EdgeCondition::KeyExists { key: "missing".into() })
        }
        .evaluate(&context));
        assert!(EdgeCondition::All {
            conditions: vec![EdgeCondition::Always, EdgeCondition::KeyExists { key: "mode".into() }]
        }
        .evaluate(&context));
        assert!(EdgeCondition::custom(|ctx| ctx.get("mode").is_some()).evaluate(&context));
    }

    #[test]
    fn test_condition_yaml_shape() {
        let condition: EdgeCondition =
            serde_yaml::from_str("type: key_equals\nkey: status\nvalue: done\n").unwrap();
        assert!(matches!(condition, EdgeCondition::KeyEquals { ref key, .. } if key == "status"));
    }

    #[test]
    fn test_shared_graph_locks_while_lease_alive() {
        let shared = SharedGraph::new(three_node_graph());
        let lease = shared.lease();
        assert!(shared.is_locked());

        let result = shared.mutate(|g| g.add_node(Node::task("d", "D")));
        assert!(matches!(result, Err(GraphError::GraphLocked { .. })));

        drop(lease);
        assert!(!shared.is_locked());
        shared.mutate(|g| g.add_node(Node::task("d", "D"))).unwrap();
        assert_eq!(shared.snapshot().len(), 4);
    }

    #[test]
    fn test_inspection_snapshot_does_not_lock() {
        let shared = SharedGraph::new(three_node_graph());
        let view = shared.snapshot();
        assert!(!shared.is_locked());

        shared.mutate(|g| g.add_node(Node::task("d", "D"))).unwrap();
        assert_eq!(view.len(), 3);
        assert_eq!(shared.snapshot().len(), 4);
    }

    #[test]
    fn test_shared_graph_mutation_is_atomic() {
        let shared = SharedGraph::new(three_node_graph());
        let result = shared.mutate(|g| {
            g.add_node(Node::task("d", "D"))?;
            g.add_edge(Edge::new("d", "nowhere"))
        });
        assert!(result.is_err());
        assert!(!shared.snapshot().contains(&"d".into()));
    }
}
