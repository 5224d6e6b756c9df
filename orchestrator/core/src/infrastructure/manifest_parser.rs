// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Graph manifest parser
//!
//! Translates the YAML manifest into a domain [`Graph`] plus the runtime
//! settings that go with it.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Parse external YAML → Domain objects
//! - **Anti-Corruption:** The YAML schema below never leaks past this module
//!
//! # Manifest Format
//!
//! ```yaml
//! apiVersion: agent-graph/v1
//! kind: AgentGraph
//! metadata:
//!   name: web-team
//! spec:
//!   entry: orchestrator
//!   executor:
//!     max_steps: 50
//!     timeout: 2m
//!   model:
//!     endpoint: https://api.openai.com/v1
//!     model: gpt-4o-mini
//!     api_key_env: OPENAI_API_KEY
//!   agents:
//!     - id: orchestrator
//!       role: orchestrator
//!     - id: codegen
//!       role: codegen
//!       capabilities: [rust]
//!   nodes:
//!     - id: publish
//!       kind: Data
//!       config:
//!         data: { published: true }
//!   edges:
//!     - from: orchestrator
//!       to: codegen
//!     - from: codegen
//!       to: publish
//!       condition:
//!         type: key_exists
//!         key: code
//! ```

use crate::application::executor::ExecutorConfig;
use crate::domain::agent::{AgentConfig, AgentRole};
use crate::domain::execution::Context;
use crate::domain::graph::{Edge, EdgeCondition, Graph, JoinSpec, Node, NodeId};
use crate::infrastructure::event_stream::EventStreamConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::Path;

pub const API_VERSION: &str = "agent-graph/v1";
pub const KIND: &str = "AgentGraph";

// ============================================================================
// YAML Schema (External Representation)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphManifestYaml {
    pub api_version: String,
    pub kind: String,
    pub metadata: MetadataYaml,
    pub spec: GraphSpecYaml,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataYaml {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSpecYaml {
    /// Defaults to the first declared agent or node
    #[serde(default)]
    pub entry: Option<String>,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub events: EventStreamConfig,
    #[serde(default)]
    pub model: Option<ModelSettings>,
    #[serde(default)]
    pub context: HashMap<String, Value>,
    #[serde(default)]
    pub agents: Vec<AgentYaml>,
    #[serde(default)]
    pub nodes: Vec<NodeYaml>,
    #[serde(default)]
    pub edges: Vec<EdgeYaml>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentYaml {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Defaults to the id
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub fan_out: bool,
    #[serde(default)]
    pub join: Option<JoinSpec>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeKindYaml {
    Task,
    Data,
    Service,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeYaml {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub kind: NodeKindYaml,
    #[serde(default)]
    pub config: HashMap<String, Value>,
    #[serde(default)]
    pub fan_out: bool,
    #[serde(default)]
    pub join: Option<JoinSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeYaml {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub condition: Option<EdgeCondition>,
}

/// OpenAI-compatible model endpoint used by model-backed agents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    pub endpoint: String,
    pub model: String,
    /// Name of the environment variable holding the API key
    #[serde(default)]
    pub api_key_env: Option<String>,
}

impl ModelSettings {
    /// Resolve the API key from the environment, if one is configured
    pub fn api_key(&self) -> Option<String> {
        self.api_key_env
            .as_deref()
            .and_then(|name| std::env::var(name).ok())
            .filter(|key| !key.trim().is_empty())
    }
}

// ============================================================================
// Domain-facing result
// ============================================================================

/// A parsed, validated manifest
#[derive(Debug, Clone)]
pub struct GraphManifest {
    pub name: String,
    pub description: Option<String>,
    pub entry: NodeId,
    pub graph: Graph,
    /// Agent configurations in declaration order
    pub agents: Vec<AgentConfig>,
    pub executor: ExecutorConfig,
    pub events: EventStreamConfig,
    pub model: Option<ModelSettings>,
    pub context: Context,
}

// ============================================================================
// Parser
// ============================================================================

pub struct ManifestParser;

impl ManifestParser {
    pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<GraphManifest, ManifestError> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| ManifestError::Io {
            path: path.as_ref().display().to_string(),
            error: e.to_string(),
        })?;

        Self::parse_yaml(&content)
    }

    pub fn parse_yaml(yaml: &str) -> Result<GraphManifest, ManifestError> {
        let manifest: GraphManifestYaml =
            serde_yaml::from_str(yaml).map_err(|e| ManifestError::Yaml(e.to_string()))?;

        Self::validate_and_convert(manifest)
    }

    fn validate_and_convert(manifest: GraphManifestYaml) -> Result<GraphManifest, ManifestError> {
        if manifest.api_version != API_VERSION {
            return Err(ManifestError::InvalidApiVersion {
                expected: API_VERSION.to_string(),
                got: manifest.api_version,
            });
        }
        if manifest.kind != KIND {
            return Err(ManifestError::InvalidKind {
                expected: KIND.to_string(),
                got: manifest.kind,
            });
        }
        if manifest.metadata.name.trim().is_empty() {
            return Err(ManifestError::Validation(
                "metadata.name cannot be empty".to_string(),
            ));
        }

        let spec = manifest.spec;
        if spec.executor.max_steps == 0 {
            return Err(ManifestError::Validation(
                "spec.executor.max_steps must be at least 1".to_string(),
            ));
        }

        let mut graph = Graph::new(manifest.metadata.name.clone());
        let mut agents = Vec::with_capacity(spec.agents.len());

        for agent in spec.agents {
            let config = Self::convert_agent(&agent);
            let mut node = Node::agent(config.clone());
            node.fan_out = agent.fan_out;
            node.join = agent.join;
            graph.add_node(node).map_err(|e| ManifestError::Validation(e.to_string()))?;
            agents.push(config);
        }

        for yaml in spec.nodes {
            let node = Self::convert_node(yaml);
            graph.add_node(node).map_err(|e| ManifestError::Validation(e.to_string()))?;
        }

        for edge in spec.edges {
            let edge = match edge.condition {
                Some(condition) => Edge::when(edge.from.as_str(), edge.to.as_str(), condition),
                None => Edge::new(edge.from.as_str(), edge.to.as_str()),
            };
            graph.add_edge(edge).map_err(|e| ManifestError::Validation(e.to_string()))?;
        }

        let entry = match spec.entry {
            Some(entry) => NodeId::new(entry),
            None => graph
                .nodes()
                .next()
                .map(|n| n.id.clone())
                .ok_or_else(|| ManifestError::Validation("graph declares no nodes".to_string()))?,
        };
        graph
            .validate_entry(&entry)
            .map_err(|e| ManifestError::Validation(e.to_string()))?;

        Ok(GraphManifest {
            name: manifest.metadata.name,
            description: manifest.metadata.description,
            entry,
            graph,
            agents,
            executor: spec.executor,
            events: spec.events,
            model: spec.model,
            context: spec.context.into_iter().collect(),
        })
    }

    fn convert_agent(yaml: &AgentYaml) -> AgentConfig {
        let role = AgentRole::parse(yaml.role.as_deref().unwrap_or(&yaml.id));
        let name = yaml.name.clone().unwrap_or_else(|| yaml.id.clone());
        let mut config = AgentConfig::new(yaml.id.as_str(), name, role);
        config.capabilities = yaml.capabilities.clone();
        config.model = yaml.model.clone();
        config
    }

    fn convert_node(yaml: NodeYaml) -> Node {
        let name = yaml.name.unwrap_or_else(|| yaml.id.clone());
        let mut node = match yaml.kind {
            NodeKindYaml::Task => Node::task(yaml.id.as_str(), name),
            NodeKindYaml::Data => Node::data(yaml.id.as_str(), name),
            NodeKindYaml::Service => Node::service(yaml.id.as_str(), name),
        };
        node.config = yaml.config;
        node.fan_out = yaml.fan_out;
        node.join = yaml.join;
        node
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("IO error reading {path}: {error}")]
    Io { path: String, error: String },

    #[error("YAML parse error: {0}")]
    Yaml(String),

    #[error("Invalid API version: expected '{expected}', got '{got}'")]
    InvalidApiVersion { expected: String, got: String },

    #[error("Invalid kind: expected '{expected}', got '{got}'")]
    InvalidKind { expected: String, got: String },

    #[error("Validation error: {0}")]
    Validation(String),
}
