// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Built-in node handlers and the registry the executor resolves them from.
//
// Resolution order: a handler registered for the node id, then the default
// for the node's kind. Agent nodes never resolve to a handler.

use crate::domain::execution::Context;
use crate::domain::graph::{Node, NodeId, NodeKind};
use crate::domain::handler::{NodeHandler, NodeHandlerError};
use crate::domain::state::StateStore;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Merges the object under `config.set` (Task/Service) or `config.data`
/// (Data) into the context. Nodes without that key pass the context through
/// untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThroughHandler;

impl PassThroughHandler {
    fn payload_key(node: &Node) -> &'static str {
        match node.kind {
            NodeKind::Data => "data",
            _ => "set",
        }
    }
}

#[async_trait]
impl NodeHandler for PassThroughHandler {
    async fn handle(
        &self,
        node: &Node,
        mut context: Context,
        _cancel: &CancellationToken,
    ) -> Result<Context, NodeHandlerError> {
        let key = Self::payload_key(node);
        match node.config.get(key) {
            None | Some(Value::Null) => {}
            Some(Value::Object(values)) => {
                context.extend(values.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            Some(other) => {
                return Err(NodeHandlerError::InvalidConfig(format!(
                    "'{}' on node '{}' must be an object, got {}",
                    key, node.id, other
                )))
            }
        }
        Ok(context)
    }
}

/// Data node bridged to the shared state store.
///
/// `config.load` lists store keys copied into the context, `config.store`
/// lists context keys written to the store. `config.data` is merged first,
/// as with [`PassThroughHandler`].
pub struct StateSyncHandler {
    store: Arc<dyn StateStore>,
}

impl StateSyncHandler {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    fn key_list(node: &Node, field: &str) -> Result<Vec<String>, NodeHandlerError> {
        match node.config.get(field) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str().map(str::to_string).ok_or_else(|| {
                        NodeHandlerError::InvalidConfig(format!(
                            "'{}' on node '{}' must list string keys",
                            field, node.id
                        ))
                    })
                })
                .collect(),
            Some(_) => Err(NodeHandlerError::InvalidConfig(format!(
                "'{}' on node '{}' must be a list",
                field, node.id
            ))),
        }
    }
}

#[async_trait]
impl NodeHandler for StateSyncHandler {
    async fn handle(
        &self,
        node: &Node,
        context: Context,
        cancel: &CancellationToken,
    ) -> Result<Context, NodeHandlerError> {
        let mut context = PassThroughHandler.handle(node, context, cancel).await?;

        for key in Self::key_list(node, "load")? {
            let value = self
                .store
                .get(&key)
                .await
                .map_err(|e| NodeHandlerError::Failed(e.to_string()))?;
            if let Some(value) = value {
                context.set(key, value);
            }
        }

        for key in Self::key_list(node, "store")? {
            if let Some(value) = context.get(&key) {
                self.store
                    .set(&key, value.clone())
                    .await
                    .map_err(|e| NodeHandlerError::Failed(e.to_string()))?;
            }
        }

        debug!(node_id = %node.id, "Synchronised data node with state store");
        Ok(context)
    }
}

// ============================================================================
// Registry
// ============================================================================

#[derive(Clone)]
pub struct HandlerRegistry {
    by_node: HashMap<NodeId, Arc<dyn NodeHandler>>,
    task: Arc<dyn NodeHandler>,
    data: Arc<dyn NodeHandler>,
    service: Arc<dyn NodeHandler>,
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        let pass_through: Arc<dyn NodeHandler> = Arc::new(PassThroughHandler);
        Self {
            by_node: HashMap::new(),
            task: pass_through.clone(),
            data: pass_through.clone(),
            service: pass_through,
        }
    }
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_node_handler(mut self, id: impl Into<NodeId>, handler: Arc<dyn NodeHandler>) -> Self {
        self.by_node.insert(id.into(), handler);
        self
    }

    pub fn with_task_handler(mut self, handler: Arc<dyn NodeHandler>) -> Self {
        self.task = handler;
        self
    }

    pub fn with_data_handler(mut self, handler: Arc<dyn NodeHandler>) -> Self {
        self.data = handler;
        self
    }

    pub fn with_service_handler(mut self, handler: Arc<dyn NodeHandler>) -> Self {
        self.service = handler;
        self
    }

    /// `None` for agent nodes
    pub fn resolve(&self, node: &Node) -> Option<Arc<dyn NodeHandler>> {
        if let Some(handler) = self.by_node.get(&node.id) {
            return Some(handler.clone());
        }
        match node.kind {
            NodeKind::Agent { .. } => None,
            NodeKind::Task => Some(self.task.clone()),
            NodeKind::Data => Some(self.data.clone()),
            NodeKind::Service => Some(self.service.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::{AgentConfig, AgentRole};
    use crate::infrastructure::state_store::InMemoryStateStore;
    use serde_json::json;

    #[tokio::test]
    async fn test_pass_through_merges_set() {
        let node = Node::task("render", "Render").with_config("set", json!({"rendered": true}));
        let mut context = Context::new();
        context.set("page", json!("profile"));

        let out = PassThroughHandler
            .handle(&node, context, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out.get("rendered"), Some(&json!(true)));
        assert_eq!(out.get_str("page"), Some("profile"));
    }

    #[tokio::test]
    async fn test_pass_through_rejects_non_object() {
        let node = Node::data("seed", "Seed").with_config("data", json!([1, 2]));
        let err = PassThroughHandler
            .handle(&node, Context::new(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, NodeHandlerError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn test_state_sync_load_and_store() {
        let store = Arc::new(InMemoryStateStore::new());
        store.set("design_tokens", json!({"primary": "#333"})).await.unwrap();

        let node = Node::data("sync", "Sync")
            .with_config("load", json!(["design_tokens", "missing"]))
            .with_config("store", json!(["api_spec"]));
        let mut context = Context::new();
        context.set("api_spec", json!("openapi: 3.1"));

        let out = StateSyncHandler::new(store.clone())
            .handle(&node, context, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(out.get("design_tokens"), Some(&json!({"primary": "#333"})));
        assert!(!out.contains_key("missing"));
        assert_eq!(store.get("api_spec").await.unwrap(), Some(json!("openapi: 3.1")));
    }

    #[test]
    fn test_registry_resolution() {
        let custom: Arc<dyn NodeHandler> = Arc::new(PassThroughHandler);
        let registry = HandlerRegistry::new().with_node_handler("special", custom.clone());

        let special = Node::task("special", "Special");
        let resolved = registry.resolve(&special).unwrap();
        assert!(Arc::ptr_eq(&resolved, &custom));

        let agent = Node::agent(AgentConfig::new("codegen", "Codegen", AgentRole::Codegen));
        assert!(registry.resolve(&agent).is_none());
        assert!(registry.resolve(&Node::service("svc", "Service")).is_some());
    }
}
