// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Loopback Language Bridge
//
// In-process LanguageBridge: state goes to a StateStore, events to the
// EventStream, and remote tasks to handlers registered per
// (agent id, task type). Stands in for an RPC transport in tests and
// single-process deployments.

use crate::domain::bridge::{BridgeError, LanguageBridge};
use crate::domain::events::{Event, EventHandler, EventType, SubscriptionId};
use crate::domain::execution::Context;
use crate::domain::graph::Node;
use crate::domain::handler::{NodeHandler, NodeHandlerError};
use crate::domain::state::StateStore;
use crate::infrastructure::event_stream::EventStream;
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Task implementation reachable through the bridge
#[async_trait]
pub trait RemoteTaskHandler: Send + Sync {
    async fn run(&self, input: HashMap<String, Value>) -> Result<HashMap<String, Value>, BridgeError>;
}

pub struct LoopbackBridge {
    state: Arc<dyn StateStore>,
    events: EventStream,
    tasks: DashMap<(String, String), Arc<dyn RemoteTaskHandler>>,
}

impl LoopbackBridge {
    pub fn new(state: Arc<dyn StateStore>, events: EventStream) -> Self {
        Self {
            state,
            events,
            tasks: DashMap::new(),
        }
    }

    /// Replaces any handler already registered for the pair
    pub fn register_task(
        &self,
        agent_id: impl Into<String>,
        task_type: impl Into<String>,
        handler: Arc<dyn RemoteTaskHandler>,
    ) {
        self.tasks.insert((agent_id.into(), task_type.into()), handler);
    }
}

#[async_trait]
impl LanguageBridge for LoopbackBridge {
    async fn execute_remote_task(
        &self,
        agent_id: &str,
        task_type: &str,
        input: HashMap<String, Value>,
    ) -> Result<HashMap<String, Value>, BridgeError> {
        let handler = self
            .tasks
            .get(&(agent_id.to_string(), task_type.to_string()))
            .map(|entry| entry.value().clone())
            .ok_or_else(|| BridgeError::UnknownTask {
                agent_id: agent_id.to_string(),
                task_type: task_type.to_string(),
            })?;

        debug!(agent_id, task_type, "Executing remote task over loopback bridge");
        handler.run(input).await
    }

    async fn get_state(&self, key: &str) -> Result<Option<Value>, BridgeError> {
        self.state
            .get(key)
            .await
            .map_err(|e| BridgeError::State(e.to_string()))
    }

    async fn set_state(&self, key: &str, value: Value) -> Result<(), BridgeError> {
        self.state
            .set(key, value)
            .await
            .map_err(|e| BridgeError::State(e.to_string()))
    }

    async fn publish_event(&self, event: Event) -> Result<(), BridgeError> {
        self.events
            .publish(event)
            .map_err(|e| BridgeError::Event(e.to_string()))
    }

    async fn subscribe_event(
        &self,
        event_type: Option<EventType>,
        callback: EventHandler,
    ) -> Result<SubscriptionId, BridgeError> {
        self.events
            .subscribe(event_type, callback)
            .map_err(|e| BridgeError::Event(e.to_string()))
    }
}

// ============================================================================
// Service nodes over the bridge
// ============================================================================

/// Runs a Service node as a remote task.
///
/// The remote agent is `config.remote_agent` (default: the node id) and the
/// task type is `config.task_type` (default: the node name). The whole
/// context is sent as input and the returned map is merged back.
pub struct BridgeServiceHandler {
    bridge: Arc<dyn LanguageBridge>,
}

impl BridgeServiceHandler {
    pub fn new(bridge: Arc<dyn LanguageBridge>) -> Self {
        Self { bridge }
    }
}

#[async_trait]
impl NodeHandler for BridgeServiceHandler {
    async fn handle(
        &self,
        node: &Node,
        mut context: Context,
        cancel: &CancellationToken,
    ) -> Result<Context, NodeHandlerError> {
        let agent_id = node
            .config
            .get("remote_agent")
            .and_then(Value::as_str)
            .unwrap_or(node.id.as_str());
        let task_type = node
            .config
            .get("task_type")
            .and_then(Value::as_str)
            .unwrap_or(node.name.as_str());

        let call = self
            .bridge
            .execute_remote_task(agent_id, task_type, context.data().clone());
        let output = tokio::select! {
            result = call => result.map_err(|e| NodeHandlerError::Failed(e.to_string()))?,
            _ = cancel.cancelled() => return Err(NodeHandlerError::Cancelled),
        };

        context.extend(output);
        Ok(context)
    }
}
