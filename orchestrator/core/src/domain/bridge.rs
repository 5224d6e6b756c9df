// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Language Bridge Boundary
//!
//! Request/response interface to an external agent runtime (for example a
//! Python-hosted agent). Transport and serialization are the implementor's
//! choice; the engine only needs the five calls below.

use crate::domain::events::{Event, EventHandler, EventType, SubscriptionId};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

#[async_trait]
pub trait LanguageBridge: Send + Sync {
    /// Run `task_type` on the remote agent `agent_id` and return its output map
    async fn execute_remote_task(
        &self,
        agent_id: &str,
        task_type: &str,
        input: HashMap<String, Value>,
    ) -> Result<HashMap<String, Value>, BridgeError>;

    async fn get_state(&self, key: &str) -> Result<Option<Value>, BridgeError>;

    async fn set_state(&self, key: &str, value: Value) -> Result<(), BridgeError>;

    async fn publish_event(&self, event: Event) -> Result<(), BridgeError>;

    /// `None` subscribes to every event type
    async fn subscribe_event(
        &self,
        event_type: Option<EventType>,
        callback: EventHandler,
    ) -> Result<SubscriptionId, BridgeError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum BridgeError {
    #[error("No remote handler for agent '{agent_id}' task '{task_type}'")]
    UnknownTask { agent_id: String, task_type: String },

    #[error("Remote task failed: {0}")]
    Remote(String),

    #[error("Bridge transport error: {0}")]
    Transport(String),

    #[error("Bridge state error: {0}")]
    State(String),

    #[error("Bridge event error: {0}")]
    Event(String),
}

impl BridgeError {
    /// Failures of the transport are worth retrying; remote logic errors are not
    pub fn is_transient(&self) -> bool {
        matches!(self, BridgeError::Transport(_))
    }
}
