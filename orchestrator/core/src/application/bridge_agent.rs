// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Agent hosted in an external runtime, reached through the language bridge.
//!
//! The remote side receives `{task, context}` and answers with the same
//! reply object model agents use.

use crate::application::agent_reply;
use crate::domain::agent::{Agent, AgentConfig, AgentError, AgentOutput, Task};
use crate::domain::bridge::LanguageBridge;
use crate::domain::execution::Context;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub const PROCESS_TASK: &str = "process_task";

pub struct BridgeAgent {
    config: AgentConfig,
    bridge: Arc<dyn LanguageBridge>,
    task_type: String,
}

impl BridgeAgent {
    pub fn new(config: AgentConfig, bridge: Arc<dyn LanguageBridge>) -> Self {
        Self {
            config,
            bridge,
            task_type: PROCESS_TASK.to_string(),
        }
    }

    pub fn with_task_type(mut self, task_type: impl Into<String>) -> Self {
        self.task_type = task_type.into();
        self
    }
}

#[async_trait]
impl Agent for BridgeAgent {
    fn config(&self) -> &AgentConfig {
        &self.config
    }

    async fn process_task(
        &self,
        task: Task,
        context: &Context,
        cancel: &CancellationToken,
    ) -> Result<AgentOutput, AgentError> {
        let task_json =
            serde_json::to_value(&task).map_err(|e| AgentError::Fatal(e.to_string()))?;
        let context_json =
            serde_json::to_value(context).map_err(|e| AgentError::Fatal(e.to_string()))?;
        let input = HashMap::from([
            ("task".to_string(), task_json),
            ("context".to_string(), context_json),
        ]);

        let call = self
            .bridge
            .execute_remote_task(self.config.id.as_str(), &self.task_type, input);
        let reply = tokio::select! {
            reply = call => reply,
            _ = cancel.cancelled() => return Err(AgentError::Cancelled),
        };

        let reply = reply.map_err(|e| {
            if e.is_transient() {
                AgentError::Processing(e.to_string())
            } else {
                AgentError::Fatal(e.to_string())
            }
        })?;

        let value = Value::Object(reply.into_iter().collect());
        Ok(agent_reply::parse_value(
            value,
            &self.config.role,
            &task.description,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::AgentRole;
    use crate::domain::bridge::BridgeError;
    use crate::infrastructure::bridge::{LoopbackBridge, RemoteTaskHandler};
    use crate::infrastructure::event_stream::EventStream;
    use crate::infrastructure::state_store::InMemoryStateStore;
    use serde_json::json;

    struct PythonReviewer;

    #[async_trait]
    impl RemoteTaskHandler for PythonReviewer {
        async fn run(
            &self,
            input: HashMap<String, Value>,
        ) -> Result<HashMap<String, Value>, BridgeError> {
            let description = input["task"]["description"].as_str().unwrap_or_default();
            let lines = input["context"]["lines"].as_u64().unwrap_or_default();
            Ok(HashMap::from([
                (
                    "output".to_string(),
                    json!({"review": format!("{description}: {lines} lines ok")}),
                ),
                ("complete".to_string(), json!(true)),
            ]))
        }
    }

    #[tokio::test]
    async fn test_bridge_agent_delegates_to_remote_runtime() {
        let bridge = LoopbackBridge::new(Arc::new(InMemoryStateStore::new()), EventStream::default());
        bridge.register_task("engineering", PROCESS_TASK, Arc::new(PythonReviewer));

        let agent = BridgeAgent::new(
            AgentConfig::new("engineering", "Engineering", AgentRole::Engineering),
            Arc::new(bridge),
        );
        let mut context = Context::new();
        context.set("lines", json!(120));

        let out = agent
            .process_task(Task::new("review"), &context, &CancellationToken::new())
            .await
            .unwrap();
        assert!(out.result.complete);
        assert_eq!(
            out.result.output.get("review"),
            Some(&json!("review: 120 lines ok"))
        );
    }

    #[tokio::test]
    async fn test_unknown_remote_task_is_fatal() {
        let bridge = LoopbackBridge::new(Arc::new(InMemoryStateStore::new()), EventStream::default());
        let agent = BridgeAgent::new(
            AgentConfig::new("qa", "QA", AgentRole::Custom("qa".into())),
            Arc::new(bridge),
        );
        let err = agent
            .process_task(Task::new("t"), &Context::new(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Fatal(_)));
    }
}
