// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Model-backed agents
//!
//! [`ModelAgent`] prompts a [`ModelInvoker`] with its role, the task, and the
//! branch context, then reads the reply through [`agent_reply`]. Transient
//! model failures surface as [`AgentError::Processing`] so the executor can
//! retry them.
//!
//! [`agent_reply`]: crate::application::agent_reply

use crate::application::agent_reply;
use crate::domain::agent::{
    Agent, AgentConfig, AgentError, AgentFactory, AgentOutput, AgentRole, Task,
};
use crate::domain::execution::Context;
use crate::domain::llm::{GenerationOptions, ModelInvoker, ModelRequest};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct ModelAgent {
    config: AgentConfig,
    invoker: Arc<dyn ModelInvoker>,
    options: GenerationOptions,
}

impl ModelAgent {
    pub fn new(config: AgentConfig, invoker: Arc<dyn ModelInvoker>) -> Self {
        Self {
            config,
            invoker,
            options: GenerationOptions::default(),
        }
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    fn system_prompt(&self) -> String {
        let focus = match &self.config.role {
            AgentRole::Orchestrator => {
                "You coordinate the team: break the task down and route work to specialists."
            }
            AgentRole::Frontend => "You design user interfaces and client-side components.",
            AgentRole::AppBuilder => "You design application structure and API contracts.",
            AgentRole::Codegen => "You write production code from designs and specifications.",
            AgentRole::Engineering => "You review, test, and harden generated code.",
            AgentRole::Custom(_) => "You are a specialist agent.",
        };

        let mut prompt = format!(
            "You are the {} agent '{}'. {}\n",
            self.config.role, self.config.name, focus
        );
        if !self.config.capabilities.is_empty() {
            let tools: Vec<&str> = self.config.capabilities.iter().map(String::as_str).collect();
            prompt.push_str(&format!("Capabilities: {}.\n", tools.join(", ")));
        }
        prompt.push_str(
            "Reply with a single JSON object: \
             {\"output\": {..}, \"routes\": [{\"target\": \"<agent id>\", \"description\": \"..\", \"input\": {..}}], \
             \"explanation\": \"..\", \"complete\": true|false}.",
        );
        prompt
    }

    fn user_prompt(task: &Task, context: &Context) -> String {
        let context_json =
            serde_json::to_string_pretty(context.data()).unwrap_or_else(|_| "{}".to_string());
        let mut prompt = format!("Task: {}\n\nContext:\n{}\n", task.description, context_json);
        if !task.input_data.is_empty() {
            let input_json =
                serde_json::to_string_pretty(&task.input_data).unwrap_or_else(|_| "{}".to_string());
            prompt.push_str(&format!("\nTask input:\n{}\n", input_json));
        }
        prompt
    }
}

#[async_trait]
impl Agent for ModelAgent {
    fn config(&self) -> &AgentConfig {
        &self.config
    }

    async fn process_task(
        &self,
        task: Task,
        context: &Context,
        cancel: &CancellationToken,
    ) -> Result<AgentOutput, AgentError> {
        let request = ModelRequest {
            model: self.config.model.clone(),
            system: Some(self.system_prompt()),
            prompt: Self::user_prompt(&task, context),
            options: self.options.clone(),
        };

        let response = tokio::select! {
            response = self.invoker.invoke(&request) => response,
            _ = cancel.cancelled() => return Err(AgentError::Cancelled),
        };

        let response = response.map_err(|e| {
            if e.is_transient() {
                AgentError::Processing(e.to_string())
            } else {
                AgentError::Fatal(e.to_string())
            }
        })?;

        debug!(
            agent_id = %self.config.id,
            provider = %response.provider,
            model = %response.model,
            tokens = response.usage.total_tokens,
            "Model replied"
        );

        Ok(agent_reply::parse_reply(
            &response.text,
            &self.config.role,
            &task.description,
        ))
    }
}

/// Builds a [`ModelAgent`] per config, all sharing one invoker
pub struct ModelAgentFactory {
    invoker: Arc<dyn ModelInvoker>,
    options: GenerationOptions,
}

impl ModelAgentFactory {
    pub fn new(invoker: Arc<dyn ModelInvoker>) -> Self {
        Self {
            invoker,
            options: GenerationOptions::default(),
        }
    }

    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }
}

impl AgentFactory for ModelAgentFactory {
    fn create(&self, config: &AgentConfig) -> Arc<dyn Agent> {
        Arc::new(
            ModelAgent::new(config.clone(), self.invoker.clone()).with_options(self.options.clone()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::llm::{ModelError, ModelResponse};
    use crate::infrastructure::llm::StaticModelInvoker;
    use serde_json::json;
    use std::time::Duration;

    fn frontend() -> AgentConfig {
        AgentConfig::new("frontend", "Frontend", AgentRole::Frontend).with_capability("react")
    }

    #[tokio::test]
    async fn test_routes_from_model_reply() {
        let invoker = Arc::new(StaticModelInvoker::scripted([
            r#"{"output": {"ui": "profile card"}, "routes": [{"target": "codegen"}]}"#,
        ]));
        let agent = ModelAgent::new(frontend(), invoker.clone());

        let mut context = Context::new();
        context.set("description", json!("Create a user profile page"));
        let out = agent
            .process_task(
                Task::new("Create a user profile page"),
                &context,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(out.routes.len(), 1);
        assert_eq!(out.routes[0].target.as_str(), "codegen");
        assert!(!out.result.complete);

        let request = &invoker.requests()[0];
        let system = request.system.as_deref().unwrap();
        assert!(system.contains("frontend agent"));
        assert!(system.contains("react"));
        assert!(request.prompt.contains("Create a user profile page"));
    }

    struct FailingInvoker(ModelError);

    #[async_trait]
    impl ModelInvoker for FailingInvoker {
        async fn invoke(&self, _request: &ModelRequest) -> Result<ModelResponse, ModelError> {
            Err(self.0.clone())
        }

        fn provider(&self) -> &str {
            "failing"
        }
    }

    #[tokio::test]
    async fn test_model_errors_map_to_agent_errors() {
        let transient = ModelAgent::new(frontend(), Arc::new(FailingInvoker(ModelError::RateLimit)));
        let err = transient
            .process_task(Task::new("t"), &Context::new(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.is_retryable());

        let fatal = ModelAgent::new(
            frontend(),
            Arc::new(FailingInvoker(ModelError::Authentication("bad key".into()))),
        );
        let err = fatal
            .process_task(Task::new("t"), &Context::new(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Fatal(_)));
    }

    struct HangingInvoker;

    #[async_trait]
    impl ModelInvoker for HangingInvoker {
        async fn invoke(&self, _request: &ModelRequest) -> Result<ModelResponse, ModelError> {
            std::future::pending().await
        }

        fn provider(&self) -> &str {
            "hanging"
        }
    }

    #[tokio::test]
    async fn test_cancellation_aborts_model_call() {
        let agent = ModelAgent::new(frontend(), Arc::new(HangingInvoker));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let result = tokio::time::timeout(
            Duration::from_secs(2),
            agent.process_task(Task::new("t"), &Context::new(), &cancel),
        )
        .await
        .expect("agent must return promptly on cancellation");
        assert_eq!(result.unwrap_err(), AgentError::Cancelled);
    }

    #[test]
    fn test_factory_builds_model_agents() {
        let factory = ModelAgentFactory::new(Arc::new(StaticModelInvoker::completing()));
        let agent = factory.create(&frontend());
        assert_eq!(agent.config().id.as_str(), "frontend");
    }
}
