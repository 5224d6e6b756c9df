// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// OpenAI-compatible Model Invoker
//
// Anti-Corruption Layer for the `/chat/completions` API. Works with OpenAI
// and compatible servers (LM Studio, vLLM, Ollama's OpenAI endpoint).

use crate::domain::llm::{
    FinishReason, ModelError, ModelInvoker, ModelRequest, ModelResponse, TokenUsage,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub struct OpenAiCompatibleInvoker {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    default_model: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
}

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

impl OpenAiCompatibleInvoker {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key,
            default_model: default_model.into(),
        }
    }

    fn messages(request: &ModelRequest) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: request.prompt.clone(),
        });
        messages
    }
}

#[async_trait]
impl ModelInvoker for OpenAiCompatibleInvoker {
    async fn invoke(&self, request: &ModelRequest) -> Result<ModelResponse, ModelError> {
        let model = request.model.as_deref().unwrap_or(&self.default_model);
        let body = ChatRequest {
            model,
            messages: Self::messages(request),
            max_tokens: request.options.max_tokens,
            temperature: request.options.temperature,
            stop: request.options.stop_sequences.clone(),
        };

        let url = format!("{}/chat/completions", self.endpoint.trim_end_matches('/'));
        debug!(url = %url, model, "Invoking chat completion");

        let mut http = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            http = http.bearer_auth(key);
        }

        let response = http
            .send()
            .await
            .map_err(|e| ModelError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();

            return Err(match status.as_u16() {
                401 | 403 => ModelError::Authentication(error_text),
                429 => ModelError::RateLimit,
                404 => ModelError::ModelNotFound(model.to_string()),
                _ => ModelError::Provider(format!("HTTP {}: {}", status, error_text)),
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ModelError::Provider(format!("Failed to parse response: {}", e)))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::Provider("No response from model".into()))?;

        let usage = parsed
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_default();

        Ok(ModelResponse {
            text: choice.message.content,
            usage,
            provider: self.provider().to_string(),
            model: parsed.model.unwrap_or_else(|| model.to_string()),
            finish_reason: match choice.finish_reason.as_deref() {
                Some("length") => FinishReason::Length,
                Some("content_filter") => FinishReason::ContentFilter,
                _ => FinishReason::Stop,
            },
        })
    }

    fn provider(&self) -> &str {
        "openai-compatible"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    #[tokio::test]
    async fn test_invoke_parses_completion() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .match_body(Matcher::PartialJson(json!({
                "model": "gpt-4o-mini",
                "messages": [
                    {"role": "system", "content": "You are the codegen agent."},
                    {"role": "user", "content": "Write the client"}
                ]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "model": "gpt-4o-mini",
                    "choices": [{
                        "message": {"role": "assistant", "content": "{\"complete\": true}"},
                        "finish_reason": "stop"
                    }],
                    "usage": {"prompt_tokens": 12, "completion_tokens": 4, "total_tokens": 16}
                })
                .to_string(),
            )
            .create_async()
            .await;

        let invoker = OpenAiCompatibleInvoker::new(
            format!("{}/v1", server.url()),
            Some("sk-test".to_string()),
            "gpt-4o-mini",
        );
        let request =
            ModelRequest::new("Write the client").with_system("You are the codegen agent.");
        let response = invoker.invoke(&request).await.unwrap();

        mock.assert_async().await;
        assert_eq!(response.text, "{\"complete\": true}");
        assert_eq!(response.usage.total_tokens, 16);
        assert_eq!(response.finish_reason, FinishReason::Stop);
        assert_eq!(response.provider, "openai-compatible");
    }

    #[tokio::test]
    async fn test_invoke_maps_http_errors() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .create_async()
            .await;

        let invoker = OpenAiCompatibleInvoker::new(server.url(), None, "local-model");
        let err = invoker
            .invoke(&ModelRequest::new("hello"))
            .await
            .unwrap_err();
        assert!(matches!(err, ModelError::RateLimit));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_invoke_rejects_empty_choices() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices": []}"#)
            .create_async()
            .await;

        let invoker = OpenAiCompatibleInvoker::new(server.url(), None, "local-model");
        let err = invoker
            .invoke(&ModelRequest::new("hello"))
            .await
            .unwrap_err();
        assert!(matches!(err, ModelError::Provider(_)));
    }
}
