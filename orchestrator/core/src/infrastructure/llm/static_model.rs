// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Static Model Invoker
//
// Offline invoker for dry runs and tests. Replays scripted replies in order
// and repeats the last one once the script is exhausted; with no script it
// completes every task without routing.

use crate::domain::llm::{
    FinishReason, ModelError, ModelInvoker, ModelRequest, ModelResponse, TokenUsage,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::VecDeque;

pub struct StaticModelInvoker {
    replies: Mutex<VecDeque<String>>,
    last: Mutex<Option<String>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl StaticModelInvoker {
    /// Replies `{"complete": true}` with a short summary to every request
    pub fn completing() -> Self {
        Self::scripted(Vec::<String>::new())
    }

    pub fn scripted(replies: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            last: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Requests seen so far, in call order
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().clone()
    }

    fn next_reply(&self, request: &ModelRequest) -> String {
        if let Some(reply) = self.replies.lock().pop_front() {
            *self.last.lock() = Some(reply.clone());
            return reply;
        }
        if let Some(reply) = self.last.lock().clone() {
            return reply;
        }
        let summary = request.prompt.lines().next().unwrap_or_default();
        json!({
            "output": { "summary": format!("dry run: {}", summary) },
            "explanation": "static model completed the task",
            "complete": true
        })
        .to_string()
    }
}

impl Default for StaticModelInvoker {
    fn default() -> Self {
        Self::completing()
    }
}

#[async_trait]
impl ModelInvoker for StaticModelInvoker {
    async fn invoke(&self, request: &ModelRequest) -> Result<ModelResponse, ModelError> {
        self.requests.lock().push(request.clone());
        let text = self.next_reply(request);
        let prompt_tokens = request.prompt.split_whitespace().count() as u32;
        let completion_tokens = text.split_whitespace().count() as u32;
        Ok(ModelResponse {
            usage: TokenUsage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            },
            text,
            provider: self.provider().to_string(),
            model: request.model.clone().unwrap_or_else(|| "static".to_string()),
            finish_reason: FinishReason::Stop,
        })
    }

    fn provider(&self) -> &str {
        "static"
    }
}
