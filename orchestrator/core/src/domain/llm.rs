// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Model Invocation Boundary
//!
//! Domain interface agents use to reach a language model or tool backend.
//! Implementations live in `infrastructure/llm/`; the engine makes no
//! assumption about the provider behind an invoker.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Opaque model call used by agent implementations
#[async_trait]
pub trait ModelInvoker: Send + Sync {
    async fn invoke(&self, request: &ModelRequest) -> Result<ModelResponse, ModelError>;

    /// Provider name used in logs and model responses
    fn provider(&self) -> &str;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRequest {
    /// Model reference; `None` lets the invoker use its own default
    pub model: Option<String>,
    pub system: Option<String>,
    pub prompt: String,
    #[serde(default)]
    pub options: GenerationOptions,
}

impl ModelRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            model: None,
            system: None,
            prompt: prompt.into(),
            options: GenerationOptions::default(),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }
}

/// Options for model generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationOptions {
    pub max_tokens: Option<u32>,

    /// Sampling temperature (0.0 = deterministic)
    pub temperature: Option<f32>,

    pub stop_sequences: Option<Vec<String>>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            max_tokens: Some(4096),
            temperature: Some(0.2),
            stop_sequences: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ModelResponse {
    pub text: String,
    pub usage: TokenUsage,
    pub provider: String,
    pub model: String,
    pub finish_reason: FinishReason,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ModelError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Rate limit exceeded")]
    RateLimit,

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl ModelError {
    /// Transient failures worth another attempt
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ModelError::Network(_) | ModelError::RateLimit | ModelError::Provider(_)
        )
    }
}
