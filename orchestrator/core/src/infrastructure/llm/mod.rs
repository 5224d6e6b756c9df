// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Model Invoker Infrastructure - Anti-Corruption Layer Implementations

pub mod openai;
pub mod static_model;

pub use openai::OpenAiCompatibleInvoker;
pub use static_model::StaticModelInvoker;
