// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Application Layer
//!
//! The graph executor and the agent implementations it drives.

pub mod agent_reply;
pub mod bridge_agent;
pub mod executor;
pub mod model_agent;

pub use bridge_agent::BridgeAgent;
pub use executor::{Executor, ExecutorConfig, ExecutorError};
pub use model_agent::{ModelAgent, ModelAgentFactory};
