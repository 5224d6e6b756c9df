// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod agent_registry;
pub mod bridge;
pub mod event_stream;
pub mod handlers;
pub mod llm;
pub mod manifest_parser;
pub mod state_store;
pub mod tracers;

pub use agent_registry::{AgentRegistry, AgentRegistryError};
pub use event_stream::{EventReceiver, EventStream, EventStreamConfig, EventStreamError};
pub use handlers::HandlerRegistry;
pub use manifest_parser::{GraphManifest, ManifestError, ManifestParser};
pub use state_store::InMemoryStateStore;
