// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # `agent-graph-swarm` - Multi-Agent System
//!
//! Composes agents into a routable team on top of the agent-graph engine.
//!
//! ## Crate Layout
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | `SystemId`, `TaskResult`, `SystemError`, standard topology |
//! | [`application`] | Application | `MultiAgentSystem`, `create_standard_multi_agent_system` |
//!
//! ## Key Concepts
//!
//! - **Agents are nodes**: adding an agent adds a node to the system graph and
//!   registers its implementation under the same id.
//! - **Routing is declared**: an agent may only hand work to agents it has
//!   been connected to with [`MultiAgentSystem::connect_agents`].
//! - **Topology is frozen while running**: composition changes fail with
//!   `GraphLocked` while a task executes.
//!
//! [`MultiAgentSystem::connect_agents`]: application::MultiAgentSystem::connect_agents

pub mod application;
pub mod domain;

pub use application::*;
pub use domain::*;
