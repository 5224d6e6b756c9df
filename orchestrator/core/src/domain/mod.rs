// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Pure types and collaborator traits of the agent graph engine.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Graph topology, execution records, agent contracts and
//!   the boundaries (state, events, bridge, model, tracer) the engine talks to

pub mod agent;
pub mod bridge;
pub mod events;
pub mod execution;
pub mod graph;
pub mod handler;
pub mod llm;
pub mod state;
pub mod tracer;
