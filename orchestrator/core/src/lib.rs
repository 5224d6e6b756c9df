// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Agent Graph Core
//!
//! Graph-based execution engine for cooperating agents.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Graph model, executor, event stream, shared state, tracing
//!   and the agent/model/bridge boundaries

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use domain::*;
