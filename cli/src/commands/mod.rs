// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the agent-graph CLI

pub mod inspect;
pub mod run;
pub mod validate;

pub use self::inspect::InspectArgs;
pub use self::run::RunArgs;
