// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod system;

pub use system::{
    create_standard_multi_agent_system, populate_standard_team, MultiAgentSystem,
    MultiAgentSystemBuilder,
};
