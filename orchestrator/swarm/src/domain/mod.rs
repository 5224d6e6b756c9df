// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Multi-Agent System Domain Layer
//!
//! | Module | Key Types |
//! |--------|-----------|
//! | [`system`] | `SystemId`, `TaskResult`, `SystemError` |

pub mod system;

pub use system::*;
