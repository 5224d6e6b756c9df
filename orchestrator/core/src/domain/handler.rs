// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Handlers for non-agent nodes (Task, Data, Service).
//!
//! A handler consumes the branch context and produces the next one. What the
//! transform does is domain specific; the executor treats it as a black box.

use crate::domain::execution::Context;
use crate::domain::graph::Node;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait NodeHandler: Send + Sync {
    async fn handle(
        &self,
        node: &Node,
        context: Context,
        cancel: &CancellationToken,
    ) -> Result<Context, NodeHandlerError>;
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NodeHandlerError {
    #[error("{0}")]
    Failed(String),

    #[error("Invalid node configuration: {0}")]
    InvalidConfig(String),

    #[error("Handler cancelled")]
    Cancelled,
}
