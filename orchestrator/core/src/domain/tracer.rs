// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Tracer Hook
//!
//! Injectable observer the executor calls around every node dispatch
//! attempt. Calls are synchronous and made from branch tasks, so
//! implementations must be cheap and must not block; anything slow belongs
//! behind a channel (see `ForwardingTracer`).
//!
//! Call order per attempt is `on_node_enter`, then `on_error` (failed
//! attempts only), then `on_node_exit`. Routing rejections and incomplete
//! joins are reported through `on_error` alone.

use crate::domain::execution::{BranchId, ExecutionId, NodeOutcome};
use crate::domain::graph::NodeId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifies one node dispatch attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeVisit {
    pub execution_id: ExecutionId,
    pub node_id: NodeId,
    pub branch: BranchId,
    /// 1-based
    pub attempt: u32,
}

pub trait Tracer: Send + Sync {
    fn on_node_enter(&self, _visit: &NodeVisit) {}

    fn on_node_exit(&self, _visit: &NodeVisit, _outcome: &NodeOutcome) {}

    fn on_error(
        &self,
        _execution_id: ExecutionId,
        _node_id: &NodeId,
        _error: &(dyn std::error::Error + Send + Sync),
    ) {
    }

    /// Called once per run, after every branch has stopped and before the
    /// terminal event. Attempts aborted by a timeout never get an exit.
    fn on_execution_end(&self, _execution_id: ExecutionId) {}
}

/// Default tracer
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl Tracer for NoopTracer {}

// ============================================================================
// Span export
// ============================================================================

/// Completed node span as shipped to an external trace collector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Span {
    pub execution_id: ExecutionId,
    pub node_id: NodeId,
    pub branch: BranchId,
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub outcome: NodeOutcome,
    /// Errors reported while the span was open
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

/// Sink for finished spans (OTLP collector, log shipper, test buffer)
#[async_trait]
pub trait SpanExporter: Send + Sync {
    async fn export(&self, spans: Vec<Span>) -> Result<(), TracerError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum TracerError {
    #[error("Span export failed: {0}")]
    Export(String),
}
