// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Tracer Implementations
//
// - LoggingTracer: structured `tracing` output per node attempt
// - RecordingTracer: in-memory log of every hook call, for inspection
// - ForwardingTracer: assembles spans and ships them to a SpanExporter
//   through a bounded channel; a full channel drops spans instead of
//   stalling the executor

use crate::domain::execution::{BranchId, ExecutionId, NodeOutcome};
use crate::domain::graph::NodeId;
use crate::domain::tracer::{NodeVisit, Span, SpanExporter, Tracer};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

// ============================================================================
// LoggingTracer
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingTracer;

impl Tracer for LoggingTracer {
    fn on_node_enter(&self, visit: &NodeVisit) {
        info!(
            execution_id = %visit.execution_id,
            node_id = %visit.node_id,
            branch = %visit.branch,
            attempt = visit.attempt,
            "Node enter"
        );
    }

    fn on_node_exit(&self, visit: &NodeVisit, outcome: &NodeOutcome) {
        match outcome {
            NodeOutcome::Failed { reason } => warn!(
                execution_id = %visit.execution_id,
                node_id = %visit.node_id,
                branch = %visit.branch,
                attempt = visit.attempt,
                reason = %reason,
                "Node exit (failed)"
            ),
            _ => info!(
                execution_id = %visit.execution_id,
                node_id = %visit.node_id,
                branch = %visit.branch,
                attempt = visit.attempt,
                outcome = ?outcome,
                "Node exit"
            ),
        }
    }

    fn on_error(
        &self,
        execution_id: ExecutionId,
        node_id: &NodeId,
        error: &(dyn std::error::Error + Send + Sync),
    ) {
        warn!(
            execution_id = %execution_id,
            node_id = %node_id,
            error = %error,
            "Node error"
        );
    }
}

// ============================================================================
// RecordingTracer
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum TraceRecord {
    Enter(NodeVisit),
    Exit(NodeVisit, NodeOutcome),
    Error {
        execution_id: ExecutionId,
        node_id: NodeId,
        message: String,
    },
}

#[derive(Debug, Default)]
pub struct RecordingTracer {
    records: Mutex<Vec<TraceRecord>>,
}

impl RecordingTracer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<TraceRecord> {
        self.records.lock().clone()
    }

    /// Node ids in `on_node_enter` order
    pub fn entered(&self) -> Vec<NodeId> {
        self.records
            .lock()
            .iter()
            .filter_map(|r| match r {
                TraceRecord::Enter(visit) => Some(visit.node_id.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn enter_count(&self) -> usize {
        self.count(|r| matches!(r, TraceRecord::Enter(_)))
    }

    pub fn exit_count(&self) -> usize {
        self.count(|r| matches!(r, TraceRecord::Exit(..)))
    }

    pub fn errors(&self) -> Vec<String> {
        self.records
            .lock()
            .iter()
            .filter_map(|r| match r {
                TraceRecord::Error { message, .. } => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    fn count(&self, predicate: impl Fn(&TraceRecord) -> bool) -> usize {
        self.records.lock().iter().filter(|r| predicate(r)).count()
    }
}

impl Tracer for RecordingTracer {
    fn on_node_enter(&self, visit: &NodeVisit) {
        self.records.lock().push(TraceRecord::Enter(visit.clone()));
    }

    fn on_node_exit(&self, visit: &NodeVisit, outcome: &NodeOutcome) {
        self.records
            .lock()
            .push(TraceRecord::Exit(visit.clone(), outcome.clone()));
    }

    fn on_error(
        &self,
        execution_id: ExecutionId,
        node_id: &NodeId,
        error: &(dyn std::error::Error + Send + Sync),
    ) {
        self.records.lock().push(TraceRecord::Error {
            execution_id,
            node_id: node_id.clone(),
            message: error.to_string(),
        });
    }
}

// ============================================================================
// ForwardingTracer
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardingConfig {
    /// Spans buffered between the executor and the export worker
    pub buffer: usize,
    pub batch_size: usize,
    #[serde(with = "humantime_serde")]
    pub flush_interval: Duration,
}

impl Default for ForwardingConfig {
    fn default() -> Self {
        Self {
            buffer: 1024,
            batch_size: 64,
            flush_interval: Duration::from_secs(1),
        }
    }
}

struct OpenSpan {
    started_at: DateTime<Utc>,
    errors: Vec<String>,
}

type SpanKey = (ExecutionId, BranchId, NodeId, u32);

pub struct ForwardingTracer {
    sender: mpsc::Sender<Span>,
    open: Mutex<HashMap<SpanKey, OpenSpan>>,
    dropped: AtomicU64,
}

impl ForwardingTracer {
    /// Start the export worker on the current runtime.
    ///
    /// The worker flushes what is left and exits once the tracer is dropped.
    pub fn spawn(
        exporter: Arc<dyn SpanExporter>,
        config: ForwardingConfig,
    ) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(config.buffer.max(1));
        let worker = tokio::spawn(export_worker(exporter, receiver, config));
        (
            Self {
                sender,
                open: Mutex::new(HashMap::new()),
                dropped: AtomicU64::new(0),
            },
            worker,
        )
    }

    /// Spans lost because the export channel was full or closed
    pub fn dropped_spans(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn ship(&self, span: Span) {
        if let Err(e) = self.sender.try_send(span) {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            warn!(error = %e, "Dropped trace span");
        }
    }

    fn key(visit: &NodeVisit) -> SpanKey {
        (
            visit.execution_id,
            visit.branch,
            visit.node_id.clone(),
            visit.attempt,
        )
    }
}

impl Tracer for ForwardingTracer {
    fn on_node_enter(&self, visit: &NodeVisit) {
        self.open.lock().insert(
            Self::key(visit),
            OpenSpan {
                started_at: Utc::now(),
                errors: Vec::new(),
            },
        );
    }

    fn on_node_exit(&self, visit: &NodeVisit, outcome: &NodeOutcome) {
        let now = Utc::now();
        let open = self.open.lock().remove(&Self::key(visit));
        let (started_at, errors) = match open {
            Some(span) => (span.started_at, span.errors),
            None => (now, Vec::new()),
        };
        self.ship(Span {
            execution_id: visit.execution_id,
            node_id: visit.node_id.clone(),
            branch: visit.branch,
            attempt: visit.attempt,
            started_at,
            ended_at: now,
            outcome: outcome.clone(),
            errors,
        });
    }

    fn on_error(
        &self,
        execution_id: ExecutionId,
        node_id: &NodeId,
        error: &(dyn std::error::Error + Send + Sync),
    ) {
        let message = error.to_string();
        {
            let mut open = self.open.lock();
            if let Some(span) = open
                .iter_mut()
                .find(|((exec, _, node, _), _)| *exec == execution_id && node == node_id)
                .map(|(_, span)| span)
            {
                span.errors.push(message);
                return;
            }
        }

        // Raised outside a node attempt: ship as an instantaneous failed span
        let now = Utc::now();
        self.ship(Span {
            execution_id,
            node_id: node_id.clone(),
            branch: BranchId(0),
            attempt: 0,
            started_at: now,
            ended_at: now,
            outcome: NodeOutcome::Failed {
                reason: message.clone(),
            },
            errors: vec![message],
        });
    }

    fn on_execution_end(&self, execution_id: ExecutionId) {
        let orphaned: Vec<(SpanKey, OpenSpan)> = {
            let mut open = self.open.lock();
            let keys: Vec<SpanKey> = open
                .keys()
                .filter(|(exec, ..)| *exec == execution_id)
                .cloned()
                .collect();
            keys.into_iter()
                .filter_map(|key| open.remove(&key).map(|span| (key, span)))
                .collect()
        };
        if orphaned.is_empty() {
            return;
        }

        debug!(execution_id = %execution_id, spans = orphaned.len(), "Closing spans left open at run end");
        let now = Utc::now();
        for ((execution_id, branch, node_id, attempt), span) in orphaned {
            self.ship(Span {
                execution_id,
                node_id,
                branch,
                attempt,
                started_at: span.started_at,
                ended_at: now,
                outcome: NodeOutcome::Cancelled,
                errors: span.errors,
            });
        }
    }
}

async fn export_worker(
    exporter: Arc<dyn SpanExporter>,
    mut receiver: mpsc::Receiver<Span>,
    config: ForwardingConfig,
) {
    let batch_size = config.batch_size.max(1);
    let mut batch: Vec<Span> = Vec::with_capacity(batch_size);
    let mut ticker = tokio::time::interval(config.flush_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            received = receiver.recv() => match received {
                Some(span) => {
                    batch.push(span);
                    if batch.len() >= batch_size {
                        flush(exporter.as_ref(), &mut batch).await;
                    }
                }
                None => break,
            },
            _ = ticker.tick() => {
                if !batch.is_empty() {
                    flush(exporter.as_ref(), &mut batch).await;
                }
            }
        }
    }

    if !batch.is_empty() {
        flush(exporter.as_ref(), &mut batch).await;
    }
    debug!("Span export worker stopped");
}

async fn flush(exporter: &dyn SpanExporter, batch: &mut Vec<Span>) {
    let spans = std::mem::take(batch);
    let count = spans.len();
    match exporter.export(spans).await {
        Ok(()) => debug!(spans = count, "Exported trace spans"),
        Err(e) => warn!(spans = count, error = %e, "Span export failed"),
    }
}
