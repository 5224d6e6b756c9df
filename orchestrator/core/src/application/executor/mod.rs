// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Graph Executor Application Service
//!
//! Runs a [`Graph`] from an entry node until no branch has work left.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Schedule node dispatch across concurrent branches
//! - **Dependencies:** Domain (Graph, Agent, Tracer), Infrastructure (EventStream,
//!   AgentRegistry, HandlerRegistry)
//!
//! # Execution model
//!
//! ```text
//! validate(graph, entry)
//! spawn branch(entry, initial context)
//! while let Some(exit) = join_next() {
//!     Completed | Failed | Halted  => collect context / error / frontier
//!     Forked(children)             => spawn each child (context copies)
//!     Arrived(branch)              => park at join; release merged branch when full
//! }
//! publish exactly one terminal event
//! ```
//!
//! Each branch runs as its own tokio task and is strictly sequential.
//! `max_steps` is shared by every branch; the overall timeout is enforced
//! here. The first of the two to trigger ends the run with a terminal error
//! that carries the partial [`ExecutionState`].

mod branch;
mod config;
mod join;

pub use config::ExecutorConfig;

use crate::domain::events::{
    Event, EventType, EXECUTION_CANCELLED, EXECUTION_COMPLETED, EXECUTION_FAILED,
};
use crate::domain::execution::{Context, ExecutionError, ExecutionState, ExecutionStatus};
use crate::domain::graph::{Graph, GraphError, NodeId};
use crate::domain::tracer::{NoopTracer, Tracer};
use crate::infrastructure::agent_registry::AgentRegistry;
use crate::infrastructure::event_stream::EventStream;
use crate::infrastructure::handlers::HandlerRegistry;
use branch::{run_branch, Branch, BranchExit, Run};
use join::JoinTable;
use serde_json::json;
use std::sync::Arc;
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Errors returned from [`Executor::execute`]
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    /// Rejected before anything ran
    #[error("Graph validation failed: {0}")]
    Validation(#[from] GraphError),

    /// `MaxStepsExceeded` or `Timeout`; the partial state is preserved
    #[error("{error}")]
    Terminated {
        error: ExecutionError,
        state: Box<ExecutionState>,
    },
}

impl ExecutorError {
    pub fn partial_state(&self) -> Option<&ExecutionState> {
        match self {
            ExecutorError::Terminated { state, .. } => Some(state),
            ExecutorError::Validation(_) => None,
        }
    }

    pub fn into_partial_state(self) -> Option<ExecutionState> {
        match self {
            ExecutorError::Terminated { state, .. } => Some(*state),
            ExecutorError::Validation(_) => None,
        }
    }

    pub fn execution_error(&self) -> Option<&ExecutionError> {
        match self {
            ExecutorError::Terminated { error, .. } => Some(error),
            ExecutorError::Validation(_) => None,
        }
    }
}

pub struct Executor {
    config: ExecutorConfig,
    agents: Arc<AgentRegistry>,
    handlers: Arc<HandlerRegistry>,
    events: EventStream,
    tracer: Arc<dyn Tracer>,
}

impl Executor {
    pub fn new(config: ExecutorConfig, agents: Arc<AgentRegistry>, events: EventStream) -> Self {
        Self {
            config,
            agents,
            handlers: Arc::new(HandlerRegistry::default()),
            events,
            tracer: Arc::new(NoopTracer),
        }
    }

    pub fn with_tracer(mut self, tracer: Arc<dyn Tracer>) -> Self {
        self.tracer = tracer;
        self
    }

    pub fn with_handlers(mut self, handlers: HandlerRegistry) -> Self {
        self.handlers = Arc::new(handlers);
        self
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn events(&self) -> &EventStream {
        &self.events
    }

    /// Execute `graph` from `entry`.
    ///
    /// Callers that compose graphs through a `SharedGraph` run it under a
    /// `GraphLease`, which keeps the topology frozen until this returns.
    /// Cancellation yields
    /// `Ok` with status `Cancelled`; branch failures yield `Ok` with status
    /// `Failed`; only validation and terminal errors are returned as `Err`.
    pub async fn execute(
        &self,
        graph: Arc<Graph>,
        entry: &NodeId,
        context: Context,
        cancel: CancellationToken,
    ) -> Result<ExecutionState, ExecutorError> {
        graph.validate_entry(entry)?;

        let mut state = ExecutionState::new(graph.id, entry.clone(), context.clone());
        state.start();
        let execution_id = state.execution_id;
        info!(
            execution_id = %execution_id,
            graph_id = %graph.id,
            graph = %graph.name,
            entry = %entry,
            max_steps = self.config.max_steps,
            "Starting graph execution"
        );

        let run = Arc::new(Run::new(
            execution_id,
            Arc::clone(&graph),
            self.config.clone(),
            Arc::clone(&self.agents),
            Arc::clone(&self.handlers),
            Arc::clone(&self.tracer),
            self.events.clone(),
            &cancel,
        ));

        let mut outcome = Coordinator::new(Arc::clone(&run));
        outcome.spawn(Branch::at(run.next_branch_id(), entry.clone(), context, None));
        outcome.drive(self.config.timeout.map(|t| Instant::now() + t), entry).await;

        let Coordinator {
            joins,
            mut contexts,
            mut frontier,
            mut errors,
            halted,
            ..
        } = outcome;

        let terminal = run.terminal_error();
        let stopped_early = halted > 0 || terminal.is_some();
        for (node_id, arrived) in joins.incomplete() {
            if !stopped_early {
                let error = ExecutionError::JoinIncomplete {
                    execution_id,
                    node_id: node_id.clone(),
                    arrived,
                    required: graph.required_arrivals(&node_id),
                };
                warn!(execution_id = %execution_id, node_id = %node_id, arrived, "Join never released");
                run.report_error(&node_id, &error);
                errors.push(error);
            }
            frontier.push(node_id);
        }
        contexts.extend(joins.parked_contexts().cloned());

        let mut merged = Context::new();
        for branch_context in &contexts {
            merged.merge(branch_context);
        }

        state.context = merged;
        state.history = run.take_history();
        state.steps = run.steps();
        state.errors = errors;
        state.frontier = frontier;

        // A cancel that arrives after every branch finished changes nothing
        if let Some(error) = &terminal {
            state.errors.push(error.clone());
            state.fail();
        } else if cancel.is_cancelled() && halted > 0 {
            state.cancel();
        } else if state.errors.is_empty() {
            state.complete();
        } else {
            state.fail();
        }

        self.tracer.on_execution_end(execution_id);
        self.publish_terminal(&state);
        info!(
            execution_id = %execution_id,
            status = %state.status,
            steps = state.steps,
            errors = state.errors.len(),
            "Graph execution finished"
        );

        match terminal {
            Some(error) => Err(ExecutorError::Terminated {
                error,
                state: Box::new(state),
            }),
            None => Ok(state),
        }
    }

    fn publish_terminal(&self, state: &ExecutionState) {
        let name = match state.status {
            ExecutionStatus::Completed => EXECUTION_COMPLETED,
            ExecutionStatus::Cancelled => EXECUTION_CANCELLED,
            _ => EXECUTION_FAILED,
        };
        metrics::counter!("agent_graph_executions_total", "status" => state.status.as_str())
            .increment(1);

        let errors: Vec<String> = state.errors.iter().map(ToString::to_string).collect();
        let event = Event::new(EventType::custom(name), "executor")
            .with_data("execution_id", json!(state.execution_id.to_string()))
            .with_data("graph_id", json!(state.graph_id.to_string()))
            .with_data("status", json!(state.status.as_str()))
            .with_data("steps", json!(state.steps))
            .with_data("errors", json!(errors))
            .with_metadata("execution_id", json!(state.execution_id.to_string()));

        if let Err(e) = self.events.publish(event) {
            warn!(execution_id = %state.execution_id, error = %e, "Terminal event not published");
        }
    }
}

// ============================================================================
// Coordinator
// ============================================================================

struct Coordinator {
    run: Arc<Run>,
    tasks: JoinSet<BranchExit>,
    joins: JoinTable,
    /// Contexts of ended branches, in the order they ended
    contexts: Vec<Context>,
    frontier: Vec<NodeId>,
    errors: Vec<ExecutionError>,
    /// Branches stopped by the halt token before running out of work
    halted: usize,
}

enum Wake {
    Joined(Option<Result<BranchExit, JoinError>>),
    TimedOut,
}

impl Coordinator {
    fn new(run: Arc<Run>) -> Self {
        Self {
            run,
            tasks: JoinSet::new(),
            joins: JoinTable::default(),
            contexts: Vec::new(),
            frontier: Vec::new(),
            errors: Vec::new(),
            halted: 0,
        }
    }

    fn spawn(&mut self, branch: Branch) {
        if self.run.halt.is_cancelled() {
            self.halted += 1;
            self.frontier.push(branch.node);
            self.contexts.push(branch.context);
            return;
        }
        debug!(execution_id = %self.run.execution_id, branch = %branch.id, node_id = %branch.node, "Spawning branch");
        self.tasks.spawn(run_branch(Arc::clone(&self.run), branch));
    }

    async fn drive(&mut self, mut deadline: Option<Instant>, entry: &NodeId) {
        loop {
            let wake = match deadline {
                Some(at) => tokio::select! {
                    joined = self.tasks.join_next() => Wake::Joined(joined),
                    _ = tokio::time::sleep_until(at) => Wake::TimedOut,
                },
                None => Wake::Joined(self.tasks.join_next().await),
            };

            match wake {
                Wake::TimedOut => {
                    deadline = None;
                    let node_id = self.run.last_node().unwrap_or_else(|| entry.clone());
                    self.run.terminate(ExecutionError::Timeout {
                        execution_id: self.run.execution_id,
                        node_id,
                        timeout: self.run.config.timeout.unwrap_or_default(),
                    });
                    self.tasks.abort_all();
                }
                Wake::Joined(None) => return,
                Wake::Joined(Some(Ok(exit))) => self.on_exit(exit),
                Wake::Joined(Some(Err(join_error))) => self.on_join_error(join_error),
            }
        }
    }

    fn on_exit(&mut self, exit: BranchExit) {
        match exit {
            BranchExit::Completed { context } => self.contexts.push(context),
            BranchExit::Failed { context, error } => {
                warn!(execution_id = %self.run.execution_id, error = %error, "Branch failed");
                self.errors.push(error);
                self.contexts.push(context);
            }
            BranchExit::Halted { node, context } => {
                self.halted += 1;
                self.frontier.push(node);
                self.contexts.push(context);
            }
            BranchExit::Forked { children } => {
                for child in children {
                    self.spawn(child);
                }
            }
            BranchExit::Arrived(branch) => {
                let required = self.run.graph.required_arrivals(&branch.node);
                let run = Arc::clone(&self.run);
                if let Some(released) = self.joins.arrive(branch, required, || run.next_branch_id()) {
                    debug!(
                        execution_id = %self.run.execution_id,
                        node_id = %released.node,
                        arrivals = required,
                        "Join released"
                    );
                    self.spawn(released);
                }
            }
        }
    }

    fn on_join_error(&mut self, join_error: JoinError) {
        if join_error.is_cancelled() {
            return;
        }
        let node_id = self
            .run
            .last_node()
            .unwrap_or_else(|| NodeId::from("<unknown>"));
        error!(execution_id = %self.run.execution_id, node_id = %node_id, "Branch task panicked");
        self.errors.push(ExecutionError::NodeFailed {
            execution_id: self.run.execution_id,
            node_id,
            message: "branch task panicked".to_string(),
        });
    }
}
