// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Sequential branch runner.
//!
//! A branch walks the graph one node at a time with exclusive ownership of
//! its context. It ends when it completes, fails, forks into child branches,
//! parks at a join node, or is halted. Anything shared between branches lives
//! in [`Run`] and is internally synchronised.

use super::config::ExecutorConfig;
use crate::domain::agent::{AgentError, RoutingRequest, Task};
use crate::domain::events::{Event, EventType};
use crate::domain::execution::{
    BranchId, Context, ExecutionError, ExecutionId, NodeExecutionRecord, NodeOutcome,
};
use crate::domain::graph::{Graph, Node, NodeId, NodeKind};
use crate::domain::handler::NodeHandlerError;
use crate::domain::tracer::{NodeVisit, Tracer};
use crate::infrastructure::agent_registry::AgentRegistry;
use crate::infrastructure::event_stream::EventStream;
use crate::infrastructure::handlers::HandlerRegistry;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

// ============================================================================
// Branch
// ============================================================================

pub(crate) struct Branch {
    pub(crate) id: BranchId,
    pub(crate) node: NodeId,
    pub(crate) context: Context,
    /// Task handed over by a routing request, consumed by the next dispatch
    pub(crate) task: Option<Task>,
    /// Set on the branch released by a join barrier so it runs the join node
    pub(crate) joined: bool,
}

impl Branch {
    pub(crate) fn at(id: BranchId, node: NodeId, context: Context, task: Option<Task>) -> Self {
        Self {
            id,
            node,
            context,
            task,
            joined: false,
        }
    }

    pub(crate) fn joined(
        id: BranchId,
        node: NodeId,
        context: Context,
        task: Option<Task>,
    ) -> Self {
        Self {
            id,
            node,
            context,
            task,
            joined: true,
        }
    }
}

pub(crate) enum BranchExit {
    Completed {
        context: Context,
    },
    Failed {
        context: Context,
        error: ExecutionError,
    },
    /// The branch split; children continue with copies of its context
    Forked {
        children: Vec<Branch>,
    },
    /// Parked at a join node
    Arrived(Branch),
    /// Stopped at a safe point by cancellation or a terminal error
    Halted {
        node: NodeId,
        context: Context,
    },
}

// ============================================================================
// Run: state shared by all branches of one execution
// ============================================================================

pub(crate) struct Run {
    pub(crate) execution_id: ExecutionId,
    pub(crate) graph: Arc<Graph>,
    pub(crate) config: ExecutorConfig,
    pub(crate) agents: Arc<AgentRegistry>,
    pub(crate) handlers: Arc<HandlerRegistry>,
    pub(crate) tracer: Arc<dyn Tracer>,
    pub(crate) events: EventStream,
    /// Child of the caller's token; also fired by terminal errors
    pub(crate) halt: CancellationToken,
    steps: AtomicUsize,
    next_branch: AtomicU32,
    history: Mutex<Vec<NodeExecutionRecord>>,
    terminal: Mutex<Option<ExecutionError>>,
    last_node: Mutex<Option<NodeId>>,
}

impl Run {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        execution_id: ExecutionId,
        graph: Arc<Graph>,
        config: ExecutorConfig,
        agents: Arc<AgentRegistry>,
        handlers: Arc<HandlerRegistry>,
        tracer: Arc<dyn Tracer>,
        events: EventStream,
        cancel: &CancellationToken,
    ) -> Self {
        Self {
            execution_id,
            graph,
            config,
            agents,
            handlers,
            tracer,
            events,
            halt: cancel.child_token(),
            steps: AtomicUsize::new(0),
            next_branch: AtomicU32::new(0),
            history: Mutex::new(Vec::new()),
            terminal: Mutex::new(None),
            last_node: Mutex::new(None),
        }
    }

    pub(crate) fn next_branch_id(&self) -> BranchId {
        BranchId(self.next_branch.fetch_add(1, Ordering::Relaxed))
    }

    /// Reserve one dispatch against `max_steps`
    fn try_consume_step(&self) -> bool {
        let max_steps = self.config.max_steps;
        self.steps
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |steps| {
                (steps < max_steps).then_some(steps + 1)
            })
            .is_ok()
    }

    pub(crate) fn steps(&self) -> usize {
        self.steps.load(Ordering::Acquire)
    }

    /// Record a terminal error (first one wins) and halt every branch
    pub(crate) fn terminate(&self, error: ExecutionError) {
        {
            let mut terminal = self.terminal.lock();
            if terminal.is_none() {
                warn!(execution_id = %self.execution_id, error = %error, "Terminating execution");
                *terminal = Some(error);
            }
        }
        self.halt.cancel();
    }

    pub(crate) fn terminal_error(&self) -> Option<ExecutionError> {
        self.terminal.lock().clone()
    }

    pub(crate) fn last_node(&self) -> Option<NodeId> {
        self.last_node.lock().clone()
    }

    pub(crate) fn take_history(&self) -> Vec<NodeExecutionRecord> {
        std::mem::take(&mut *self.history.lock())
    }

    pub(crate) fn report_error(&self, node_id: &NodeId, error: &(dyn std::error::Error + Send + Sync)) {
        self.tracer.on_error(self.execution_id, node_id, error);
    }

    fn enter(&self, node_id: &NodeId, branch: BranchId, attempt: u32) -> (NodeVisit, DateTime<Utc>) {
        let visit = NodeVisit {
            execution_id: self.execution_id,
            node_id: node_id.clone(),
            branch,
            attempt,
        };
        self.tracer.on_node_enter(&visit);
        (visit, Utc::now())
    }

    fn exit(&self, visit: NodeVisit, started_at: DateTime<Utc>, outcome: NodeOutcome) {
        self.tracer.on_node_exit(&visit, &outcome);
        self.history.lock().push(NodeExecutionRecord {
            node_id: visit.node_id,
            branch: visit.branch,
            attempt: visit.attempt,
            started_at,
            ended_at: Utc::now(),
            outcome,
        });
    }

    fn failed(reason: &impl ToString) -> NodeOutcome {
        NodeOutcome::Failed {
            reason: reason.to_string(),
        }
    }
}

// ============================================================================
// Dispatch
// ============================================================================

enum Dispatch {
    /// The node explicitly ended its branch
    Complete,
    Route(Vec<RoutingRequest>),
    FollowEdges,
    Halted,
    Failed(ExecutionError),
}

pub(crate) async fn run_branch(run: Arc<Run>, mut branch: Branch) -> BranchExit {
    let graph = Arc::clone(&run.graph);
    loop {
        let Some(node) = graph.node(&branch.node) else {
            let error = ExecutionError::NodeFailed {
                execution_id: run.execution_id,
                node_id: branch.node.clone(),
                message: "node not found in graph".to_string(),
            };
            return BranchExit::Failed {
                context: branch.context,
                error,
            };
        };

        if node.is_join() && !branch.joined {
            debug!(execution_id = %run.execution_id, node_id = %node.id, branch = %branch.id, "Branch arrived at join");
            return BranchExit::Arrived(branch);
        }
        branch.joined = false;

        // Safe point: nothing new starts once the run is halted
        if run.halt.is_cancelled() {
            return BranchExit::Halted {
                node: branch.node,
                context: branch.context,
            };
        }

        if !run.try_consume_step() {
            run.terminate(ExecutionError::MaxStepsExceeded {
                execution_id: run.execution_id,
                node_id: node.id.clone(),
                max_steps: run.config.max_steps,
            });
            return BranchExit::Halted {
                node: branch.node,
                context: branch.context,
            };
        }
        *run.last_node.lock() = Some(node.id.clone());
        metrics::counter!("agent_graph_node_dispatches_total", "kind" => node.kind.label())
            .increment(1);

        let dispatch = match &node.kind {
            NodeKind::Agent { .. } => dispatch_agent(&run, node, &mut branch).await,
            NodeKind::Task | NodeKind::Data | NodeKind::Service => {
                dispatch_handler(&run, node, &mut branch).await
            }
        };

        let mut next: Vec<(NodeId, Option<Task>)> = match dispatch {
            Dispatch::Complete => {
                return BranchExit::Completed {
                    context: branch.context,
                }
            }
            Dispatch::Halted => {
                return BranchExit::Halted {
                    node: branch.node,
                    context: branch.context,
                }
            }
            Dispatch::Failed(error) => {
                return BranchExit::Failed {
                    context: branch.context,
                    error,
                }
            }
            Dispatch::Route(routes) => {
                if let Some(rejected) = routes.iter().find(|r| !graph.has_edge(&node.id, &r.target)) {
                    let error = ExecutionError::RoutingNotAllowed {
                        execution_id: run.execution_id,
                        node_id: node.id.clone(),
                        target: rejected.target.clone(),
                    };
                    warn!(execution_id = %run.execution_id, node_id = %node.id, target = %rejected.target, "Rejected routing request");
                    run.report_error(&node.id, &error);
                    return BranchExit::Failed {
                        context: branch.context,
                        error,
                    };
                }
                routes.into_iter().map(|r| (r.target, Some(r.task))).collect()
            }
            Dispatch::FollowEdges => {
                let mut satisfied = graph
                    .outgoing(&node.id)
                    .filter(|edge| edge.is_satisfied(&branch.context))
                    .map(|edge| (edge.to.clone(), None));
                if node.fan_out {
                    satisfied.collect()
                } else {
                    satisfied.next().into_iter().collect()
                }
            }
        };

        if next.len() > 1 {
            let children = next
                .into_iter()
                .map(|(target, task)| {
                    Branch::at(run.next_branch_id(), target, branch.context.clone(), task)
                })
                .collect::<Vec<_>>();
            debug!(
                execution_id = %run.execution_id,
                node_id = %node.id,
                branch = %branch.id,
                children = children.len(),
                "Branch fanned out"
            );
            return BranchExit::Forked { children };
        }

        match next.pop() {
            Some((target, task)) => {
                debug!(execution_id = %run.execution_id, from = %node.id, to = %target, branch = %branch.id, "Advancing branch");
                branch.node = target;
                branch.task = task;
            }
            None => {
                return BranchExit::Completed {
                    context: branch.context,
                }
            }
        }
    }
}

async fn dispatch_agent(run: &Run, node: &Node, branch: &mut Branch) -> Dispatch {
    let Some(agent) = run.agents.get(&node.id) else {
        let error = ExecutionError::NodeFailed {
            execution_id: run.execution_id,
            node_id: node.id.clone(),
            message: "no agent registered for node".to_string(),
        };
        let (visit, started_at) = run.enter(&node.id, branch.id, 1);
        run.report_error(&node.id, &error);
        run.exit(visit, started_at, Run::failed(&error));
        return Dispatch::Failed(error);
    };

    let task = branch
        .task
        .take()
        .unwrap_or_else(|| Task::from_context(&node.id, &branch.context, &node.name));
    let max_attempts = run.config.max_retries.saturating_add(1);

    for attempt in 1..=max_attempts {
        if attempt > 1 {
            let backoff = run.config.backoff_for(attempt);
            tokio::select! {
                _ = tokio::time::sleep(backoff) => {}
                _ = run.halt.cancelled() => return Dispatch::Halted,
            }
        }

        let (visit, started_at) = run.enter(&node.id, branch.id, attempt);
        let mut attempt_task = task.clone();
        attempt_task.start();

        let result = agent
            .process_task(attempt_task, &branch.context, &run.halt)
            .await;

        match result {
            Ok(output) if output.result.success => {
                run.exit(visit, started_at, NodeOutcome::Succeeded);

                let complete = output.result.complete;
                let targets: Vec<&str> = output.routes.iter().map(|r| r.target.as_str()).collect();
                publish_agent_action(run, node, branch.id, attempt, &task, complete, &targets);

                branch.context.extend(output.result.output);
                return if complete {
                    Dispatch::Complete
                } else if !output.routes.is_empty() {
                    Dispatch::Route(output.routes)
                } else {
                    Dispatch::FollowEdges
                };
            }
            Ok(output) => {
                let error = ExecutionError::AgentProcessing {
                    execution_id: run.execution_id,
                    node_id: node.id.clone(),
                    attempts: attempt,
                    message: output
                        .result
                        .explanation
                        .unwrap_or_else(|| "agent reported failure".to_string()),
                };
                run.report_error(&node.id, &error);
                run.exit(visit, started_at, Run::failed(&error));
                return Dispatch::Failed(error);
            }
            Err(AgentError::Cancelled) => {
                run.exit(visit, started_at, NodeOutcome::Cancelled);
                return Dispatch::Halted;
            }
            Err(_) if run.halt.is_cancelled() => {
                run.exit(visit, started_at, NodeOutcome::Cancelled);
                return Dispatch::Halted;
            }
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                warn!(
                    execution_id = %run.execution_id,
                    node_id = %node.id,
                    attempt,
                    max_attempts,
                    error = %e,
                    "Agent attempt failed, retrying"
                );
                run.report_error(&node.id, &e);
                run.exit(visit, started_at, Run::failed(&e));
            }
            Err(e) => {
                let error = ExecutionError::AgentProcessing {
                    execution_id: run.execution_id,
                    node_id: node.id.clone(),
                    attempts: attempt,
                    message: e.to_string(),
                };
                run.report_error(&node.id, &e);
                run.exit(visit, started_at, Run::failed(&e));
                return Dispatch::Failed(error);
            }
        }
    }

    // Unreachable with max_attempts >= 1; the last attempt always returns
    Dispatch::Failed(ExecutionError::AgentProcessing {
        execution_id: run.execution_id,
        node_id: node.id.clone(),
        attempts: max_attempts,
        message: "retry budget exhausted".to_string(),
    })
}

async fn dispatch_handler(run: &Run, node: &Node, branch: &mut Branch) -> Dispatch {
    if let Some(task) = branch.task.take() {
        branch.context.extend(task.input_data);
    }

    let (visit, started_at) = run.enter(&node.id, branch.id, 1);
    let Some(handler) = run.handlers.resolve(node) else {
        let error = ExecutionError::NodeFailed {
            execution_id: run.execution_id,
            node_id: node.id.clone(),
            message: format!("no handler for {} node", node.kind.label()),
        };
        run.report_error(&node.id, &error);
        run.exit(visit, started_at, Run::failed(&error));
        return Dispatch::Failed(error);
    };

    match handler.handle(node, branch.context.clone(), &run.halt).await {
        Ok(context) => {
            branch.context = context;
            run.exit(visit, started_at, NodeOutcome::Succeeded);
            Dispatch::FollowEdges
        }
        Err(NodeHandlerError::Cancelled) => {
            run.exit(visit, started_at, NodeOutcome::Cancelled);
            Dispatch::Halted
        }
        Err(e) => {
            let error = ExecutionError::NodeFailed {
                execution_id: run.execution_id,
                node_id: node.id.clone(),
                message: e.to_string(),
            };
            run.report_error(&node.id, &e);
            run.exit(visit, started_at, Run::failed(&e));
            Dispatch::Failed(error)
        }
    }
}

fn publish_agent_action(
    run: &Run,
    node: &Node,
    branch: BranchId,
    attempt: u32,
    task: &Task,
    complete: bool,
    routes: &[&str],
) {
    let role = node
        .agent_config()
        .map(|config| config.role.to_string())
        .unwrap_or_default();
    let event = Event::new(EventType::AgentAction, node.id.as_str())
        .with_data("role", json!(role))
        .with_data("task", json!(task.description))
        .with_data("routes", json!(routes))
        .with_data("complete", json!(complete))
        .with_metadata("execution_id", json!(run.execution_id.to_string()))
        .with_metadata("branch", json!(branch.to_string()))
        .with_metadata("attempt", json!(attempt));

    if let Err(e) = run.events.publish(event) {
        debug!(execution_id = %run.execution_id, error = %e, "Agent action event not published");
    }
}
