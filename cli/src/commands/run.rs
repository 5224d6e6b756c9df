// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `agent-graph run`
//!
//! Builds a multi-agent system from the manifest and executes one task.
//! Ctrl-C cancels the execution; branches stop at their next safe point.

use super::validate;
use agent_graph_core::application::model_agent::ModelAgentFactory;
use agent_graph_core::domain::agent::{AgentFactory, Task};
use agent_graph_core::domain::events::{Event, EventFilter, EventType};
use agent_graph_core::domain::execution::{ExecutionState, ExecutionStatus};
use agent_graph_core::domain::llm::ModelInvoker;
use agent_graph_core::infrastructure::llm::{OpenAiCompatibleInvoker, StaticModelInvoker};
use agent_graph_core::infrastructure::manifest_parser::GraphManifest;
use agent_graph_core::infrastructure::tracers::LoggingTracer;
use agent_graph_swarm::{MultiAgentSystem, SystemError};
use anyhow::{anyhow, bail, Context, Result};
use clap::Args;
use colored::Colorize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Args)]
pub struct RunArgs {
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Task description handed to the entry node
    #[arg(short, long)]
    pub task: String,

    /// Entry node (default: the manifest's entry)
    #[arg(long)]
    pub entry: Option<String>,

    /// Task input as KEY=VALUE; VALUE is parsed as JSON when possible
    #[arg(short, long = "input", value_name = "KEY=VALUE")]
    pub inputs: Vec<String>,

    /// Use a built-in model that completes every task without routing
    #[arg(long)]
    pub dry_run: bool,

    /// Print the final execution state as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(args: RunArgs) -> Result<()> {
    let manifest = validate::load(&args.file)?;
    let factory = agent_factory(&manifest, args.dry_run)?;

    let system = MultiAgentSystem::builder(manifest.name.clone(), factory)
        .manifest(manifest)
        .tracer(Arc::new(LoggingTracer))
        .build()
        .context("Failed to assemble multi-agent system")?;

    let mut task = Task::new(args.task.clone());
    for input in &args.inputs {
        let (key, value) = parse_input(input)?;
        task = task.with_input(key, value);
    }

    if !args.json {
        system
            .events()
            .subscribe(
                EventFilter::Type(EventType::AgentAction),
                Arc::new(|event: &Event| -> anyhow::Result<()> {
                    print_action(event);
                    Ok(())
                }),
            )
            .context("Failed to subscribe to agent actions")?;
    }

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling execution");
            ctrl_c.cancel();
        }
    });

    let entry = match args.entry {
        Some(entry) => entry.into(),
        None => system.default_entry()?,
    };
    info!(system = %system.name(), entry = %entry, "Running task");

    let state = match system.execute_task_with_cancel(entry, task, cancel).await {
        Ok(result) => result.state,
        Err(SystemError::Executor(e)) => {
            let message = e.to_string();
            let state = e
                .into_partial_state()
                .ok_or_else(|| anyhow!("Execution rejected: {message}"))?;
            eprintln!("{} {}", "✗".red(), message);
            state
        }
        Err(e) => return Err(e.into()),
    };

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&state).context("Failed to serialize execution state")?
        );
    } else {
        print_summary(&state);
    }

    if state.status != ExecutionStatus::Completed {
        bail!("Execution {} ended {}", state.execution_id, state.status);
    }
    Ok(())
}

fn agent_factory(manifest: &GraphManifest, dry_run: bool) -> Result<Arc<dyn AgentFactory>> {
    let invoker: Arc<dyn ModelInvoker> = if dry_run {
        Arc::new(StaticModelInvoker::completing())
    } else {
        let model = manifest.model.as_ref().ok_or_else(|| {
            anyhow!("Manifest '{}' has no spec.model; use --dry-run", manifest.name)
        })?;
        if model.api_key_env.is_some() && model.api_key().is_none() {
            warn!(
                variable = model.api_key_env.as_deref().unwrap_or_default(),
                "API key variable is not set; calling the endpoint without credentials"
            );
        }
        Arc::new(OpenAiCompatibleInvoker::new(
            model.endpoint.clone(),
            model.api_key(),
            model.model.clone(),
        ))
    };
    Ok(Arc::new(ModelAgentFactory::new(invoker)))
}

fn parse_input(input: &str) -> Result<(String, Value)> {
    let (key, raw) = input
        .split_once('=')
        .ok_or_else(|| anyhow!("Invalid input '{input}': expected KEY=VALUE"))?;
    let key = key.trim();
    if key.is_empty() {
        bail!("Invalid input '{input}': key is empty");
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}

fn print_action(event: &Event) {
    let routes = event
        .data
        .get("routes")
        .and_then(Value::as_array)
        .map(|routes| {
            routes
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default();
    let complete = event
        .data
        .get("complete")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let next = if complete {
        "done".green().to_string()
    } else if routes.is_empty() {
        "follows edges".dimmed().to_string()
    } else {
        format!("→ {routes}")
    };
    println!("  {} {}", event.source.cyan(), next);
}

fn print_summary(state: &ExecutionState) {
    println!();
    let status = match state.status {
        ExecutionStatus::Completed => state.status.as_str().green(),
        ExecutionStatus::Cancelled => state.status.as_str().yellow(),
        _ => state.status.as_str().red(),
    };
    println!("{} {}", "Status:".bold(), status);
    println!("  Execution: {}", state.execution_id);
    println!("  Steps: {}", state.steps);
    println!("  Path: {}", state.node_sequence().join(" → "));

    if !state.frontier.is_empty() {
        let frontier: Vec<&str> = state.frontier.iter().map(|id| id.as_str()).collect();
        println!("  Stopped at: {}", frontier.join(", "));
    }
    for error in &state.errors {
        println!("  {} {}", "error:".red(), error);
    }

    println!("{}", "Context:".bold());
    let mut keys: Vec<&String> = state.context.data().keys().collect();
    keys.sort();
    for key in keys {
        if let Some(value) = state.context.get(key) {
            println!("  {}: {}", key, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_input_values() {
        assert_eq!(
            parse_input("count=3").unwrap(),
            ("count".to_string(), json!(3))
        );
        assert_eq!(
            parse_input("page=profile").unwrap(),
            ("page".to_string(), json!("profile"))
        );
        assert_eq!(
            parse_input("filter={\"active\":true}").unwrap(),
            ("filter".to_string(), json!({"active": true}))
        );
        assert!(parse_input("novalue").is_err());
        assert!(parse_input("=x").is_err());
    }
}
