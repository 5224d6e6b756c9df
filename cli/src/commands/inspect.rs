// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `agent-graph inspect`

use super::validate;
use agent_graph_core::domain::graph::{EdgeCondition, Node, NodeKind};
use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

#[derive(Args)]
pub struct InspectArgs {
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Print the parsed graph as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn execute(args: InspectArgs) -> Result<()> {
    let manifest = validate::load(&args.file)?;

    if args.json {
        let json = serde_json::to_string_pretty(&manifest.graph)
            .context("Failed to serialize graph")?;
        println!("{json}");
        return Ok(());
    }

    println!("{} {}", "Graph:".bold(), manifest.name);
    if let Some(description) = &manifest.description {
        println!("  {}", description.dimmed());
    }
    println!("  Entry: {}", manifest.entry);
    println!();

    println!("{}", "Nodes:".bold());
    for node in manifest.graph.nodes() {
        println!("  {}", describe_node(node));
    }
    println!();

    println!("{}", "Edges:".bold());
    for edge in manifest.graph.edges() {
        match &edge.condition {
            Some(condition) => println!(
                "  {} → {}  {}",
                edge.from,
                edge.to,
                format!("[{}]", describe_condition(condition)).dimmed()
            ),
            None => println!("  {} → {}", edge.from, edge.to),
        }
    }
    println!();

    let executor = &manifest.executor;
    println!("{}", "Executor:".bold());
    println!("  Max steps: {}", executor.max_steps);
    match executor.timeout {
        Some(timeout) => println!("  Timeout: {:?}", timeout),
        None => println!("  Timeout: {}", "(none)".dimmed()),
    }
    println!(
        "  Retries: {} (backoff {:?})",
        executor.max_retries, executor.retry_backoff
    );

    match &manifest.model {
        Some(model) => {
            println!("{}", "Model:".bold());
            println!("  {} @ {}", model.model, model.endpoint);
        }
        None => println!("{} {}", "Model:".bold(), "(none, dry-run only)".dimmed()),
    }
    Ok(())
}

fn describe_node(node: &Node) -> String {
    let mut line = match &node.kind {
        NodeKind::Agent { agent } => {
            let mut text = format!("{} {} ({})", node.id.as_str().cyan(), "agent", agent.role);
            if !agent.capabilities.is_empty() {
                let capabilities: Vec<&str> =
                    agent.capabilities.iter().map(String::as_str).collect();
                text.push_str(&format!(" [{}]", capabilities.join(", ")));
            }
            text
        }
        other => format!("{} {}", node.id.as_str().cyan(), other.label()),
    };
    if node.fan_out {
        line.push_str(&format!(" {}", "fan-out".yellow()));
    }
    if node.is_join() {
        line.push_str(&format!(" {}", "join".yellow()));
    }
    line
}

fn describe_condition(condition: &EdgeCondition) -> String {
    match condition {
        EdgeCondition::Always => "always".to_string(),
        EdgeCondition::KeyExists { key } => format!("{key} exists"),
        EdgeCondition::KeyEquals { key, value } => format!("{key} == {value}"),
        EdgeCondition::KeyTruthy { key } => format!("{key} is truthy"),
        EdgeCondition::Not { condition } => format!("not ({})", describe_condition(condition)),
        EdgeCondition::All { conditions } => join_conditions(conditions, " and "),
        EdgeCondition::Any { conditions } => join_conditions(conditions, " or "),
        EdgeCondition::Custom(_) => "custom".to_string(),
    }
}

fn join_conditions(conditions: &[EdgeCondition], separator: &str) -> String {
    let parts: Vec<String> = conditions.iter().map(describe_condition).collect();
    format!("({})", parts.join(separator))
}
