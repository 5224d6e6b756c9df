// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # agent-graph CLI
//!
//! Loads an `AgentGraph` manifest and validates, inspects or runs it.
//!
//! ## Commands
//!
//! - `agent-graph validate <FILE>` - Parse and validate a manifest
//! - `agent-graph inspect <FILE>` - Print nodes, edges and executor settings
//! - `agent-graph run <FILE> --task "..."` - Execute a task on the graph

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

mod commands;

use commands::{InspectArgs, RunArgs};

/// Graph-based multi-agent execution engine
#[derive(Parser)]
#[command(name = "agent-graph")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "AGENT_GRAPH_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse and validate a graph manifest
    Validate {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Show the topology and settings of a graph manifest
    Inspect(InspectArgs),

    /// Execute a task on a graph manifest
    Run(RunArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine
    let dotenv = dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_logging(&cli.log_level)?;
    if let Some(path) = dotenv {
        debug!(path = %path.display(), "Loaded environment file");
    }

    match cli.command {
        Commands::Validate { file } => commands::validate::execute(&file),
        Commands::Inspect(args) => commands::inspect::execute(args),
        Commands::Run(args) => commands::run::execute(args).await,
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    Ok(())
}
