// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Swarmlink Broker CLI
//!
//! The `swarmlink` binary hosts the coordination broker.
//!
//! ## Commands
//!
//! - `swarmlink serve` - run the broker on stdio (what agent runtimes spawn)
//! - `swarmlink tools` - print the tool catalogue
//! - `swarmlink agents --project <id>` - inspect registered agents
//! - `swarmlink changes --project <id>` - inspect recent file changes
//!
//! Serving is stdio-only: one persistent child process per client
//! connection, line-delimited JSON-RPC.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;

mod commands;

/// Swarmlink - coordination broker for fleets of AI coding agents
#[derive(Parser)]
#[command(name = "swarmlink")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Store endpoint (Redis-compatible)
    #[arg(long, global = true, env = "STORE_URL")]
    store_url: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the broker on stdio
    Serve,

    /// Print the tool catalogue
    Tools,

    /// List registered agents in a project
    Agents {
        #[arg(long)]
        project: String,
    },

    /// Show recent file-change announcements in a project
    Changes {
        #[arg(long)]
        project: String,

        #[arg(long, default_value = "20")]
        limit: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level)?;

    match cli.command {
        Some(Commands::Serve) => commands::serve::run(cli.store_url).await,
        Some(Commands::Tools) => commands::inspect::tools(),
        Some(Commands::Agents { project }) => {
            commands::inspect::agents(cli.store_url, &project).await
        }
        Some(Commands::Changes { project, limit }) => {
            commands::inspect::changes(cli.store_url, &project, limit).await
        }
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging. Everything goes to stderr:
/// stdout belongs to the JSON-RPC transport.
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    Ok(())
}
