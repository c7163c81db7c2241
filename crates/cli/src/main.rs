// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sdd: supervise spec-driven development agents from the command line

mod color;
mod commands;
mod config;
mod context;
mod env;
mod exit_error;
mod logging;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{agent, auto, phase, rebase, watch};
use config::Config;
use context::App;
use exit_error::{ExitError, EXIT_FAILURE};
use output::OutputFormat;
use std::path::PathBuf;

const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), "+", env!("BUILD_GIT_HASH"));

#[derive(Parser)]
#[command(name = "sdd", version = VERSION, about = "Spec-driven development agent supervisor", styles = color::styles())]
struct Cli {
    /// Project root: a path or ssh://user@host[:port]/path (default: current directory)
    #[arg(long, global = true)]
    project: Option<String>,

    /// State directory for agent records, sessions and logs
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    #[arg(short = 'o', long, value_enum, default_value_t, global = true)]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one phase of an entity
    Run(phase::RunArgs),
    /// Start or control auto-execution of an entity
    Auto(auto::AutoArgs),
    /// List supervised agents
    Agents(agent::AgentsArgs),
    /// Resume an interrupted agent
    Resume(agent::ResumeArgs),
    /// Stop a running agent
    Stop(agent::AgentIdArgs),
    /// Forget a finished agent
    Ack(agent::AgentIdArgs),
    /// Approve a generated phase
    Approve(phase::ApproveArgs),
    /// Merge main into an entity's worktree
    Rebase(rebase::RebaseArgs),
    /// Print entity and agent changes until interrupted
    Watch(watch::WatchArgs),
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = env::config_path();
    let config = match &config_path {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    let state_dir = config.resolve_state_dir(cli.state_dir)?;
    let _log_guard = logging::init(&state_dir)?;
    let root = context::resolve_project(cli.project.as_deref())?;
    tracing::debug!(state_dir = %state_dir.display(), project = %root, "starting");

    let app = App::open(config, state_dir, root, cli.output).await?;
    match cli.command {
        Commands::Run(args) => phase::run(&app, args).await,
        Commands::Auto(args) => auto::handle(&app, args).await,
        Commands::Agents(args) => agent::list(&app, args),
        Commands::Resume(args) => agent::resume(&app, args).await,
        Commands::Stop(args) => agent::stop(&app, args).await,
        Commands::Ack(args) => agent::ack(&app, args),
        Commands::Approve(args) => phase::approve(&app, args).await,
        Commands::Rebase(args) => rebase::handle(&app, args).await,
        Commands::Watch(args) => watch::handle(&app, args).await,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        let code = match e.downcast_ref::<ExitError>() {
            Some(exit) => exit.code,
            None => EXIT_FAILURE,
        };
        eprintln!("error: {e:#}");
        std::process::exit(code);
    }
}
