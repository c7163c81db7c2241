// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `sdd rebase` - merge main into an entity's worktree

use crate::context::App;
use crate::exit_error::ExitError;
use crate::output::OutputFormat;
use anyhow::Result;
use clap::Args;
use sdd_core::EntityId;
use sdd_engine::{rebase_from_main, AgentCommandBuilder, ErrorCode, GitMergeBackend, OrchestratorError};

#[derive(Args)]
pub struct RebaseArgs {
    pub entity: EntityId,
}

pub async fn handle(app: &App, args: RebaseArgs) -> Result<()> {
    let entity = &args.entity;
    let worktree = app
        .metadata
        .read_worktree_config(entity)
        .await
        .map_err(|e| ExitError::from(OrchestratorError::from(e)))?
        .ok_or_else(|| ExitError::coded(ErrorCode::InvalidState, format!("{entity} has no worktree")))?;
    let path = if worktree.path.is_absolute() { worktree.path } else { app.root().path().join(worktree.path) };

    let process = app
        .providers
        .resolve(app.root())
        .map_err(|e| ExitError::coded(ErrorCode::ConnectionError, e))?
        .process;
    let backend = GitMergeBackend::new(
        process,
        AgentCommandBuilder::new(app.config.agent_command_config()),
        app.config.rebase.main_branch.clone(),
    );
    let outcome = rebase_from_main(&backend, &path).await.map_err(ExitError::from)?;

    match app.format {
        OutputFormat::Text => println!("{}: {}", entity, outcome.message()),
        OutputFormat::Json => println!(
            "{}",
            serde_json::json!({ "entity": entity, "branch": worktree.branch, "message": outcome.message() })
        ),
    }
    Ok(())
}
