// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `sdd run` and `sdd approve` - manual phase control

use super::{agent_events, await_generated, finish_agent, follow_agent};
use crate::color;
use crate::context::App;
use crate::exit_error::ExitError;
use crate::output::OutputFormat;
use anyhow::Result;
use clap::Args;
use sdd_core::{AgentStatus, EntityId, Phase};

#[derive(Args)]
pub struct RunArgs {
    /// Entity as `specs/<name>`, `bugs/<name>` or a bare spec name
    pub entity: EntityId,
    pub phase: Phase,
    /// Return once the agent is spawned. The phase is then not recorded as
    /// generated when the agent finishes.
    #[arg(long)]
    pub detach: bool,
}

#[derive(Args)]
pub struct ApproveArgs {
    pub entity: EntityId,
    pub phase: Phase,
}

pub async fn run(app: &App, args: RunArgs) -> Result<()> {
    let mut events = agent_events(app);
    let handle = app.orchestrator.execute_phase(&args.entity, args.phase).await.map_err(ExitError::from)?;
    if app.format == OutputFormat::Text {
        eprintln!(
            "{} {} for {} ({})",
            color::header("Started"),
            args.phase,
            args.entity,
            color::muted(handle.agent_id.as_str())
        );
    }
    if args.detach {
        return finish_agent(app, &handle.agent_id, None);
    }

    let status = follow_agent(&mut events, &handle.agent_id, app.format).await?;
    if status == Some(AgentStatus::Completed) {
        await_generated(&mut events, &args.entity, args.phase).await;
    }
    finish_agent(app, &handle.agent_id, status)
}

pub async fn approve(app: &App, args: ApproveArgs) -> Result<()> {
    app.orchestrator.approve_phase(&args.entity, args.phase).await.map_err(ExitError::from)?;
    if app.format == OutputFormat::Text {
        println!("Approved {} for {}", args.phase, args.entity);
    } else {
        println!("{}", serde_json::json!({ "entity": args.entity, "phase": args.phase, "approved": true }));
    }
    Ok(())
}
