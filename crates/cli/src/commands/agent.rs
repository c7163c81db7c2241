// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `sdd agents`, `sdd resume`, `sdd stop` and `sdd ack`

use super::{agent_events, finish_agent, follow_agent};
use crate::context::App;
use crate::exit_error::ExitError;
use crate::output::{self, OutputFormat};
use anyhow::Result;
use clap::Args;
use sdd_core::{AgentId, EntityId};

#[derive(Args)]
pub struct AgentsArgs {
    /// Only agents of this entity
    #[arg(long)]
    pub entity: Option<EntityId>,
}

#[derive(Args)]
pub struct ResumeArgs {
    pub agent_id: String,
    /// Input for the continued session instead of the configured prompt
    #[arg(long, short = 'm')]
    pub message: Option<String>,
    /// Return once the agent is re-spawned
    #[arg(long)]
    pub detach: bool,
}

#[derive(Args)]
pub struct AgentIdArgs {
    pub agent_id: String,
}

pub fn list(app: &App, args: AgentsArgs) -> Result<()> {
    let supervisor = app.supervisor();
    let agents = match &args.entity {
        Some(entity) => supervisor.get_agents(entity),
        None => supervisor.get_all_agents(),
    };
    output::format_or_json(app.format, &agents, || {
        print!("{}", output::render_agents(&agents, output::now_ms()));
    })
}

pub async fn resume(app: &App, args: ResumeArgs) -> Result<()> {
    let agent_id = AgentId::from_string(args.agent_id);
    let mut events = agent_events(app);
    let handle = app.supervisor().resume(&agent_id, args.message).await.map_err(ExitError::from)?;
    if app.format == OutputFormat::Text {
        eprintln!("Resumed {} ({} for {})", handle.agent_id, handle.phase, handle.entity);
    }
    if args.detach {
        return finish_agent(app, &agent_id, None);
    }
    let status = follow_agent(&mut events, &agent_id, app.format).await?;
    finish_agent(app, &agent_id, status)
}

pub async fn stop(app: &App, args: AgentIdArgs) -> Result<()> {
    let agent_id = AgentId::from_string(args.agent_id);
    app.supervisor().stop(&agent_id).await.map_err(ExitError::from)?;
    if app.format == OutputFormat::Text {
        println!("Stopped {agent_id}");
    } else {
        output::format_or_json(app.format, &app.supervisor().get_agent(&agent_id), || {})?;
    }
    Ok(())
}

pub fn ack(app: &App, args: AgentIdArgs) -> Result<()> {
    let agent_id = AgentId::from_string(args.agent_id);
    let handle = app.supervisor().acknowledge(&agent_id).map_err(ExitError::from)?;
    output::format_or_json(app.format, &handle, || {
        println!("Acknowledged {} ({} {})", handle.agent_id, handle.entity, handle.status);
    })
}
