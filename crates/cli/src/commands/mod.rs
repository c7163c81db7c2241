// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CLI command implementations

pub mod agent;
pub mod auto;
pub mod phase;
pub mod rebase;
pub mod watch;

use crate::context::App;
use crate::exit_error::{ExitError, EXIT_FAILURE};
use crate::output::{self, OutputFormat};
use anyhow::Result;
use sdd_core::{AgentId, AgentStatus, EntityId, Event, OutputStream, Phase};
use sdd_engine::Subscription;
use std::io::Write;
use std::time::Duration;

/// How long to wait for a completed run to be recorded in metadata.
const RECORD_TIMEOUT: Duration = Duration::from_secs(10);

/// Output, status and generation events, for following one agent.
pub(crate) fn agent_events(app: &App) -> Subscription {
    app.bus.subscribe(|e| {
        matches!(
            e,
            Event::AgentOutput { .. } | Event::AgentStatusChanged { .. } | Event::PhaseGenerated { .. }
        )
    })
}

/// Stream an agent's output until it reaches a terminal status. `None`
/// means the user detached with Ctrl-C; the agent keeps running.
pub(crate) async fn follow_agent(
    events: &mut Subscription,
    agent_id: &AgentId,
    format: OutputFormat,
) -> Result<Option<AgentStatus>> {
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(Event::AgentOutput { agent_id: id, stream, chunk, .. }) if &id == agent_id => {
                    if format == OutputFormat::Text {
                        match stream {
                            OutputStream::Stdout => print!("{chunk}"),
                            OutputStream::Stderr => eprint!("{chunk}"),
                        }
                        let _ = std::io::stdout().flush();
                    }
                }
                Some(Event::AgentStatusChanged { agent_id: id, status, .. })
                    if &id == agent_id && status.is_terminal() =>
                {
                    return Ok(Some(status));
                }
                Some(_) => {}
                None => anyhow::bail!("event bus closed"),
            },
            _ = &mut ctrl_c => {
                eprintln!("detached; agent {agent_id} keeps running");
                return Ok(None);
            }
        }
    }
}

/// Wait until `phase` of `entity` has been recorded as generated.
pub(crate) async fn await_generated(events: &mut Subscription, entity: &EntityId, phase: Phase) {
    let wait = async {
        while let Some(event) = events.recv().await {
            if matches!(&event, Event::PhaseGenerated { entity: e, phase: p } if e == entity && *p == phase) {
                return true;
            }
        }
        false
    };
    if !matches!(tokio::time::timeout(RECORD_TIMEOUT, wait).await, Ok(true)) {
        tracing::warn!(entity = %entity, phase = %phase, "completion was not recorded in metadata");
    }
}

/// Report a finished agent; anything but `completed` is a failure exit.
pub(crate) fn finish_agent(app: &App, agent_id: &AgentId, status: Option<AgentStatus>) -> Result<()> {
    let handle = app.supervisor().get_agent(agent_id);
    if app.format == OutputFormat::Json {
        output::format_or_json(app.format, &handle, || {})?;
    }
    match status {
        None | Some(AgentStatus::Completed) => Ok(()),
        Some(status) => {
            let code = handle.and_then(|h| h.exit_code).map(|c| format!(" (exit code {c})")).unwrap_or_default();
            Err(ExitError::new(EXIT_FAILURE, format!("agent {agent_id} {status}{code}")).into())
        }
    }
}
