// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `sdd auto` - auto-execution sessions

use crate::context::App;
use crate::exit_error::ExitError;
use crate::output::{self, describe_event, OutputFormat};
use anyhow::Result;
use clap::{ArgGroup, Args};
use sdd_core::{AutoExecutionSession, AutoExecutionStatus, EntityId, Event, Permissions, Phase, PhasePermission};
use sdd_engine::Subscription;

#[derive(Args)]
#[command(group(ArgGroup::new("action").args(["status", "stop", "resume", "fix", "allow", "hold"])))]
pub struct AutoArgs {
    pub entity: EntityId,

    /// Phase allowed to run; repeatable. Phases not listed pause the session.
    #[arg(long = "run", value_name = "PHASE")]
    pub run: Vec<Phase>,

    /// Allow every phase to run
    #[arg(long, conflicts_with = "run")]
    pub all: bool,

    /// Show the current session
    #[arg(long)]
    pub status: bool,

    /// Stop the session and its running agent
    #[arg(long)]
    pub stop: bool,

    /// Continue a paused or failed session
    #[arg(long)]
    pub resume: bool,

    /// Run the fix agent for the latest NOGO inspection
    #[arg(long)]
    pub fix: bool,

    /// Let PHASE run in an existing session
    #[arg(long, value_name = "PHASE")]
    pub allow: Option<Phase>,

    /// Pause an existing session before PHASE
    #[arg(long, value_name = "PHASE")]
    pub hold: Option<Phase>,

    /// Return after the first transition instead of following the session
    #[arg(long)]
    pub detach: bool,
}

impl AutoArgs {
    fn permissions(&self) -> Permissions {
        if self.all {
            Permissions::all_run()
        } else {
            Permissions::running(&self.run)
        }
    }
}

pub async fn handle(app: &App, args: AutoArgs) -> Result<()> {
    let orchestrator = &app.orchestrator;
    let entity = &args.entity;
    let mut events = app.bus.on_auto_execution_status();

    let session = if args.status {
        orchestrator.get_auto_execution_status(entity)
    } else if args.stop {
        orchestrator.stop_auto_execution(entity).await
    } else if args.resume {
        orchestrator.resume_auto_execution(entity).await
    } else if args.fix {
        orchestrator.fix_inspection(entity).await
    } else if let Some(phase) = args.allow {
        orchestrator.set_permission(entity, phase, PhasePermission::Run).await
    } else if let Some(phase) = args.hold {
        orchestrator.set_permission(entity, phase, PhasePermission::Pause).await
    } else {
        orchestrator.start_auto_execution(entity, args.permissions()).await
    }
    .map_err(ExitError::from)?;

    let follow = !args.status && !args.detach && session.status == AutoExecutionStatus::Running;
    let session = if follow { follow_session(&mut events, session, app.format).await? } else { session };

    match app.format {
        OutputFormat::Text => print!("{}", output::render_session(&session)),
        OutputFormat::Json => output::format_or_json(app.format, &session, || {})?,
    }
    Ok(())
}

/// Print transitions until the session stops running or the user detaches.
async fn follow_session(
    events: &mut Subscription,
    mut session: AutoExecutionSession,
    format: OutputFormat,
) -> Result<AutoExecutionSession> {
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    while session.status == AutoExecutionStatus::Running {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { anyhow::bail!("event bus closed") };
                let Event::AutoExecutionStatusChanged { session: update } = &event else { continue };
                if update.entity != session.entity {
                    continue;
                }
                if format == OutputFormat::Text {
                    if let Some(line) = describe_event(&event) {
                        eprintln!("{line}");
                    }
                }
                session = (**update).clone();
            }
            _ = &mut ctrl_c => {
                eprintln!("detached; auto-execution for {} continues on the next sdd invocation", session.entity);
                break;
            }
        }
    }
    Ok(session)
}
