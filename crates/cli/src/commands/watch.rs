// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `sdd watch` - follow entity and agent changes until Ctrl-C

use crate::context::App;
use crate::exit_error::{ExitError, EXIT_FAILURE};
use crate::output::{describe_event, OutputFormat};
use anyhow::Result;
use clap::Args;
use sdd_core::{EntityKind, Event};
use sdd_engine::{ErrorCode, EntityWatcher};

#[derive(Args)]
pub struct WatchArgs {
    /// Entity kinds to watch (default: specs and bugs)
    #[arg(long = "kind", value_name = "KIND")]
    pub kinds: Vec<EntityKind>,
}

pub async fn handle(app: &App, args: WatchArgs) -> Result<()> {
    let kinds = if args.kinds.is_empty() { EntityKind::ALL.to_vec() } else { args.kinds };
    let fs = app
        .providers
        .resolve(app.root())
        .map_err(|e| ExitError::coded(ErrorCode::ConnectionError, e))?
        .fs;

    let mut events = app.bus.subscribe(|e| !matches!(e, Event::AgentOutput { .. }));
    let mut watchers = Vec::new();
    for kind in kinds {
        let watcher =
            EntityWatcher::start(fs.clone(), app.root().path(), kind, app.bus.clone(), app.config.watch_config())
                .await
                .map_err(|e| ExitError::new(EXIT_FAILURE, format!("watching {kind}: {e}")))?;
        if app.format == OutputFormat::Text {
            let worktrees = watcher.worktree_entities();
            eprintln!(
                "watching {} {kind} ({} in worktrees)",
                watcher.entities().len(),
                worktrees.len()
            );
        }
        watchers.push(watcher);
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                match app.format {
                    OutputFormat::Text => {
                        if let Some(line) = describe_event(&event) {
                            println!("{line}");
                        }
                    }
                    OutputFormat::Json => println!("{}", serde_json::to_string(&event)?),
                }
            }
            _ = &mut ctrl_c => break,
        }
    }
    drop(watchers);
    Ok(())
}
