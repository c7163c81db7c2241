// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-agent output pump.

use super::{Inner, Termination};
use futures_util::future::BoxFuture;
use sdd_adapters::{ProcessReader, ProviderError};
use sdd_core::{AgentId, Clock, Event, OutputStream};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Forward output lines in order, then report the exit.
pub(super) fn spawn<C: Clock>(
    inner: Arc<Inner<C>>,
    agent_id: AgentId,
    run: u64,
    stdout: ProcessReader,
    stderr: ProcessReader,
    exit: BoxFuture<'static, Result<Option<i32>, ProviderError>>,
) {
    tokio::spawn(async move {
        let mut out = BufReader::new(stdout).lines();
        let mut err = BufReader::new(stderr).lines();
        let (mut out_open, mut err_open) = (true, true);

        while out_open || err_open {
            tokio::select! {
                line = out.next_line(), if out_open => match line {
                    Ok(Some(line)) => inner.on_output(&agent_id, run, OutputStream::Stdout, line).await,
                    Ok(None) => out_open = false,
                    Err(e) => {
                        tracing::warn!(agent_id = %agent_id, error = %e, "stdout read failed");
                        out_open = false;
                    }
                },
                line = err.next_line(), if err_open => match line {
                    Ok(Some(line)) => inner.on_output(&agent_id, run, OutputStream::Stderr, line).await,
                    Ok(None) => err_open = false,
                    Err(e) => {
                        tracing::warn!(agent_id = %agent_id, error = %e, "stderr read failed");
                        err_open = false;
                    }
                },
            }
        }

        let termination = match exit.await {
            Ok(code) => Termination::Exited(code),
            Err(e) => Termination::Lost(e.to_string()),
        };
        inner.conclude(&agent_id, Some(run), termination).await;
    });
}

/// The top-level `session_id` of a stream-json line, if any.
pub(crate) fn parse_session_id(line: &str) -> Option<String> {
    if !line.trim_start().starts_with('{') {
        return None;
    }
    let value: serde_json::Value = serde_json::from_str(line).ok()?;
    value.get("session_id")?.as_str().filter(|s| !s.is_empty()).map(str::to_string)
}

impl<C: Clock> Inner<C> {
    async fn on_output(&self, agent_id: &AgentId, run: u64, stream: OutputStream, line: String) {
        let now = self.clock.epoch_ms();
        let session_id = match stream {
            OutputStream::Stdout => parse_session_id(&line),
            OutputStream::Stderr => None,
        };
        let persist_every = duration_ms(self.config.persist_interval);

        let (hang_cleared, staged) = {
            let mut agents = self.agents.lock();
            let Some(entry) = agents.get_mut(agent_id).filter(|e| e.run == run) else {
                return;
            };
            entry.handle.last_activity_at_ms = now;
            let cleared = std::mem::take(&mut entry.handle.hang_suspected);

            let mut dirty = cleared;
            if let Some(session_id) = session_id {
                if entry.handle.session_id.as_deref() != Some(session_id.as_str()) {
                    tracing::info!(agent_id = %agent_id, session_id = %session_id, "agent session recorded");
                    entry.handle.session_id = Some(session_id);
                    dirty = true;
                }
            }
            let staged = (dirty || now.saturating_sub(entry.last_persist_ms) >= persist_every)
                .then(|| self.stage(entry, now));
            (cleared, staged)
        };
        if let Some(staged) = staged {
            self.persist(staged);
        }

        // Output wins over a pending hang flag
        if hang_cleared {
            tracing::info!(agent_id = %agent_id, "output resumed, hang flag cleared");
            self.bus.publish(Event::AgentHangCleared { agent_id: agent_id.clone() }).await;
        }

        let mut chunk = line;
        chunk.push('\n');
        self.bus
            .publish(Event::AgentOutput { agent_id: agent_id.clone(), stream, chunk, at_ms: now })
            .await;
    }
}

pub(crate) fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
