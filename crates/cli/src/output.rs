// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::color;
use clap::ValueEnum;
use sdd_core::{AgentHandle, AutoExecutionSession, Event};
use serde::Serialize;
use std::fmt::Write as _;

#[derive(Clone, Copy, Debug, Default, PartialEq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or_default()
}

/// Compact elapsed time: "5s", "2m", "1h", "3d"
pub fn format_elapsed(secs: u64) -> String {
    match secs {
        s if s < 60 => format!("{s}s"),
        s if s < 3600 => format!("{}m", s / 60),
        s if s < 86_400 => format!("{}h", s / 3600),
        s => format!("{}d", s / 86_400),
    }
}

/// Relative time since `epoch_ms`, or "-" when unset.
pub fn format_time_ago(epoch_ms: u64, now_ms: u64) -> String {
    if epoch_ms == 0 {
        return "-".to_string();
    }
    format_elapsed(now_ms.saturating_sub(epoch_ms) / 1000)
}

/// Print `value` as pretty JSON, or run `text` for the human form.
pub fn format_or_json<T: Serialize>(
    format: OutputFormat,
    value: &T,
    text: impl FnOnce(),
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Text => text(),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
    }
    Ok(())
}

fn pad(cell: &str, width: usize) -> String {
    format!("{cell:<width$}")
}

/// Agent table, newest first. Status cells are colored after padding so
/// escape codes do not skew the columns.
pub fn render_agents(agents: &[AgentHandle], now_ms: u64) -> String {
    if agents.is_empty() {
        return "No agents\n".to_string();
    }
    let mut sorted: Vec<&AgentHandle> = agents.iter().collect();
    sorted.sort_by(|a, b| b.started_at_ms.cmp(&a.started_at_ms));

    let headers = ["ID", "ENTITY", "PHASE", "STATUS", "PID", "ACTIVE"];
    let rows: Vec<[String; 6]> = sorted
        .iter()
        .map(|a| {
            let status = if a.hang_suspected { format!("{} (hung?)", a.status) } else { a.status.to_string() };
            [
                a.agent_id.to_string(),
                a.entity.to_string(),
                a.phase.to_string(),
                status,
                a.pid.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string()),
                format_time_ago(a.last_activity_at_ms, now_ms),
            ]
        })
        .collect();

    let mut widths = headers.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let mut out = String::new();
    let header_line: Vec<String> = headers.iter().zip(widths).map(|(h, w)| pad(h, w)).collect();
    let _ = writeln!(out, "{}", color::header(header_line.join("  ").trim_end()));
    for (row, agent) in rows.iter().zip(&sorted) {
        let mut cells: Vec<String> = row.iter().zip(widths).map(|(c, w)| pad(c, w)).collect();
        cells[0] = color::muted(&cells[0]);
        cells[3] = cells[3].replacen(&agent.status.to_string(), &color::agent_status(agent.status), 1);
        let _ = writeln!(out, "{}", cells.join("  ").trim_end());
    }
    out
}

pub fn render_session(session: &AutoExecutionSession) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} {}", color::header("Entity:"), session.entity);
    let _ = writeln!(out, "{} {}", color::header("Status:"), color::session_status(session.status));
    if let Some(phase) = session.current_phase {
        let _ = writeln!(out, "{} {}", color::header("Phase:"), phase);
    }
    if !session.executed_phases.is_empty() {
        let executed: Vec<String> = session.executed_phases.iter().map(|p| p.to_string()).collect();
        let _ = writeln!(out, "{} {}", color::header("Executed:"), executed.join(", "));
    }
    if let Some(awaiting) = &session.awaiting {
        let _ = writeln!(out, "{} {} ({})", color::header("Agent:"), awaiting.agent_id, awaiting.phase);
    }
    if !session.document_review.rounds.is_empty() {
        let _ = writeln!(
            out,
            "{} {} after {} round(s)",
            color::header("Review:"),
            session.document_review.status,
            session.document_review.rounds.len()
        );
    }
    if let Some(latest) = session.inspection.latest() {
        let fixed = if latest.fixed_at_ms.is_some() { ", fixed" } else { "" };
        let _ = writeln!(out, "{} round {} {}{}", color::header("Inspection:"), latest.round, latest.verdict, fixed);
    }
    if let Some(error) = &session.last_error {
        let _ = writeln!(out, "{} {}", color::header("Error:"), error);
    }
    out
}

/// One human-readable line per event, `None` for events not worth showing.
pub fn describe_event(event: &Event) -> Option<String> {
    match event {
        Event::AgentStatusChanged { agent_id, status, .. } => {
            Some(format!("agent {} {}", color::muted(agent_id.as_str()), color::agent_status(*status)))
        }
        Event::AgentPossiblyHung { agent_id, idle_ms, .. } => Some(format!(
            "agent {} has been silent for {}",
            color::muted(agent_id.as_str()),
            format_elapsed(idle_ms / 1000)
        )),
        Event::AgentHangCleared { agent_id, .. } => {
            Some(format!("agent {} is producing output again", color::muted(agent_id.as_str())))
        }
        Event::PhaseGenerated { entity, phase } => Some(format!("{entity} {phase} generated")),
        Event::AutoExecutionStatusChanged { session } => {
            let phase = session.current_phase.map(|p| format!(" at {p}")).unwrap_or_default();
            Some(format!("{} auto-execution {}{}", session.entity, color::session_status(session.status), phase))
        }
        Event::ConnectionStatusChanged { target, status, attempt } => {
            Some(format!("{target} {status} (attempt {attempt})"))
        }
        Event::EntitiesChanged { kind, added, removed, changed } => {
            let mut parts = Vec::new();
            for (label, names) in [("added", added), ("removed", removed), ("changed", changed)] {
                if !names.is_empty() {
                    parts.push(format!("{label} {}", names.join(", ")));
                }
            }
            Some(format!("{kind}: {}", parts.join("; ")))
        }
        Event::AgentOutput { .. } => None,
    }
}

#[cfg(test)]
#[path = "output_tests.rs"]
mod tests;
