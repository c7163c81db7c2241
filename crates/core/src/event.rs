// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Events published to collaborators (transport, log sink, orchestrator).
//!
//! Serializes with `{"type": "agent:output", ...fields}` format so a
//! transport can forward them without knowing the Rust types.

use crate::agent::{AgentId, AgentStatus, OutputStream};
use crate::auto_exec::AutoExecutionSession;
use crate::connection::ConnectionStatus;
use crate::entity::{EntityId, EntityKind};
use crate::phase::Phase;
use crate::target::SshTarget;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    /// One chunk of agent output, in emission order per agent.
    #[serde(rename = "agent:output")]
    AgentOutput { agent_id: AgentId, stream: OutputStream, chunk: String, at_ms: u64 },

    #[serde(rename = "agent:status")]
    AgentStatusChanged {
        agent_id: AgentId,
        entity: EntityId,
        phase: Phase,
        status: AgentStatus,
        #[serde(default)]
        exit_code: Option<i32>,
    },

    #[serde(rename = "agent:possibly_hung")]
    AgentPossiblyHung { agent_id: AgentId, entity: EntityId, phase: Phase, idle_ms: u64 },

    #[serde(rename = "agent:hang_cleared")]
    AgentHangCleared { agent_id: AgentId },

    /// A phase artifact was recorded as generated in the entity metadata.
    #[serde(rename = "phase:generated")]
    PhaseGenerated { entity: EntityId, phase: Phase },

    #[serde(rename = "auto:status")]
    AutoExecutionStatusChanged { session: Box<AutoExecutionSession> },

    #[serde(rename = "connection:status")]
    ConnectionStatusChanged { target: SshTarget, status: ConnectionStatus, attempt: u32 },

    #[serde(rename = "entities:changed")]
    EntitiesChanged {
        kind: EntityKind,
        #[serde(default)]
        added: Vec<String>,
        #[serde(default)]
        removed: Vec<String>,
        #[serde(default)]
        changed: Vec<String>,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::AgentOutput { .. } => "agent:output",
            Event::AgentStatusChanged { .. } => "agent:status",
            Event::AgentPossiblyHung { .. } => "agent:possibly_hung",
            Event::AgentHangCleared { .. } => "agent:hang_cleared",
            Event::PhaseGenerated { .. } => "phase:generated",
            Event::AutoExecutionStatusChanged { .. } => "auto:status",
            Event::ConnectionStatusChanged { .. } => "connection:status",
            Event::EntitiesChanged { .. } => "entities:changed",
        }
    }

    /// Agent this event concerns, if any
    pub fn agent_id(&self) -> Option<&AgentId> {
        match self {
            Event::AgentOutput { agent_id, .. }
            | Event::AgentStatusChanged { agent_id, .. }
            | Event::AgentPossiblyHung { agent_id, .. }
            | Event::AgentHangCleared { agent_id } => Some(agent_id),
            _ => None,
        }
    }

    /// One-line summary for logs
    pub fn log_summary(&self) -> String {
        match self {
            Event::AgentOutput { agent_id, stream, chunk, .. } => {
                format!("{} agent={} stream={} bytes={}", self.name(), agent_id, stream, chunk.len())
            }
            Event::AgentStatusChanged { agent_id, entity, phase, status, .. } => {
                format!("{} agent={} entity={} phase={} status={}", self.name(), agent_id, entity, phase, status)
            }
            Event::AgentPossiblyHung { agent_id, idle_ms, .. } => {
                format!("{} agent={} idle_ms={}", self.name(), agent_id, idle_ms)
            }
            Event::AgentHangCleared { agent_id } => format!("{} agent={}", self.name(), agent_id),
            Event::PhaseGenerated { entity, phase } => {
                format!("{} entity={} phase={}", self.name(), entity, phase)
            }
            Event::AutoExecutionStatusChanged { session } => {
                format!("{} entity={} status={}", self.name(), session.entity, session.status)
            }
            Event::ConnectionStatusChanged { target, status, attempt } => {
                format!("{} target={} status={} attempt={}", self.name(), target, status, attempt)
            }
            Event::EntitiesChanged { kind, added, removed, changed } => format!(
                "{} kind={} added={} removed={} changed={}",
                self.name(),
                kind,
                added.len(),
                removed.len(),
                changed.len()
            ),
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
