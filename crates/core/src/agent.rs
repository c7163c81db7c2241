// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent identifier, status and handle types.
//!
//! An agent is one supervised external process performing one phase for one
//! entity. The handle is the in-memory view; the durable mirror lives in the
//! storage crate's PID records.

use crate::entity::EntityId;
use crate::phase::{Phase, PhaseGroup};
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for a supervised agent.
    ///
    /// Stable across `resume`: a resumed agent keeps its id.
    pub struct AgentId("agt-");
}

/// Lifecycle status of a supervised agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Running,
    Completed,
    Failed,
    /// Stopped, crashed while we were down, or lost its transport.
    /// Distinct from `Failed` so callers can offer resume.
    Interrupted,
}

crate::simple_display! {
    AgentStatus {
        Running => "running",
        Completed => "completed",
        Failed => "failed",
        Interrupted => "interrupted",
    }
}

impl AgentStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AgentStatus::Running)
    }

    /// Map a process exit to a status. A requested stop wins over the exit code.
    pub fn from_exit(exit_code: Option<i32>, stop_requested: bool) -> Self {
        if stop_requested {
            return AgentStatus::Interrupted;
        }
        match exit_code {
            Some(0) => AgentStatus::Completed,
            Some(_) => AgentStatus::Failed,
            // Killed by a signal nobody asked for
            None => AgentStatus::Interrupted,
        }
    }
}

/// Output stream of an agent process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

crate::simple_display! {
    OutputStream {
        Stdout => "stdout",
        Stderr => "stderr",
    }
}

/// Snapshot of one supervised agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentHandle {
    pub agent_id: AgentId,
    pub entity: EntityId,
    pub phase: Phase,
    pub group: PhaseGroup,
    /// OS pid; meaningless once the agent is terminal.
    #[serde(default)]
    pub pid: Option<u32>,
    /// Resumption token reported by the agent CLI.
    #[serde(default)]
    pub session_id: Option<String>,
    pub status: AgentStatus,
    pub started_at_ms: u64,
    pub last_activity_at_ms: u64,
    #[serde(default)]
    pub exit_code: Option<i32>,
    /// Set by hang detection, cleared by the next output chunk.
    #[serde(default)]
    pub hang_suspected: bool,
}

impl AgentHandle {
    pub fn is_running(&self) -> bool {
        self.status == AgentStatus::Running
    }

    pub fn idle_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.last_activity_at_ms)
    }

    /// Resumable once interrupted, if the CLI reported a session to continue.
    pub fn is_resumable(&self) -> bool {
        self.status == AgentStatus::Interrupted && self.session_id.is_some()
    }
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
