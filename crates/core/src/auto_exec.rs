// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Auto-execution session: the resumable per-entity cursor through the
//! phase sequence, with document-review and inspection round history.

use crate::agent::AgentId;
use crate::entity::EntityId;
use crate::phase::{Permissions, Phase};
use serde::{Deserialize, Serialize};

/// Status of an auto-execution session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoExecutionStatus {
    #[default]
    Idle,
    Running,
    Paused,
    Stopped,
    Error,
}

crate::simple_display! {
    AutoExecutionStatus {
        Idle => "idle",
        Running => "running",
        Paused => "paused",
        Stopped => "stopped",
        Error => "error",
    }
}

impl AutoExecutionStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, AutoExecutionStatus::Running | AutoExecutionStatus::Paused)
    }
}

/// How a finished session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoExecutionOutcome {
    Completed,
    Stopped,
    Failed,
}

/// What the awaited agent is doing for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "round", rename_all = "snake_case")]
pub enum WorkKind {
    /// Generating a phase artifact
    Phase,
    /// Document-review round `n`
    ReviewRound(u32),
    /// Inspection round `n`
    InspectionRound(u32),
    /// Fix pass after the NOGO inspection round `n`
    InspectionFix(u32),
}

/// Agent the session is waiting on. Persisted so a restart can rebind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwaitingAgent {
    pub agent_id: AgentId,
    pub phase: Phase,
    pub work: WorkKind,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    #[default]
    NotStarted,
    InProgress,
    Approved,
    Failed,
}

crate::simple_display! {
    ReviewStatus {
        NotStarted => "not_started",
        InProgress => "in_progress",
        Approved => "approved",
        Failed => "failed",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewRound {
    pub round: u32,
    /// Number of issues the reviewer asked to fix; zero approves.
    pub fix_required: u32,
    pub completed_at_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentReviewState {
    pub status: ReviewStatus,
    #[serde(default)]
    pub rounds: Vec<ReviewRound>,
}

impl DocumentReviewState {
    /// 1-based number of the next round.
    pub fn next_round(&self) -> u32 {
        self.rounds.len() as u32 + 1
    }

    /// Append a completed round; a round with nothing to fix approves the documents.
    pub fn record_round(&mut self, round: u32, fix_required: u32, at_ms: u64) {
        self.rounds.push(ReviewRound { round, fix_required, completed_at_ms: at_ms });
        self.status =
            if fix_required == 0 { ReviewStatus::Approved } else { ReviewStatus::InProgress };
    }

    pub fn is_approved(&self) -> bool {
        self.status == ReviewStatus::Approved
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InspectionVerdict {
    Go,
    NoGo,
}

crate::simple_display! {
    InspectionVerdict {
        Go => "GO",
        NoGo => "NOGO",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectionRound {
    pub round: u32,
    pub verdict: InspectionVerdict,
    pub inspected_at_ms: u64,
    #[serde(default)]
    pub fixed_at_ms: Option<u64>,
}

/// Append-only inspection history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectionState {
    #[serde(default)]
    pub rounds: Vec<InspectionRound>,
}

impl InspectionState {
    pub fn next_round(&self) -> u32 {
        self.rounds.len() as u32 + 1
    }

    pub fn latest(&self) -> Option<&InspectionRound> {
        self.rounds.last()
    }

    pub fn record(&mut self, round: u32, verdict: InspectionVerdict, at_ms: u64) {
        self.rounds.push(InspectionRound { round, verdict, inspected_at_ms: at_ms, fixed_at_ms: None });
    }

    /// Latest round is NOGO and has not been fixed.
    pub fn blocking_round(&self) -> Option<u32> {
        self.latest()
            .filter(|r| r.verdict == InspectionVerdict::NoGo && r.fixed_at_ms.is_none())
            .map(|r| r.round)
    }

    /// Latest round passed.
    pub fn passed(&self) -> bool {
        self.latest().is_some_and(|r| r.verdict == InspectionVerdict::Go)
    }

    /// Record the fix for the blocking round. Returns the fixed round number.
    pub fn mark_fixed(&mut self, at_ms: u64) -> Option<u32> {
        let blocking = self.blocking_round()?;
        let round = self.rounds.last_mut()?;
        round.fixed_at_ms = Some(at_ms);
        Some(blocking)
    }
}

/// Per-entity auto-execution cursor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoExecutionSession {
    pub entity: EntityId,
    pub status: AutoExecutionStatus,
    #[serde(default)]
    pub current_phase: Option<Phase>,
    #[serde(default)]
    pub executed_phases: Vec<Phase>,
    #[serde(default)]
    pub permissions: Permissions,
    #[serde(default)]
    pub document_review: DocumentReviewState,
    #[serde(default)]
    pub inspection: InspectionState,
    #[serde(default)]
    pub awaiting: Option<AwaitingAgent>,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub outcome: Option<AutoExecutionOutcome>,
    pub updated_at_ms: u64,
}

impl AutoExecutionSession {
    /// Idle session for an entity that has never run.
    pub fn idle(entity: EntityId) -> Self {
        Self {
            entity,
            status: AutoExecutionStatus::Idle,
            current_phase: None,
            executed_phases: Vec::new(),
            permissions: Permissions::default(),
            document_review: DocumentReviewState::default(),
            inspection: InspectionState::default(),
            awaiting: None,
            last_error: None,
            outcome: None,
            updated_at_ms: 0,
        }
    }

    /// Fresh running session.
    pub fn start(entity: EntityId, permissions: Permissions, now_ms: u64) -> Self {
        Self {
            status: AutoExecutionStatus::Running,
            permissions,
            updated_at_ms: now_ms,
            ..Self::idle(entity)
        }
    }

    pub fn record_executed(&mut self, phase: Phase) {
        if !self.executed_phases.contains(&phase) {
            self.executed_phases.push(phase);
        }
    }

    pub fn pause(&mut self, now_ms: u64) {
        self.status = AutoExecutionStatus::Paused;
        self.awaiting = None;
        self.updated_at_ms = now_ms;
    }

    pub fn fail(&mut self, message: impl Into<String>, now_ms: u64) {
        self.status = AutoExecutionStatus::Error;
        self.last_error = Some(message.into());
        self.awaiting = None;
        self.outcome = Some(AutoExecutionOutcome::Failed);
        self.updated_at_ms = now_ms;
    }

    pub fn finish(&mut self, outcome: AutoExecutionOutcome, now_ms: u64) {
        self.status = match outcome {
            AutoExecutionOutcome::Completed => AutoExecutionStatus::Idle,
            AutoExecutionOutcome::Stopped => AutoExecutionStatus::Stopped,
            AutoExecutionOutcome::Failed => AutoExecutionStatus::Error,
        };
        self.outcome = Some(outcome);
        self.awaiting = None;
        self.current_phase = None;
        self.updated_at_ms = now_ms;
    }
}

#[cfg(test)]
#[path = "auto_exec_tests.rs"]
mod tests;
