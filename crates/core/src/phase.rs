// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workflow phases, exclusion groups, phase state and run permissions.
//!
//! Phases run in a fixed topological order:
//!
//! ```text
//! requirements → design → tasks → document-review → impl → inspection → deploy
//! ```
//!
//! `impl` depends structurally on `tasks` only; document review is a gate the
//! orchestrator runs in between, not an input to implementation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use thiserror::Error;

/// A named workflow step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Requirements,
    Design,
    Tasks,
    DocumentReview,
    Impl,
    Inspection,
    Deploy,
}

impl Phase {
    /// All phases in execution order
    pub const ALL: [Phase; 7] = [
        Phase::Requirements,
        Phase::Design,
        Phase::Tasks,
        Phase::DocumentReview,
        Phase::Impl,
        Phase::Inspection,
        Phase::Deploy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Requirements => "requirements",
            Phase::Design => "design",
            Phase::Tasks => "tasks",
            Phase::DocumentReview => "document-review",
            Phase::Impl => "impl",
            Phase::Inspection => "inspection",
            Phase::Deploy => "deploy",
        }
    }

    pub fn group(&self) -> PhaseGroup {
        match self {
            Phase::Requirements | Phase::Design | Phase::Tasks | Phase::DocumentReview => {
                PhaseGroup::Doc
            }
            Phase::Impl | Phase::Deploy => PhaseGroup::Impl,
            Phase::Inspection => PhaseGroup::Validate,
        }
    }

    /// The phase whose artifact this phase structurally consumes.
    pub fn upstream(&self) -> Option<Phase> {
        match self {
            Phase::Requirements => None,
            Phase::Design => Some(Phase::Requirements),
            Phase::Tasks => Some(Phase::Design),
            Phase::DocumentReview | Phase::Impl => Some(Phase::Tasks),
            Phase::Inspection => Some(Phase::Impl),
            Phase::Deploy => Some(Phase::Inspection),
        }
    }

    /// Document phases need a human (or auto-execution) approval before the
    /// next phase may consume them.
    pub fn requires_approval(&self) -> bool {
        matches!(self, Phase::Requirements | Phase::Design | Phase::Tasks)
    }

    pub fn next(&self) -> Option<Phase> {
        let idx = Phase::ALL.iter().position(|p| p == self)?;
        Phase::ALL.get(idx + 1).copied()
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown phase: {0}")]
pub struct UnknownPhase(pub String);

impl FromStr for Phase {
    type Err = UnknownPhase;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Phase::ALL
            .into_iter()
            .find(|p| p.as_str() == s || (s == "document_review" && *p == Phase::DocumentReview))
            .ok_or_else(|| UnknownPhase(s.to_string()))
    }
}

/// Mutual-exclusion group of a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseGroup {
    /// Document phases: distinct doc phases may run side by side
    Doc,
    /// Implementation and deploy
    Impl,
    /// Inspection
    Validate,
}

crate::simple_display! {
    PhaseGroup {
        Doc => "doc",
        Impl => "impl",
        Validate => "validate",
    }
}

impl PhaseGroup {
    /// Whether an agent in `self` blocks starting one in `other` for the same entity.
    pub fn excludes(&self, other: PhaseGroup) -> bool {
        match (self, other) {
            (PhaseGroup::Doc, _) | (_, PhaseGroup::Doc) => false,
            (PhaseGroup::Impl | PhaseGroup::Validate, PhaseGroup::Impl | PhaseGroup::Validate) => {
                true
            }
        }
    }
}

/// Exclusion rule for two agents of the same entity.
///
/// The same phase never runs twice at once; otherwise the groups decide.
pub fn conflicts(running: (Phase, PhaseGroup), requested: (Phase, PhaseGroup)) -> bool {
    running.0 == requested.0 || running.1.excludes(requested.1)
}

/// Artifact state of one phase of one entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseState {
    #[default]
    Pending,
    Generated,
    Approved,
}

crate::simple_display! {
    PhaseState {
        Pending => "pending",
        Generated => "generated",
        Approved => "approved",
    }
}

impl PhaseState {
    pub fn is_generated(&self) -> bool {
        matches!(self, PhaseState::Generated | PhaseState::Approved)
    }
}

/// Per-phase state of one entity; absent phases are `Pending`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhaseStates(BTreeMap<Phase, PhaseState>);

impl PhaseStates {
    pub fn get(&self, phase: Phase) -> PhaseState {
        self.0.get(&phase).copied().unwrap_or_default()
    }

    pub fn set(&mut self, phase: Phase, state: PhaseState) {
        self.0.insert(phase, state);
    }

    pub fn with(mut self, phase: Phase, state: PhaseState) -> Self {
        self.set(phase, state);
        self
    }

    /// First phase in execution order that has not produced its artifact.
    pub fn first_pending(&self) -> Option<Phase> {
        Phase::ALL.into_iter().find(|p| !self.get(*p).is_generated())
    }

    /// Whether every structural upstream phase of `phase` has been generated.
    pub fn upstream_ready(&self, phase: Phase) -> bool {
        phase.upstream().map(|up| self.get(up).is_generated()).unwrap_or(true)
    }
}

/// Whether auto-execution may enter a phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhasePermission {
    Run,
    #[default]
    Pause,
}

crate::simple_display! {
    PhasePermission {
        Run => "run",
        Pause => "pause",
    }
}

/// Independently toggleable permission per phase; absent phases are `Pause`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permissions(BTreeMap<Phase, PhasePermission>);

impl Permissions {
    /// Every phase set to `Run`
    pub fn all_run() -> Self {
        Self(Phase::ALL.into_iter().map(|p| (p, PhasePermission::Run)).collect())
    }

    /// `Run` for the listed phases, `Pause` for the rest
    pub fn running(phases: &[Phase]) -> Self {
        Self(phases.iter().map(|p| (*p, PhasePermission::Run)).collect())
    }

    pub fn get(&self, phase: Phase) -> PhasePermission {
        self.0.get(&phase).copied().unwrap_or_default()
    }

    pub fn set(&mut self, phase: Phase, permission: PhasePermission) {
        self.0.insert(phase, permission);
    }

    pub fn allows(&self, phase: Phase) -> bool {
        self.get(phase) == PhasePermission::Run
    }
}

#[cfg(test)]
#[path = "phase_tests.rs"]
mod tests;
