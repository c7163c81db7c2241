// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sdd-core: data model for the spec-driven development supervisor

pub mod macros;

pub mod agent;
pub mod auto_exec;
pub mod clock;
pub mod connection;
pub mod entity;
pub mod event;
pub mod id;
pub mod phase;
pub mod target;
pub mod worktree;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use agent::{AgentHandle, AgentId, AgentStatus, OutputStream};
pub use auto_exec::{
    AutoExecutionOutcome, AutoExecutionSession, AutoExecutionStatus, AwaitingAgent,
    DocumentReviewState, InspectionRound, InspectionState, InspectionVerdict, ReviewRound,
    ReviewStatus, WorkKind,
};
pub use clock::{Clock, FakeClock, SystemClock};
pub use connection::ConnectionStatus;
pub use entity::{EntityId, EntityKind, EntityParseError};
pub use event::Event;
pub use phase::{
    conflicts, Permissions, Phase, PhaseGroup, PhasePermission, PhaseState, PhaseStates,
    UnknownPhase,
};
pub use target::{ExecutionTarget, ProjectRoot, ProjectRootError, SshTarget};
pub use worktree::WorktreeConfig;
