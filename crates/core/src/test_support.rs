// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers for use across crates.
//!
//! Gated behind `#[cfg(any(test, feature = "test-support"))]`.

use crate::{AgentHandle, AgentId, AgentStatus, EntityId, Phase};

// ── Proptest strategies ─────────────────────────────────────────────────

pub mod strategies {
    use crate::entity::EntityKind;
    use crate::phase::Phase;
    use proptest::prelude::*;

    pub fn arb_phase() -> impl Strategy<Value = Phase> {
        proptest::sample::select(Phase::ALL.to_vec())
    }

    pub fn arb_entity_kind() -> impl Strategy<Value = EntityKind> {
        prop_oneof![Just(EntityKind::Specs), Just(EntityKind::Bugs)]
    }

    /// Valid entity names as users write them
    pub fn arb_entity_name() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9-]{0,20}"
    }
}

// ── Fixtures ────────────────────────────────────────────────────────────

/// A running handle with fixed timestamps.
pub fn running_handle(entity: &str, phase: Phase, pid: u32) -> AgentHandle {
    AgentHandle {
        agent_id: AgentId::new(),
        entity: EntityId::spec(entity),
        phase,
        group: phase.group(),
        pid: Some(pid),
        session_id: None,
        status: AgentStatus::Running,
        started_at_ms: 1_000_000,
        last_activity_at_ms: 1_000_000,
        exit_code: None,
        hang_suspected: false,
    }
}
