// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

fn handle(status: AgentStatus, session_id: Option<&str>) -> AgentHandle {
    AgentHandle {
        agent_id: AgentId::new(),
        entity: EntityId::spec("auth"),
        phase: Phase::Design,
        group: PhaseGroup::Doc,
        pid: Some(42),
        session_id: session_id.map(String::from),
        status,
        started_at_ms: 1_000,
        last_activity_at_ms: 2_000,
        exit_code: None,
        hang_suspected: false,
    }
}

#[parameterized(
    success = { Some(0), false, AgentStatus::Completed },
    nonzero = { Some(3), false, AgentStatus::Failed },
    signaled = { None, false, AgentStatus::Interrupted },
    stopped_success = { Some(0), true, AgentStatus::Interrupted },
    stopped_signal = { None, true, AgentStatus::Interrupted },
)]
fn status_from_exit(code: Option<i32>, stop_requested: bool, expected: AgentStatus) {
    assert_eq!(AgentStatus::from_exit(code, stop_requested), expected);
}

#[test]
fn only_interrupted_with_session_is_resumable() {
    assert!(handle(AgentStatus::Interrupted, Some("s1")).is_resumable());
    assert!(!handle(AgentStatus::Interrupted, None).is_resumable());
    assert!(!handle(AgentStatus::Running, Some("s1")).is_resumable());
    assert!(!handle(AgentStatus::Failed, Some("s1")).is_resumable());
}

#[test]
fn idle_saturates() {
    let h = handle(AgentStatus::Running, None);
    assert_eq!(h.idle_ms(5_000), 3_000);
    assert_eq!(h.idle_ms(0), 0);
}

#[test]
fn agent_id_has_prefix() {
    assert!(AgentId::new().as_str().starts_with("agt-"));
}

#[test]
fn status_serializes_snake_case() {
    assert_eq!(serde_json::to_string(&AgentStatus::Interrupted).unwrap(), "\"interrupted\"");
}
