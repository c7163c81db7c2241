// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn serializes_with_type_tag() {
    let event = Event::AgentHangCleared { agent_id: AgentId::from_string("agt-x") };
    let json: serde_json::Value = serde_json::to_value(&event).unwrap();
    assert_eq!(json["type"], "agent:hang_cleared");
    assert_eq!(json["agent_id"], "agt-x");
}

#[test]
fn status_event_round_trips() {
    let event = Event::AgentStatusChanged {
        agent_id: AgentId::from_string("agt-1"),
        entity: EntityId::spec("auth"),
        phase: Phase::Impl,
        status: AgentStatus::Failed,
        exit_code: Some(2),
    };
    let json = serde_json::to_string(&event).unwrap();
    assert_eq!(serde_json::from_str::<Event>(&json).unwrap(), event);
    assert_eq!(event.name(), "agent:status");
}

#[test]
fn agent_id_only_for_agent_events() {
    let output = Event::AgentOutput {
        agent_id: AgentId::from_string("agt-2"),
        stream: OutputStream::Stderr,
        chunk: "oops".into(),
        at_ms: 1,
    };
    assert_eq!(output.agent_id().map(|a| a.as_str()), Some("agt-2"));

    let entities = Event::EntitiesChanged {
        kind: EntityKind::Bugs,
        added: vec!["a".into()],
        removed: vec![],
        changed: vec![],
    };
    assert!(entities.agent_id().is_none());
    assert!(entities.log_summary().contains("added=1"));
}

#[test]
fn phase_generated_names_entity_and_phase() {
    let event = Event::PhaseGenerated { entity: EntityId::bug("crash"), phase: Phase::Design };
    let json: serde_json::Value = serde_json::to_value(&event).unwrap();
    assert_eq!(json["type"], "phase:generated");
    assert_eq!(event.log_summary(), "phase:generated entity=bugs/crash phase=design");
}
