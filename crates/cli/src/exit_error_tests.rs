// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use sdd_core::{AgentId, EntityId, Phase};
use yare::parameterized;

#[parameterized(
    already_running = { ErrorCode::AlreadyRunning, 10 },
    not_resumable = { ErrorCode::NotResumable, 11 },
    conflict = { ErrorCode::ConflictUnresolved, 15 },
    storage = { ErrorCode::StorageError, 19 },
)]
fn codes_map_to_stable_exit_codes(code: ErrorCode, expected: i32) {
    assert_eq!(exit_code(code), expected);
}

#[test]
fn exit_codes_are_distinct_and_not_generic_failure() {
    let all = [
        ErrorCode::AlreadyRunning,
        ErrorCode::NotResumable,
        ErrorCode::CommandNotAllowed,
        ErrorCode::SpawnError,
        ErrorCode::ConnectionError,
        ErrorCode::ConflictUnresolved,
        ErrorCode::NotFound,
        ErrorCode::NotRunning,
        ErrorCode::InvalidState,
        ErrorCode::StorageError,
    ];
    let mut codes: Vec<i32> = all.iter().map(|c| exit_code(*c)).collect();
    codes.sort_unstable();
    codes.dedup();
    assert_eq!(codes.len(), all.len());
    assert!(!codes.contains(&EXIT_FAILURE));
}

#[test]
fn supervisor_errors_carry_their_code() {
    let err: ExitError = SupervisorError::NotFound(AgentId::from_string("agt-x")).into();
    assert_eq!(err.code, 16);
    assert_eq!(err.message, "NOT_FOUND: agent not found: agt-x");
}

#[test]
fn orchestrator_errors_carry_their_code() {
    let err: ExitError = OrchestratorError::NotGenerated { entity: EntityId::spec("auth"), phase: Phase::Design }.into();
    assert_eq!(err.code, 18);
    assert!(err.message.starts_with("INVALID_STATE: "));
}
