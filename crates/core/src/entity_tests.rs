// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    bare = { "auth-flow", EntityId::spec("auth-flow") },
    spec = { "specs/auth-flow", EntityId::spec("auth-flow") },
    singular_spec = { "spec/auth-flow", EntityId::spec("auth-flow") },
    bug = { "bugs/crash-on-start", EntityId::bug("crash-on-start") },
)]
fn parses_entity_ids(input: &str, expected: EntityId) {
    assert_eq!(input.parse::<EntityId>().unwrap(), expected);
}

#[parameterized(
    unknown_kind = { "tasks/x" },
    empty_name = { "specs/" },
    traversal = { "specs/.." },
    nested = { "specs/a/b" },
)]
fn rejects_bad_entity_ids(input: &str) {
    assert!(input.parse::<EntityId>().is_err());
}

#[test]
fn display_round_trips_through_from_str() {
    let id = EntityId::bug("login");
    assert_eq!(id.to_string(), "bugs/login");
    assert_eq!(id.to_string().parse::<EntityId>().unwrap(), id);
}

#[test]
fn metadata_file_per_kind() {
    assert_eq!(EntityKind::Specs.metadata_file(), "spec.json");
    assert_eq!(EntityKind::Bugs.metadata_file(), "bug.json");
}
