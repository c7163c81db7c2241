// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use sdd_adapters::FakeFileSystem;
use std::path::Path;

const SPEC: &str = r#"{
  "feature_name": "auth",
  "language": "en",
  "approvals": {
    "requirements": { "generated": true, "approved": true },
    "design": { "generated": true, "approved": false, "note": "keep me" }
  },
  "worktree": { "path": "/p/.kiro/worktrees/specs/auth", "branch": "feature/auth", "createdAt": "2026-01-02T03:04:05Z" }
}"#;

fn store(fs: &FakeFileSystem) -> FsMetadataStore {
    FsMetadataStore::new(Arc::new(fs.clone()), "/p")
}

#[tokio::test]
async fn reads_phase_states_and_worktree() {
    let fs = FakeFileSystem::new();
    fs.insert("/p/.kiro/specs/auth/spec.json", SPEC);
    let store = store(&fs);
    let auth = EntityId::spec("auth");

    let states = store.read_phase_state(&auth).await.unwrap();
    assert_eq!(states.get(Phase::Requirements), PhaseState::Approved);
    assert_eq!(states.get(Phase::Design), PhaseState::Generated);
    assert_eq!(states.get(Phase::Tasks), PhaseState::Pending);

    let worktree = store.read_worktree_config(&auth).await.unwrap().unwrap();
    assert_eq!(worktree.branch, "feature/auth");
    assert_eq!(worktree.path, Path::new("/p/.kiro/worktrees/specs/auth"));
}

#[tokio::test]
async fn writes_preserve_unknown_fields() {
    let fs = FakeFileSystem::new();
    fs.insert("/p/.kiro/specs/auth/spec.json", SPEC);
    let store = store(&fs);
    let auth = EntityId::spec("auth");

    store.write_approval(&auth, Phase::Design, true).await.unwrap();
    store.mark_generated(&auth, Phase::Tasks).await.unwrap();

    let states = store.read_phase_state(&auth).await.unwrap();
    assert_eq!(states.get(Phase::Design), PhaseState::Approved);
    assert_eq!(states.get(Phase::Tasks), PhaseState::Generated);

    let doc: Value = serde_json::from_str(&fs.get("/p/.kiro/specs/auth/spec.json").unwrap()).unwrap();
    assert_eq!(doc["language"], "en");
    assert_eq!(doc["approvals"]["design"]["note"], "keep me");
    assert_eq!(doc["worktree"]["branch"], "feature/auth");
}

#[tokio::test]
async fn regenerating_resets_approval() {
    let fs = FakeFileSystem::new();
    fs.insert("/p/.kiro/specs/auth/spec.json", SPEC);
    let store = store(&fs);
    let auth = EntityId::spec("auth");

    store.mark_generated(&auth, Phase::Requirements).await.unwrap();
    let states = store.read_phase_state(&auth).await.unwrap();
    assert_eq!(states.get(Phase::Requirements), PhaseState::Generated);
}

#[tokio::test]
async fn bugs_use_bug_json_and_missing_worktree_is_none() {
    let fs = FakeFileSystem::new();
    fs.insert("/p/.kiro/bugs/crash/bug.json", "{}");
    let store = store(&fs);
    let crash = EntityId::bug("crash");

    assert_eq!(store.read_phase_state(&crash).await.unwrap(), PhaseStates::default());
    assert!(store.read_worktree_config(&crash).await.unwrap().is_none());
}

#[tokio::test]
async fn missing_and_malformed_files() {
    let fs = FakeFileSystem::new();
    fs.insert("/p/.kiro/specs/bad/spec.json", "[1, 2]");
    let store = store(&fs);

    let err = store.read_phase_state(&EntityId::spec("none")).await.unwrap_err();
    assert!(matches!(err, MetadataError::NotFound(_)));
    let err = store.mark_generated(&EntityId::spec("bad"), Phase::Design).await.unwrap_err();
    assert!(matches!(err, MetadataError::Malformed { .. }));
}

#[tokio::test]
async fn fake_records_approvals() {
    let fake = FakeMetadataStore::new();
    let auth = EntityId::spec("auth");
    fake.mark_generated(&auth, Phase::Requirements).await.unwrap();
    fake.write_approval(&auth, Phase::Requirements, true).await.unwrap();
    assert_eq!(fake.state(&auth, Phase::Requirements), PhaseState::Approved);
    assert_eq!(fake.approvals(), vec![(auth, Phase::Requirements, true)]);
}
