// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Entity metadata (`spec.json` / `bug.json`).
//!
//! Only the fields the orchestrator needs are interpreted: per-phase
//! `approvals` and the optional `worktree` pointer. Everything else in the
//! file is preserved on write.

use async_trait::async_trait;
use sdd_adapters::{FileSystemProvider, ProviderError};
use sdd_core::worktree::build_main_entity_path;
use sdd_core::{EntityId, Phase, PhaseState, PhaseStates, WorktreeConfig};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("no metadata for {0}")]
    NotFound(EntityId),
    #[error("malformed metadata for {entity}: {message}")]
    Malformed { entity: EntityId, message: String },
    #[error(transparent)]
    Provider(ProviderError),
}

#[async_trait]
pub trait MetadataStore: Send + Sync + 'static {
    async fn read_phase_state(&self, entity: &EntityId) -> Result<PhaseStates, MetadataError>;

    /// Set or clear approval. Clearing leaves the phase generated.
    async fn write_approval(
        &self,
        entity: &EntityId,
        phase: Phase,
        approved: bool,
    ) -> Result<(), MetadataError>;

    /// Record a freshly generated artifact. Resets any prior approval.
    async fn mark_generated(&self, entity: &EntityId, phase: Phase) -> Result<(), MetadataError>;

    async fn read_worktree_config(
        &self,
        entity: &EntityId,
    ) -> Result<Option<WorktreeConfig>, MetadataError>;
}

/// Metadata files read and written through a project's filesystem provider.
pub struct FsMetadataStore {
    fs: Arc<dyn FileSystemProvider>,
    root: PathBuf,
}

impl FsMetadataStore {
    pub fn new(fs: Arc<dyn FileSystemProvider>, root: impl Into<PathBuf>) -> Self {
        Self { fs, root: root.into() }
    }

    pub fn path_for(&self, entity: &EntityId) -> PathBuf {
        build_main_entity_path(&self.root, entity.kind, &entity.name).join(entity.kind.metadata_file())
    }

    async fn load(&self, entity: &EntityId) -> Result<Map<String, Value>, MetadataError> {
        let text = match self.fs.read_to_string(&self.path_for(entity)).await {
            Ok(text) => text,
            Err(ProviderError::NotFound(_)) => return Err(MetadataError::NotFound(entity.clone())),
            Err(e) => return Err(MetadataError::Provider(e)),
        };
        match serde_json::from_str(&text) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(malformed(entity, "not a JSON object")),
            Err(e) => Err(malformed(entity, e)),
        }
    }

    async fn store(&self, entity: &EntityId, doc: Map<String, Value>) -> Result<(), MetadataError> {
        let mut bytes =
            serde_json::to_vec_pretty(&Value::Object(doc)).map_err(|e| malformed(entity, e))?;
        bytes.push(b'\n');
        self.fs.write(&self.path_for(entity), &bytes).await.map_err(MetadataError::Provider)
    }

    async fn update_approval(
        &self,
        entity: &EntityId,
        phase: Phase,
        generated: bool,
        approved: bool,
    ) -> Result<(), MetadataError> {
        let mut doc = self.load(entity).await?;
        let approvals = doc
            .entry("approvals")
            .or_insert_with(|| Value::Object(Map::new()));
        let Value::Object(approvals) = approvals else {
            return Err(malformed(entity, "approvals is not an object"));
        };
        let slot = approvals
            .entry(phase.as_str())
            .or_insert_with(|| Value::Object(Map::new()));
        let Value::Object(slot) = slot else {
            return Err(malformed(entity, format!("approvals.{phase} is not an object")));
        };
        slot.insert("generated".into(), Value::Bool(generated));
        slot.insert("approved".into(), Value::Bool(approved));
        self.store(entity, doc).await
    }
}

fn malformed(entity: &EntityId, message: impl ToString) -> MetadataError {
    MetadataError::Malformed { entity: entity.clone(), message: message.to_string() }
}

fn phase_state(slot: Option<&Value>) -> PhaseState {
    let flag = |key: &str| slot.and_then(|s| s.get(key)).and_then(Value::as_bool).unwrap_or(false);
    if flag("approved") {
        PhaseState::Approved
    } else if flag("generated") {
        PhaseState::Generated
    } else {
        PhaseState::Pending
    }
}

#[async_trait]
impl MetadataStore for FsMetadataStore {
    async fn read_phase_state(&self, entity: &EntityId) -> Result<PhaseStates, MetadataError> {
        let doc = self.load(entity).await?;
        let approvals = doc.get("approvals");
        Ok(Phase::ALL.into_iter().fold(PhaseStates::default(), |states, phase| {
            states.with(phase, phase_state(approvals.and_then(|a| a.get(phase.as_str()))))
        }))
    }

    async fn write_approval(
        &self,
        entity: &EntityId,
        phase: Phase,
        approved: bool,
    ) -> Result<(), MetadataError> {
        self.update_approval(entity, phase, true, approved).await
    }

    async fn mark_generated(&self, entity: &EntityId, phase: Phase) -> Result<(), MetadataError> {
        self.update_approval(entity, phase, true, false).await
    }

    async fn read_worktree_config(
        &self,
        entity: &EntityId,
    ) -> Result<Option<WorktreeConfig>, MetadataError> {
        let doc = self.load(entity).await?;
        match doc.get("worktree") {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| malformed(entity, format!("worktree: {e}"))),
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    #![cfg_attr(coverage_nightly, coverage(off))]

    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    #[derive(Default)]
    struct FakeState {
        states: HashMap<EntityId, PhaseStates>,
        worktrees: HashMap<EntityId, WorktreeConfig>,
        approvals: Vec<(EntityId, Phase, bool)>,
    }

    /// In-memory metadata. Unknown entities read as all-pending.
    #[derive(Clone, Default)]
    pub struct FakeMetadataStore {
        inner: Arc<Mutex<FakeState>>,
    }

    impl FakeMetadataStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_state(&self, entity: &EntityId, phase: Phase, state: PhaseState) {
            self.inner.lock().states.entry(entity.clone()).or_default().set(phase, state);
        }

        pub fn set_worktree(&self, entity: &EntityId, config: WorktreeConfig) {
            self.inner.lock().worktrees.insert(entity.clone(), config);
        }

        pub fn state(&self, entity: &EntityId, phase: Phase) -> PhaseState {
            self.inner.lock().states.get(entity).map(|s| s.get(phase)).unwrap_or_default()
        }

        /// Every `write_approval` call, in order.
        pub fn approvals(&self) -> Vec<(EntityId, Phase, bool)> {
            self.inner.lock().approvals.clone()
        }
    }

    #[async_trait]
    impl MetadataStore for FakeMetadataStore {
        async fn read_phase_state(&self, entity: &EntityId) -> Result<PhaseStates, MetadataError> {
            Ok(self.inner.lock().states.get(entity).cloned().unwrap_or_default())
        }

        async fn write_approval(
            &self,
            entity: &EntityId,
            phase: Phase,
            approved: bool,
        ) -> Result<(), MetadataError> {
            let mut inner = self.inner.lock();
            inner.approvals.push((entity.clone(), phase, approved));
            let state = if approved { PhaseState::Approved } else { PhaseState::Generated };
            inner.states.entry(entity.clone()).or_default().set(phase, state);
            Ok(())
        }

        async fn mark_generated(&self, entity: &EntityId, phase: Phase) -> Result<(), MetadataError> {
            self.set_state(entity, phase, PhaseState::Generated);
            Ok(())
        }

        async fn read_worktree_config(
            &self,
            entity: &EntityId,
        ) -> Result<Option<WorktreeConfig>, MetadataError> {
            Ok(self.inner.lock().worktrees.get(entity).cloned())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeMetadataStore;

#[cfg(test)]
#[path = "metadata_tests.rs"]
mod tests;
