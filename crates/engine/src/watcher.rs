// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worktree-aware entity watcher.
//!
//! Two tiers of watches feed one debounced stream:
//!
//! - outer: the worktree root `.kiro/worktrees/{kind}/`, direct children
//!   only, to notice whole worktrees appearing or disappearing
//! - inner: recursive watches on `.kiro/{kind}/` and on every worktree's
//!   mirrored entity directory
//!
//! A tier whose directory does not exist yet is covered by a shallow watch on
//! its nearest existing ancestor inside the project, and armed on the first
//! batch after it appears. Each debounced batch is diffed against the known
//! entity set and published as [`Event::EntitiesChanged`].

use crate::EventBus;
use parking_lot::Mutex;
use sdd_adapters::{FileSystemProvider, FsEvent, ProviderError, WatchStream};
use sdd_core::entity::is_valid_entity_name;
use sdd_core::worktree::{
    build_main_entity_path, build_worktree_entity_path, build_worktree_path, extract_entity_name,
    worktree_child_name, worktree_root, CONFIG_DIR,
};
use sdd_core::{EntityKind, Event};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Quiet period that closes a batch
    pub debounce: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { debounce: Duration::from_millis(200) }
    }
}

#[derive(Debug, Error)]
pub enum WatchError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// One debounced batch of entity changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDelta {
    pub kind: EntityKind,
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub changed: Vec<String>,
}

impl EntityDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }

    fn into_event(self) -> Event {
        Event::EntitiesChanged {
            kind: self.kind,
            added: self.added,
            removed: self.removed,
            changed: self.changed,
        }
    }
}

#[derive(Default)]
struct WatchState {
    entities: BTreeSet<String>,
    worktrees: BTreeSet<String>,
    /// Inner-tier forwarders, keyed by worktree name
    inner: HashMap<String, JoinHandle<()>>,
    /// Main and outer tier forwarders, or ancestor stand-ins, keyed by watched path
    tiers: HashMap<PathBuf, JoinHandle<()>>,
}

struct Shared {
    fs: Arc<dyn FileSystemProvider>,
    root: PathBuf,
    kind: EntityKind,
    bus: EventBus,
    tx: mpsc::Sender<FsEvent>,
    state: Mutex<WatchState>,
}

pub struct EntityWatcher {
    shared: Arc<Shared>,
    tasks: Vec<JoinHandle<()>>,
}

fn forward(mut stream: WatchStream, tx: mpsc::Sender<FsEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = stream.recv().await {
            if tx.send(event).await.is_err() {
                break;
            }
        }
    })
}

impl Shared {
    fn main_dir(&self) -> PathBuf {
        self.root.join(CONFIG_DIR).join(self.kind.dir_name())
    }

    async fn nearest_existing(&self, dir: &Path) -> Result<Option<PathBuf>, ProviderError> {
        let mut current = dir.parent();
        while let Some(path) = current {
            if !path.starts_with(&self.root) {
                break;
            }
            if self.fs.exists(path).await? {
                return Ok(Some(path.to_path_buf()));
            }
            current = path.parent();
        }
        Ok(None)
    }

    /// Watch the main and outer tiers, falling back to a shallow watch on the
    /// nearest existing ancestor of a missing tier. Stand-ins no longer needed
    /// are dropped.
    async fn arm_tiers(&self) -> Result<(), ProviderError> {
        let mut wanted: Vec<(PathBuf, bool)> = Vec::new();
        for (dir, recursive) in [(self.main_dir(), true), (worktree_root(&self.root, self.kind), false)] {
            let target = if self.fs.exists(&dir).await? {
                Some((dir.clone(), recursive))
            } else {
                self.nearest_existing(&dir).await?.map(|ancestor| (ancestor, false))
            };
            match target {
                Some(target) if !wanted.iter().any(|(p, _)| *p == target.0) => wanted.push(target),
                Some(_) => {}
                None => tracing::debug!(path = %dir.display(), "no existing ancestor to watch"),
            }
        }

        let missing: Vec<(PathBuf, bool)> = {
            let mut state = self.state.lock();
            state.tiers.retain(|path, task| {
                let keep = wanted.iter().any(|(p, _)| p == path);
                if !keep {
                    task.abort();
                }
                keep
            });
            wanted.into_iter().filter(|(p, _)| !state.tiers.contains_key(p)).collect()
        };
        for (path, recursive) in missing {
            let stream = self.fs.watch(&path, recursive).await?;
            tracing::debug!(kind = %self.kind, path = %path.display(), recursive, "watching");
            self.state.lock().tiers.insert(path, forward(stream, self.tx.clone()));
        }
        Ok(())
    }

    async fn child_dirs(&self, dir: &Path) -> Result<Vec<String>, ProviderError> {
        if !self.fs.exists(dir).await? {
            return Ok(Vec::new());
        }
        Ok(self
            .fs
            .list(dir)
            .await?
            .into_iter()
            .filter(|e| e.is_dir && is_valid_entity_name(&e.name))
            .map(|e| e.name)
            .collect())
    }

    /// Entities in the main tree plus worktrees that carry their mirrored entity.
    async fn scan(&self) -> Result<(BTreeSet<String>, BTreeSet<String>), ProviderError> {
        let mut entities: BTreeSet<String> = self.child_dirs(&self.main_dir()).await?.into_iter().collect();
        let worktrees: BTreeSet<String> =
            self.child_dirs(&worktree_root(&self.root, self.kind)).await?.into_iter().collect();
        for name in &worktrees {
            if self.fs.exists(&build_worktree_entity_path(&self.root, self.kind, name)).await? {
                entities.insert(name.clone());
            }
        }
        Ok((entities, worktrees))
    }

    /// Start inner watches for worktrees that have none and drop those of
    /// removed worktrees. A worktree whose mirrored directory does not exist
    /// yet is retried on the next batch.
    async fn sync_inner_watches(&self, worktrees: &BTreeSet<String>) -> Result<(), ProviderError> {
        let missing: Vec<String> = {
            let mut state = self.state.lock();
            state.inner.retain(|name, task| {
                let keep = worktrees.contains(name);
                if !keep {
                    task.abort();
                }
                keep
            });
            worktrees.iter().filter(|n| !state.inner.contains_key(*n)).cloned().collect()
        };
        for name in missing {
            let path = build_worktree_entity_path(&self.root, self.kind, &name);
            if !self.fs.exists(&path).await? {
                continue;
            }
            let stream = self.fs.watch(&path, true).await?;
            tracing::debug!(kind = %self.kind, worktree = %name, "watching worktree entity");
            self.state.lock().inner.insert(name, forward(stream, self.tx.clone()));
        }
        Ok(())
    }

    async fn flush(&self, batch: Vec<FsEvent>) -> Result<EntityDelta, ProviderError> {
        let mut touched = BTreeSet::new();
        for event in &batch {
            if worktree_child_name(&self.root, self.kind, &event.path).is_some() {
                continue;
            }
            if let Some(name) = extract_entity_name(&self.root, &event.path, self.kind) {
                touched.insert(name);
            }
        }

        self.arm_tiers().await?;
        let (entities, worktrees) = self.scan().await?;
        self.sync_inner_watches(&worktrees).await?;

        let mut state = self.state.lock();
        let delta = EntityDelta {
            kind: self.kind,
            added: entities.difference(&state.entities).cloned().collect(),
            removed: state.entities.difference(&entities).cloned().collect(),
            changed: touched
                .into_iter()
                .filter(|n| entities.contains(n) && state.entities.contains(n))
                .collect(),
        };
        state.entities = entities;
        state.worktrees = worktrees;
        Ok(delta)
    }
}

async fn debounce(shared: Arc<Shared>, mut rx: mpsc::Receiver<FsEvent>, window: Duration) {
    while let Some(first) = rx.recv().await {
        let mut batch = vec![first];
        let mut closed = false;
        loop {
            match tokio::time::timeout(window, rx.recv()).await {
                Ok(Some(event)) => batch.push(event),
                Ok(None) => {
                    closed = true;
                    break;
                }
                Err(_) => break,
            }
        }

        match shared.flush(batch).await {
            Ok(delta) if delta.is_empty() => {}
            Ok(delta) => {
                tracing::debug!(
                    kind = %delta.kind,
                    added = delta.added.len(),
                    removed = delta.removed.len(),
                    changed = delta.changed.len(),
                    "entities changed"
                );
                shared.bus.publish(delta.into_event()).await;
            }
            Err(e) => tracing::warn!(kind = %shared.kind, error = %e, "failed to rescan entities"),
        }
        if closed {
            break;
        }
    }
}

impl EntityWatcher {
    pub async fn start(
        fs: Arc<dyn FileSystemProvider>,
        root: impl Into<PathBuf>,
        kind: EntityKind,
        bus: EventBus,
        config: WatchConfig,
    ) -> Result<Self, WatchError> {
        let root = root.into();
        let (tx, rx) = mpsc::channel(1024);
        let shared = Arc::new(Shared {
            fs,
            root,
            kind,
            bus,
            tx,
            state: Mutex::new(WatchState::default()),
        });
        shared.arm_tiers().await?;
        let (entities, worktrees) = shared.scan().await?;
        shared.sync_inner_watches(&worktrees).await?;
        {
            let mut state = shared.state.lock();
            state.entities = entities;
            state.worktrees = worktrees;
        }

        let tasks = vec![tokio::spawn(debounce(Arc::clone(&shared), rx, config.debounce))];
        tracing::info!(kind = %kind, root = %shared.root.display(), "entity watcher started");
        Ok(Self { shared, tasks })
    }

    /// Known entity names, main tree and worktrees combined.
    pub fn entities(&self) -> Vec<String> {
        self.shared.state.lock().entities.iter().cloned().collect()
    }

    /// Entities that currently run in worktree mode.
    pub fn worktree_entities(&self) -> Vec<String> {
        self.shared.state.lock().worktrees.iter().cloned().collect()
    }

    /// `{root}/.kiro/{kind}/{name}` or its worktree mirror, whichever holds the entity.
    pub fn entity_path(&self, name: &str) -> PathBuf {
        let shared = &self.shared;
        if shared.state.lock().worktrees.contains(name) {
            build_worktree_entity_path(&shared.root, shared.kind, name)
        } else {
            build_main_entity_path(&shared.root, shared.kind, name)
        }
    }

    /// Checkout directory of a worktree-mode entity.
    pub fn worktree_path(&self, name: &str) -> Option<PathBuf> {
        let shared = &self.shared;
        let known = shared.state.lock().worktrees.contains(name);
        known.then(|| build_worktree_path(&shared.root, shared.kind, name))
    }
}

impl Drop for EntityWatcher {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
        let mut state = self.shared.state.lock();
        for (_, task) in state.inner.drain() {
            task.abort();
        }
        for (_, task) in state.tiers.drain() {
            task.abort();
        }
    }
}

#[cfg(test)]
#[path = "watcher_tests.rs"]
mod tests;
