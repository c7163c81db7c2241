// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worktree configuration and entity path mapping.
//!
//! Layout, relative to a project root:
//!
//! ```text
//! .kiro/{kind}/{name}/...                                 main tree
//! .kiro/worktrees/{kind}/{name}/                          a worktree checkout
//! .kiro/worktrees/{kind}/{name}/.kiro/{kind}/{name}/...   its mirrored entity dir
//! ```

use crate::entity::{is_valid_entity_name, EntityKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

/// Project-level configuration directory.
pub const CONFIG_DIR: &str = ".kiro";

/// Directory under [`CONFIG_DIR`] holding worktree checkouts.
pub const WORKTREES_DIR: &str = "worktrees";

/// Present on an entity that runs in worktree mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorktreeConfig {
    pub path: PathBuf,
    pub branch: String,
    pub created_at: DateTime<Utc>,
}

/// `{root}/.kiro/{kind}/{name}`
pub fn build_main_entity_path(root: &Path, kind: EntityKind, name: &str) -> PathBuf {
    root.join(CONFIG_DIR).join(kind.dir_name()).join(name)
}

/// `{root}/.kiro/worktrees/{kind}`
pub fn worktree_root(root: &Path, kind: EntityKind) -> PathBuf {
    root.join(CONFIG_DIR).join(WORKTREES_DIR).join(kind.dir_name())
}

/// `{root}/.kiro/worktrees/{kind}/{name}`
pub fn build_worktree_path(root: &Path, kind: EntityKind, name: &str) -> PathBuf {
    worktree_root(root, kind).join(name)
}

/// `{root}/.kiro/worktrees/{kind}/{name}/.kiro/{kind}/{name}`
pub fn build_worktree_entity_path(root: &Path, kind: EntityKind, name: &str) -> PathBuf {
    build_main_entity_path(&build_worktree_path(root, kind, name), kind, name)
}

fn normal_components(path: &Path) -> Option<Vec<&str>> {
    path.components()
        .map(|c| match c {
            Component::Normal(s) => s.to_str(),
            _ => None,
        })
        .collect()
}

/// Resolve a filesystem path to the entity it belongs to.
///
/// Accepts paths under the main tree and under a worktree's mirrored entity
/// directory. A worktree path whose outer and mirrored names disagree, or
/// one that stops before the mirrored entity segment, yields `None`.
pub fn extract_entity_name(root: &Path, path: &Path, kind: EntityKind) -> Option<String> {
    let rel = normal_components(path.strip_prefix(root).ok()?)?;
    let kind_dir = kind.dir_name();

    match rel.as_slice() {
        [CONFIG_DIR, WORKTREES_DIR, k, outer, rest @ ..] if *k == kind_dir => {
            let inner = rest.windows(3).find_map(|w| match w {
                [CONFIG_DIR, k, inner] if *k == kind_dir => Some(*inner),
                _ => None,
            })?;
            (inner == *outer && is_valid_entity_name(outer)).then(|| outer.to_string())
        }
        [CONFIG_DIR, k, name, ..] if *k == kind_dir && is_valid_entity_name(name) => {
            Some(name.to_string())
        }
        _ => None,
    }
}

/// Name of the worktree when `path` is a direct child of the worktree root.
///
/// Anything deeper belongs to an existing worktree and is not an add/remove.
pub fn worktree_child_name(root: &Path, kind: EntityKind, path: &Path) -> Option<String> {
    let rel = normal_components(path.strip_prefix(worktree_root(root, kind)).ok()?)?;
    match rel.as_slice() {
        [name] if is_valid_entity_name(name) => Some(name.to_string()),
        _ => None,
    }
}

#[cfg(test)]
#[path = "worktree_tests.rs"]
mod tests;
