// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persisted auto-execution sessions, one file per entity.

use crate::{write_json_atomic, StorageError};
use sdd_core::{AutoExecutionSession, EntityId};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct AutoExecStore {
    dir: PathBuf,
}

impl AutoExecStore {
    pub fn new(state_dir: &Path) -> Self {
        Self { dir: state_dir.join("auto") }
    }

    /// `{state_dir}/auto/{kind}/{name}.json`
    pub fn path_for(&self, entity: &EntityId) -> PathBuf {
        self.dir.join(entity.kind.dir_name()).join(format!("{}.json", entity.name))
    }

    pub fn save(&self, session: &AutoExecutionSession) -> Result<(), StorageError> {
        write_json_atomic(&self.path_for(&session.entity), session)
    }

    pub fn load(&self, entity: &EntityId) -> Result<Option<AutoExecutionSession>, StorageError> {
        let path = self.path_for(entity);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::io(path, e)),
        };
        serde_json::from_slice(&bytes).map(Some).map_err(|e| StorageError::json(path, e))
    }

    pub fn remove(&self, entity: &EntityId) -> Result<(), StorageError> {
        let path = self.path_for(entity);
        match fs::remove_file(&path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(StorageError::io(path, e)),
            _ => Ok(()),
        }
    }

    /// All persisted sessions; unreadable files are logged and skipped.
    pub fn load_all(&self) -> Vec<AutoExecutionSession> {
        let mut sessions = Vec::new();
        let Ok(kinds) = fs::read_dir(&self.dir) else {
            return sessions;
        };
        for kind_dir in kinds.flatten() {
            let Ok(files) = fs::read_dir(kind_dir.path()) else {
                continue;
            };
            for file in files.flatten() {
                let path = file.path();
                match fs::read(&path).map_err(|e| StorageError::io(&path, e)).and_then(|b| {
                    serde_json::from_slice::<AutoExecutionSession>(&b)
                        .map_err(|e| StorageError::json(&path, e))
                }) {
                    Ok(session) => sessions.push(session),
                    Err(e) => tracing::warn!(error = %e, "skipping unreadable auto-execution session"),
                }
            }
        }
        sessions
    }
}

#[cfg(test)]
#[path = "auto_exec_tests.rs"]
mod tests;
