// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! PID records: the durable mirror of each supervised agent.
//!
//! One JSON file per (entity, phase) at
//! `{state_dir}/agents/{kind}/{name}/{phase}.json`. A record outlives the
//! process it describes and is removed only once a terminal status has been
//! acknowledged.

use crate::{write_json_atomic, StorageError};
use sdd_core::{
    AgentHandle, AgentId, AgentStatus, EntityId, EntityKind, Phase, PhaseGroup, ProjectRoot,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// How an agent was launched; enough to re-spawn it for resume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentLaunch {
    pub root: ProjectRoot,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub prompt: Option<String>,
    pub cwd: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PidRecord {
    pub agent_id: AgentId,
    pub entity: EntityId,
    pub phase: Phase,
    pub group: PhaseGroup,
    #[serde(default)]
    pub pid: Option<u32>,
    #[serde(default)]
    pub session_id: Option<String>,
    pub status: AgentStatus,
    #[serde(rename = "startedAt")]
    pub started_at_ms: u64,
    #[serde(rename = "lastActivityAt")]
    pub last_activity_at_ms: u64,
    #[serde(default)]
    pub exit_code: Option<i32>,
    #[serde(flatten)]
    pub launch: AgentLaunch,
}

impl PidRecord {
    pub fn from_handle(handle: &AgentHandle, launch: AgentLaunch) -> Self {
        Self {
            agent_id: handle.agent_id.clone(),
            entity: handle.entity.clone(),
            phase: handle.phase,
            group: handle.group,
            pid: handle.pid,
            session_id: handle.session_id.clone(),
            status: handle.status,
            started_at_ms: handle.started_at_ms,
            last_activity_at_ms: handle.last_activity_at_ms,
            exit_code: handle.exit_code,
            launch,
        }
    }

    pub fn to_handle(&self) -> AgentHandle {
        AgentHandle {
            agent_id: self.agent_id.clone(),
            entity: self.entity.clone(),
            phase: self.phase,
            group: self.group,
            pid: self.pid,
            session_id: self.session_id.clone(),
            status: self.status,
            started_at_ms: self.started_at_ms,
            last_activity_at_ms: self.last_activity_at_ms,
            exit_code: self.exit_code,
            hang_suspected: false,
        }
    }
}

/// Directory-backed store of [`PidRecord`]s.
#[derive(Debug, Clone)]
pub struct PidRecordStore {
    dir: PathBuf,
}

impl PidRecordStore {
    pub fn new(state_dir: &Path) -> Self {
        Self { dir: state_dir.join("agents") }
    }

    pub fn path_for(&self, entity: &EntityId, phase: Phase) -> PathBuf {
        self.dir
            .join(entity.kind.dir_name())
            .join(&entity.name)
            .join(format!("{}.json", phase.as_str()))
    }

    pub fn save(&self, record: &PidRecord) -> Result<(), StorageError> {
        write_json_atomic(&self.path_for(&record.entity, record.phase), record)
    }

    pub fn load(&self, entity: &EntityId, phase: Phase) -> Result<Option<PidRecord>, StorageError> {
        read_record(&self.path_for(entity, phase))
    }

    pub fn remove(&self, entity: &EntityId, phase: Phase) -> Result<(), StorageError> {
        let path = self.path_for(entity, phase);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io(path, e)),
        }
    }

    /// Every readable record. Unparseable files are logged and skipped.
    pub fn load_all(&self) -> Vec<PidRecord> {
        let mut records = Vec::new();
        for kind in EntityKind::ALL {
            let kind_dir = self.dir.join(kind.dir_name());
            for entity_dir in read_dir_paths(&kind_dir) {
                for path in read_dir_paths(&entity_dir) {
                    if path.extension().and_then(|e| e.to_str()) != Some("json") {
                        continue;
                    }
                    match read_record(&path) {
                        Ok(Some(record)) => records.push(record),
                        Ok(None) => {}
                        Err(e) => {
                            tracing::warn!(path = %path.display(), error = %e, "skipping unreadable pid record")
                        }
                    }
                }
            }
        }
        records.sort_by_key(|r| r.started_at_ms);
        records
    }
}

fn read_dir_paths(dir: &Path) -> Vec<PathBuf> {
    match fs::read_dir(dir) {
        Ok(entries) => entries.flatten().map(|e| e.path()).collect(),
        Err(_) => Vec::new(),
    }
}

fn read_record(path: &Path) -> Result<Option<PidRecord>, StorageError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StorageError::io(path, e)),
    };
    serde_json::from_slice(&bytes).map(Some).map_err(|e| StorageError::json(path, e))
}

#[cfg(test)]
#[path = "pid_record_tests.rs"]
mod tests;
