// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable per-agent output logs.
//!
//! Writes one JSON line per output chunk to:
//!   `<log_dir>/agents/<agent_id>.jsonl`

use crate::EventBus;
use sdd_core::{AgentId, Event, OutputStream};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// One persisted output chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub at_ms: u64,
    pub stream: OutputStream,
    pub chunk: String,
}

pub trait LogSink: Send + Sync + 'static {
    fn append(&self, agent_id: &AgentId, entry: &LogEntry) -> io::Result<()>;
}

/// Append-only JSONL files, one per agent.
#[derive(Debug, Clone)]
pub struct FileLogSink {
    log_dir: PathBuf,
}

impl FileLogSink {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self { log_dir: log_dir.into() }
    }

    pub fn log_path(&self, agent_id: &AgentId) -> PathBuf {
        self.log_dir.join("agents").join(format!("{agent_id}.jsonl"))
    }

    /// Entries logged for `agent_id`. Unparseable lines are skipped.
    pub fn read(&self, agent_id: &AgentId) -> io::Result<Vec<LogEntry>> {
        let file = match fs::File::open(self.log_path(agent_id)) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut entries = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            match serde_json::from_str(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => tracing::warn!(agent_id = %agent_id, error = %e, "skipping corrupt log line"),
            }
        }
        Ok(entries)
    }

    fn write_line(path: &Path, entry: &LogEntry) -> io::Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        let line = serde_json::to_string(entry).map_err(io::Error::other)?;
        writeln!(file, "{line}")
    }
}

impl LogSink for FileLogSink {
    fn append(&self, agent_id: &AgentId, entry: &LogEntry) -> io::Result<()> {
        Self::write_line(&self.log_path(agent_id), entry)
    }
}

/// Relay every output event on `bus` into `sink`.
///
/// Sink failures are logged and skipped; logging must not stall agents.
pub fn spawn_log_forwarder(bus: &EventBus, sink: Arc<dyn LogSink>) -> JoinHandle<()> {
    let mut sub = bus.subscribe(|e| matches!(e, Event::AgentOutput { .. }));
    tokio::spawn(async move {
        while let Some(event) = sub.recv().await {
            if let Event::AgentOutput { agent_id, stream, chunk, at_ms } = event {
                let entry = LogEntry { at_ms, stream, chunk };
                if let Err(e) = sink.append(&agent_id, &entry) {
                    tracing::warn!(agent_id = %agent_id, error = %e, "failed to write agent log");
                }
            }
        }
    })
}

#[cfg(test)]
#[path = "log_sink_tests.rs"]
mod tests;
