// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Local backend: host processes and the host filesystem.

use crate::provider::{ProcessReader, ProcessWriter};
use crate::{
    CommandPolicy, DirEntry, FileSystemProvider, FsEvent, FsEventKind, ProcessHandle,
    ProcessProvider, ProcessSignal, ProviderError, ProviderKind, SpawnSpec, WatchStream,
};
use async_trait::async_trait;
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use notify::{EventKind, RecursiveMode, Watcher};
use std::path::Path;
use std::process::Stdio;
use tokio::sync::mpsc;

const WATCH_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Default)]
pub struct LocalProvider {
    policy: CommandPolicy,
}

impl LocalProvider {
    pub fn new(policy: CommandPolicy) -> Self {
        Self { policy }
    }
}

fn to_nix(signal: ProcessSignal) -> Signal {
    match signal {
        ProcessSignal::Interrupt => Signal::SIGINT,
        ProcessSignal::Terminate => Signal::SIGTERM,
        ProcessSignal::Kill => Signal::SIGKILL,
    }
}

fn nix_pid(pid: u32) -> Result<Pid, ProviderError> {
    i32::try_from(pid).map(Pid::from_raw).map_err(|_| ProviderError::NoSuchProcess(pid))
}

#[async_trait]
impl ProcessProvider for LocalProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Local
    }

    async fn spawn(&self, spec: SpawnSpec) -> Result<ProcessHandle, ProviderError> {
        self.policy.check(&spec)?;
        if !spec.cwd.is_dir() {
            return Err(ProviderError::Spawn(format!(
                "working directory does not exist: {}",
                spec.cwd.display()
            )));
        }

        let mut cmd = tokio::process::Command::new(&spec.command);
        cmd.args(&spec.args)
            .current_dir(&spec.cwd)
            .envs(spec.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // The process must outlive a dropped handle; reconciliation adopts it
            .kill_on_drop(false);

        let mut child = cmd
            .spawn()
            .map_err(|e| ProviderError::Spawn(format!("{}: {}", spec.command, e)))?;
        let pid = child
            .id()
            .ok_or_else(|| ProviderError::Spawn(format!("{} exited before reporting a pid", spec.command)))?;

        let stdout: ProcessReader = match child.stdout.take() {
            Some(s) => Box::new(s),
            None => return Err(ProviderError::Spawn("stdout not captured".to_string())),
        };
        let stderr: ProcessReader = match child.stderr.take() {
            Some(s) => Box::new(s),
            None => return Err(ProviderError::Spawn("stderr not captured".to_string())),
        };
        let stdin = child.stdin.take().map(|s| Box::new(s) as ProcessWriter);

        tracing::debug!(pid, command = %spec.display(), cwd = %spec.cwd.display(), "local process spawned");

        let exit = Box::pin(async move {
            child.wait().await.map(|status| status.code()).map_err(|e| ProviderError::Io(e.to_string()))
        });
        Ok(ProcessHandle { pid, stdout, stderr, stdin, exit })
    }

    async fn signal(&self, pid: u32, signal: ProcessSignal) -> Result<(), ProviderError> {
        match kill(nix_pid(pid)?, to_nix(signal)) {
            Ok(()) => Ok(()),
            Err(Errno::ESRCH) => Err(ProviderError::NoSuchProcess(pid)),
            Err(e) => Err(ProviderError::Io(format!("kill -{} {}: {}", signal.name(), pid, e))),
        }
    }

    async fn is_alive(&self, pid: u32) -> Result<bool, ProviderError> {
        let Ok(pid) = nix_pid(pid) else {
            return Ok(false);
        };
        match kill(pid, None) {
            Ok(()) => Ok(true),
            // Exists but owned by someone else
            Err(Errno::EPERM) => Ok(true),
            Err(_) => Ok(false),
        }
    }
}

fn classify(kind: &EventKind) -> Option<FsEventKind> {
    match kind {
        EventKind::Create(_) => Some(FsEventKind::Created),
        EventKind::Modify(_) => Some(FsEventKind::Modified),
        EventKind::Remove(_) => Some(FsEventKind::Removed),
        _ => None,
    }
}

#[async_trait]
impl FileSystemProvider for LocalProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Local
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>, ProviderError> {
        tokio::fs::read(path).await.map_err(|e| ProviderError::io(path, e))
    }

    async fn write(&self, path: &Path, bytes: &[u8]) -> Result<(), ProviderError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| ProviderError::io(parent, e))?;
        }
        let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        let tmp = path.with_file_name(format!(".{name}.tmp"));
        tokio::fs::write(&tmp, bytes).await.map_err(|e| ProviderError::io(&tmp, e))?;
        tokio::fs::rename(&tmp, path).await.map_err(|e| ProviderError::io(path, e))
    }

    async fn list(&self, path: &Path) -> Result<Vec<DirEntry>, ProviderError> {
        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(path).await.map_err(|e| ProviderError::io(path, e))?;
        while let Some(entry) = dir.next_entry().await.map_err(|e| ProviderError::io(path, e))? {
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                path: entry.path(),
                is_dir,
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn exists(&self, path: &Path) -> Result<bool, ProviderError> {
        tokio::fs::try_exists(path).await.map_err(|e| ProviderError::io(path, e))
    }

    async fn watch(&self, path: &Path, recursive: bool) -> Result<WatchStream, ProviderError> {
        let (tx, rx) = mpsc::channel(WATCH_CHANNEL_CAPACITY);
        let mut watcher = notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
            let Ok(event) = res else {
                return;
            };
            let Some(kind) = classify(&event.kind) else {
                return;
            };
            for path in event.paths {
                if tx.try_send(FsEvent { kind, path }).is_err() {
                    tracing::warn!("watch channel full, dropping filesystem event");
                }
            }
        })
        .map_err(|e| ProviderError::Watch(e.to_string()))?;

        let mode = if recursive { RecursiveMode::Recursive } else { RecursiveMode::NonRecursive };
        watcher
            .watch(path, mode)
            .map_err(|e| ProviderError::Watch(format!("{}: {}", path.display(), e)))?;
        Ok(WatchStream::new(rx, watcher))
    }
}

#[cfg(test)]
#[path = "local_tests.rs"]
mod tests;
