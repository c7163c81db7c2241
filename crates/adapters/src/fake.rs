// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory providers for tests.

#![cfg_attr(coverage_nightly, coverage(off))]

use crate::{
    CommandOutput, CommandPolicy, DirEntry, FileSystemProvider, FsEvent, FsEventKind,
    ProcessHandle, ProcessProvider, ProcessSignal, ProviderError, ProviderKind, SpawnSpec,
    WatchStream,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use sdd_core::OutputStream;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::{mpsc, oneshot};

const PIPE_CAPACITY: usize = 64 * 1024;

/// A recorded spawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeSpawn {
    pub pid: u32,
    pub spec: SpawnSpec,
}

struct FakeProcess {
    stdout: Option<DuplexStream>,
    stderr: Option<DuplexStream>,
    exit: Option<oneshot::Sender<Option<i32>>>,
    stdin: Arc<Mutex<String>>,
    alive: bool,
}

struct FakeProcessState {
    next_pid: u32,
    policy: Option<CommandPolicy>,
    spawns: Vec<FakeSpawn>,
    processes: HashMap<u32, FakeProcess>,
    /// Pids reported alive without having been spawned here (adopted agents)
    external_alive: BTreeSet<u32>,
    fail_next_spawn: Option<ProviderError>,
    channel_closed: bool,
    signals: Vec<(u32, ProcessSignal)>,
    run_outputs: Vec<(String, CommandOutput)>,
    runs: Vec<SpawnSpec>,
}

/// Scriptable process provider.
///
/// Spawned processes stay running until the test calls [`FakeProcessProvider::exit`]
/// or signals them. Output is injected with [`FakeProcessProvider::emit`].
#[derive(Clone)]
pub struct FakeProcessProvider {
    inner: Arc<Mutex<FakeProcessState>>,
}

impl Default for FakeProcessProvider {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(FakeProcessState {
                next_pid: 4242,
                policy: None,
                spawns: Vec::new(),
                processes: HashMap::new(),
                external_alive: BTreeSet::new(),
                fail_next_spawn: None,
                channel_closed: false,
                signals: Vec::new(),
                run_outputs: Vec::new(),
                runs: Vec::new(),
            })),
        }
    }
}

impl FakeProcessProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enforce a command policy on spawn.
    pub fn with_policy(self, policy: CommandPolicy) -> Self {
        self.inner.lock().policy = Some(policy);
        self
    }

    pub fn spawns(&self) -> Vec<FakeSpawn> {
        self.inner.lock().spawns.clone()
    }

    pub fn last_spawn(&self) -> Option<FakeSpawn> {
        self.inner.lock().spawns.last().cloned()
    }

    pub fn signals(&self) -> Vec<(u32, ProcessSignal)> {
        self.inner.lock().signals.clone()
    }

    pub fn fail_next_spawn(&self, error: ProviderError) {
        self.inner.lock().fail_next_spawn = Some(error);
    }

    /// Make every signal and liveness probe fail as if the transport died.
    pub fn set_channel_closed(&self, closed: bool) {
        self.inner.lock().channel_closed = closed;
    }

    /// Report a pid alive (or not) regardless of whether it was spawned here.
    pub fn set_alive(&self, pid: u32, alive: bool) {
        let mut inner = self.inner.lock();
        if alive {
            inner.external_alive.insert(pid);
        } else {
            inner.external_alive.remove(&pid);
        }
        if let Some(proc) = inner.processes.get_mut(&pid) {
            proc.alive = alive;
        }
    }

    /// Everything written to the process's stdin so far.
    pub fn stdin_text(&self, pid: u32) -> String {
        self.inner.lock().processes.get(&pid).map(|p| p.stdin.lock().clone()).unwrap_or_default()
    }

    /// Write `text` to a running process's stdout or stderr.
    pub async fn emit(&self, pid: u32, stream: OutputStream, text: &str) {
        let pipe = {
            let mut inner = self.inner.lock();
            let Some(proc) = inner.processes.get_mut(&pid) else {
                return;
            };
            match stream {
                OutputStream::Stdout => proc.stdout.take(),
                OutputStream::Stderr => proc.stderr.take(),
            }
        };
        let Some(mut pipe) = pipe else {
            return;
        };
        let _ = pipe.write_all(text.as_bytes()).await;
        let _ = pipe.flush().await;
        let mut inner = self.inner.lock();
        if let Some(proc) = inner.processes.get_mut(&pid) {
            match stream {
                OutputStream::Stdout => proc.stdout = Some(pipe),
                OutputStream::Stderr => proc.stderr = Some(pipe),
            }
        }
    }

    /// Close the process's pipes and resolve its exit future.
    pub fn exit(&self, pid: u32, code: Option<i32>) {
        let mut inner = self.inner.lock();
        if let Some(proc) = inner.processes.get_mut(&pid) {
            proc.stdout = None;
            proc.stderr = None;
            proc.alive = false;
            if let Some(tx) = proc.exit.take() {
                let _ = tx.send(code);
            }
        }
    }

    /// Canned output for `run` calls whose command line starts with `prefix`.
    pub fn set_run_output(&self, prefix: &str, output: CommandOutput) {
        self.inner.lock().run_outputs.push((prefix.to_string(), output));
    }

    pub fn runs(&self) -> Vec<SpawnSpec> {
        self.inner.lock().runs.clone()
    }

    pub fn running_pids(&self) -> Vec<u32> {
        let inner = self.inner.lock();
        let mut pids: Vec<u32> =
            inner.processes.iter().filter(|(_, p)| p.alive).map(|(pid, _)| *pid).collect();
        pids.sort_unstable();
        pids
    }
}

#[async_trait]
impl ProcessProvider for FakeProcessProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Local
    }

    async fn spawn(&self, spec: SpawnSpec) -> Result<ProcessHandle, ProviderError> {
        let (stdout_w, stdout_r) = tokio::io::duplex(PIPE_CAPACITY);
        let (stderr_w, stderr_r) = tokio::io::duplex(PIPE_CAPACITY);
        let (stdin_w, mut stdin_r) = tokio::io::duplex(PIPE_CAPACITY);
        let (exit_tx, exit_rx) = oneshot::channel();
        let stdin_buf = Arc::new(Mutex::new(String::new()));

        let pid = {
            let mut inner = self.inner.lock();
            if let Some(policy) = &inner.policy {
                policy.check(&spec)?;
            }
            if let Some(err) = inner.fail_next_spawn.take() {
                return Err(err);
            }
            let pid = inner.next_pid;
            inner.next_pid += 1;
            inner.spawns.push(FakeSpawn { pid, spec });
            inner.processes.insert(
                pid,
                FakeProcess {
                    stdout: Some(stdout_w),
                    stderr: Some(stderr_w),
                    exit: Some(exit_tx),
                    stdin: Arc::clone(&stdin_buf),
                    alive: true,
                },
            );
            pid
        };

        tokio::spawn(async move {
            let mut buf = [0u8; 1024];
            while let Ok(n) = stdin_r.read(&mut buf).await {
                if n == 0 {
                    break;
                }
                stdin_buf.lock().push_str(&String::from_utf8_lossy(&buf[..n]));
            }
        });

        let exit = Box::pin(async move { Ok(exit_rx.await.unwrap_or(None)) });
        Ok(ProcessHandle {
            pid,
            stdout: Box::new(stdout_r),
            stderr: Box::new(stderr_r),
            stdin: Some(Box::new(stdin_w)),
            exit,
        })
    }

    async fn signal(&self, pid: u32, signal: ProcessSignal) -> Result<(), ProviderError> {
        {
            let mut inner = self.inner.lock();
            if inner.channel_closed {
                return Err(ProviderError::ChannelClosed("fake channel closed".to_string()));
            }
            inner.signals.push((pid, signal));
            let spawned_alive = inner.processes.get(&pid).is_some_and(|p| p.alive);
            if !spawned_alive {
                return if inner.external_alive.remove(&pid) {
                    Ok(())
                } else {
                    Err(ProviderError::NoSuchProcess(pid))
                };
            }
        }
        // Processes die on any signal, reported as a signal exit
        self.exit(pid, None);
        Ok(())
    }

    async fn is_alive(&self, pid: u32) -> Result<bool, ProviderError> {
        let inner = self.inner.lock();
        if inner.channel_closed {
            return Err(ProviderError::ChannelClosed("fake channel closed".to_string()));
        }
        Ok(inner.external_alive.contains(&pid)
            || inner.processes.get(&pid).is_some_and(|p| p.alive))
    }

    async fn run(&self, spec: SpawnSpec) -> Result<CommandOutput, ProviderError> {
        let mut inner = self.inner.lock();
        if let Some(policy) = &inner.policy {
            policy.check(&spec)?;
        }
        let line = spec.display();
        inner.runs.push(spec);
        Ok(inner
            .run_outputs
            .iter()
            .rev()
            .find(|(prefix, _)| line.starts_with(prefix.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or(CommandOutput { code: Some(0), ..CommandOutput::default() }))
    }
}

struct FakeFsState {
    files: BTreeMap<PathBuf, Vec<u8>>,
    dirs: BTreeSet<PathBuf>,
    watchers: Vec<(PathBuf, bool, mpsc::Sender<FsEvent>)>,
    writes: Vec<PathBuf>,
}

/// In-memory filesystem. Watches fire synchronously on mutation.
#[derive(Clone)]
pub struct FakeFileSystem {
    inner: Arc<Mutex<FakeFsState>>,
}

impl Default for FakeFileSystem {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(FakeFsState {
                files: BTreeMap::new(),
                dirs: BTreeSet::new(),
                watchers: Vec::new(),
                writes: Vec::new(),
            })),
        }
    }
}

impl FakeFsState {
    fn add_parents(&mut self, path: &Path) -> Vec<PathBuf> {
        let mut created = Vec::new();
        let mut cur = path.parent();
        while let Some(dir) = cur {
            if dir.as_os_str().is_empty() || !self.dirs.insert(dir.to_path_buf()) {
                break;
            }
            created.push(dir.to_path_buf());
            cur = dir.parent();
        }
        created.reverse();
        created
    }

    fn notify(&mut self, kind: FsEventKind, path: &Path) {
        self.watchers.retain(|(root, recursive, tx)| {
            let relevant = match path.strip_prefix(root) {
                Ok(rel) => *recursive || rel.components().count() == 1,
                Err(_) => false,
            };
            if relevant {
                let _ = tx.try_send(FsEvent { kind, path: path.to_path_buf() });
            }
            !tx.is_closed()
        });
    }
}

impl FakeFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl AsRef<Path>, contents: impl AsRef<[u8]>) {
        let path = path.as_ref();
        let mut inner = self.inner.lock();
        for dir in inner.add_parents(path) {
            inner.notify(FsEventKind::Created, &dir);
        }
        let kind = if inner.files.contains_key(path) { FsEventKind::Modified } else { FsEventKind::Created };
        inner.files.insert(path.to_path_buf(), contents.as_ref().to_vec());
        inner.notify(kind, path);
    }

    pub fn create_dir(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        let mut inner = self.inner.lock();
        for dir in inner.add_parents(&path.join("_")) {
            inner.notify(FsEventKind::Created, &dir);
        }
    }

    /// Remove a file or a directory tree.
    pub fn remove(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        let mut inner = self.inner.lock();
        let files: Vec<PathBuf> = inner.files.keys().filter(|p| p.starts_with(path)).cloned().collect();
        let dirs: Vec<PathBuf> = inner.dirs.iter().filter(|p| p.starts_with(path)).cloned().collect();
        for f in &files {
            inner.files.remove(f);
        }
        for d in &dirs {
            inner.dirs.remove(d);
        }
        if !files.is_empty() || !dirs.is_empty() {
            inner.notify(FsEventKind::Removed, path);
        }
    }

    pub fn get(&self, path: impl AsRef<Path>) -> Option<String> {
        self.inner.lock().files.get(path.as_ref()).map(|b| String::from_utf8_lossy(b).into_owned())
    }

    pub fn writes(&self) -> Vec<PathBuf> {
        self.inner.lock().writes.clone()
    }
}

#[async_trait]
impl FileSystemProvider for FakeFileSystem {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Local
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>, ProviderError> {
        self.inner.lock().files.get(path).cloned().ok_or_else(|| ProviderError::NotFound(path.to_path_buf()))
    }

    async fn write(&self, path: &Path, bytes: &[u8]) -> Result<(), ProviderError> {
        self.inner.lock().writes.push(path.to_path_buf());
        self.insert(path, bytes);
        Ok(())
    }

    async fn list(&self, path: &Path) -> Result<Vec<DirEntry>, ProviderError> {
        let inner = self.inner.lock();
        if !inner.dirs.contains(path) {
            return Err(ProviderError::NotFound(path.to_path_buf()));
        }
        let child = |p: &PathBuf| p.parent() == Some(path);
        let mut entries: Vec<DirEntry> = inner
            .dirs
            .iter()
            .filter(|p| child(p))
            .map(|p| (p, true))
            .chain(inner.files.keys().filter(|p| child(p)).map(|p| (p, false)))
            .filter_map(|(p, is_dir)| {
                let name = p.file_name()?.to_string_lossy().into_owned();
                Some(DirEntry { name, path: p.clone(), is_dir })
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn exists(&self, path: &Path) -> Result<bool, ProviderError> {
        let inner = self.inner.lock();
        Ok(inner.files.contains_key(path) || inner.dirs.contains(path))
    }

    async fn watch(&self, path: &Path, recursive: bool) -> Result<WatchStream, ProviderError> {
        let (tx, rx) = mpsc::channel(1024);
        self.inner.lock().watchers.push((path.to_path_buf(), recursive, tx));
        Ok(WatchStream::new(rx, ()))
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
