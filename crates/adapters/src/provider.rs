// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Provider contracts shared by the local and SSH backends.

use crate::ProviderError;
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use std::any::Any;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::mpsc;

/// Backend tag of a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Local,
    Ssh,
}

sdd_core::simple_display! {
    ProviderKind {
        Local => "local",
        Ssh => "ssh",
    }
}

/// A command to launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnSpec {
    pub command: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: Vec<(String, String)>,
}

impl SpawnSpec {
    pub fn new(command: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self { command: command.into(), args: Vec::new(), cwd: cwd.into(), env: Vec::new() }
    }

    sdd_core::setters! {
        set { args: Vec<String>, env: Vec<(String, String)> }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// `command arg1 arg2` for logs
    pub fn display(&self) -> String {
        std::iter::once(self.command.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessSignal {
    Interrupt,
    Terminate,
    Kill,
}

impl ProcessSignal {
    /// Name as accepted by `kill -<NAME>`
    pub fn name(&self) -> &'static str {
        match self {
            ProcessSignal::Interrupt => "INT",
            ProcessSignal::Terminate => "TERM",
            ProcessSignal::Kill => "KILL",
        }
    }
}

pub type ProcessReader = Box<dyn AsyncRead + Send + Unpin>;
pub type ProcessWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// A launched process.
///
/// `exit` resolves once the process has exited. `None` means it was killed
/// by a signal.
pub struct ProcessHandle {
    pub pid: u32,
    pub stdout: ProcessReader,
    pub stderr: ProcessReader,
    pub stdin: Option<ProcessWriter>,
    pub exit: BoxFuture<'static, Result<Option<i32>, ProviderError>>,
}

impl std::fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHandle").field("pid", &self.pid).finish_non_exhaustive()
    }
}

/// Output of a command run to completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

#[async_trait]
pub trait ProcessProvider: Send + Sync + 'static {
    fn kind(&self) -> ProviderKind;

    /// Launch a process. Commands are checked against the command guard first.
    async fn spawn(&self, spec: SpawnSpec) -> Result<ProcessHandle, ProviderError>;

    /// Deliver a signal through the same channel the process was spawned on.
    async fn signal(&self, pid: u32, signal: ProcessSignal) -> Result<(), ProviderError>;

    async fn is_alive(&self, pid: u32) -> Result<bool, ProviderError>;

    /// Spawn and collect all output.
    async fn run(&self, spec: SpawnSpec) -> Result<CommandOutput, ProviderError> {
        let mut handle = self.spawn(spec).await?;
        drop(handle.stdin.take());
        let mut stdout = String::new();
        let mut stderr = String::new();
        let (out, err) = tokio::join!(
            handle.stdout.read_to_string(&mut stdout),
            handle.stderr.read_to_string(&mut stderr)
        );
        out.map_err(|e| ProviderError::Io(e.to_string()))?;
        err.map_err(|e| ProviderError::Io(e.to_string()))?;
        let code = handle.exit.await?;
        Ok(CommandOutput { code, stdout, stderr })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub path: PathBuf,
    pub is_dir: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FsEventKind {
    Created,
    Modified,
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEvent {
    pub kind: FsEventKind,
    pub path: PathBuf,
}

/// Receiver of filesystem events. Dropping it stops the watch.
pub struct WatchStream {
    rx: mpsc::Receiver<FsEvent>,
    _guard: Box<dyn Any + Send>,
}

impl WatchStream {
    pub fn new(rx: mpsc::Receiver<FsEvent>, guard: impl Any + Send) -> Self {
        Self { rx, _guard: Box::new(guard) }
    }

    pub async fn recv(&mut self) -> Option<FsEvent> {
        self.rx.recv().await
    }
}

#[async_trait]
pub trait FileSystemProvider: Send + Sync + 'static {
    fn kind(&self) -> ProviderKind;

    async fn read(&self, path: &Path) -> Result<Vec<u8>, ProviderError>;

    /// Replace the file's contents, creating parent directories.
    async fn write(&self, path: &Path, bytes: &[u8]) -> Result<(), ProviderError>;

    async fn list(&self, path: &Path) -> Result<Vec<DirEntry>, ProviderError>;

    async fn exists(&self, path: &Path) -> Result<bool, ProviderError>;

    async fn watch(&self, path: &Path, recursive: bool) -> Result<WatchStream, ProviderError>;

    async fn read_to_string(&self, path: &Path) -> Result<String, ProviderError> {
        let bytes = self.read(path).await?;
        String::from_utf8(bytes).map_err(|e| ProviderError::Io(format!("{}: {}", path.display(), e)))
    }
}
