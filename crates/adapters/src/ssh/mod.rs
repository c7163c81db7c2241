// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SSH backend.
//!
//! Every operation runs as a channel on the target's shared session. Remote
//! pids are learned from an `echo $$; exec ...` preamble so signals can be
//! delivered later over the same session. A dead session surfaces as
//! [`ProviderError::ChannelClosed`].

mod connection;
mod transport;

pub use connection::{
    ConnectionError, ConnectionHandle, ConnectionSnapshot, FailedAttempt, ReconnectPolicy,
};
#[cfg(any(test, feature = "test-support"))]
pub use transport::FakeSshTransport;
pub use transport::{OpenSshTransport, SshTransport, StageFn};

use crate::provider::{ProcessReader, ProcessWriter};
use crate::subprocess::{run_with_timeout, REMOTE_OP_TIMEOUT};
use crate::{
    CommandPolicy, DirEntry, FileSystemProvider, FsEvent, FsEventKind, ProcessHandle,
    ProcessProvider, ProcessSignal, ProviderError, ProviderKind, SpawnSpec, WatchStream,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

/// ssh exits with 255 when the connection itself failed.
const SSH_CONNECTION_FAILURE: i32 = 255;

const POLL_INTERVAL: Duration = Duration::from_secs(2);

fn quote(path: &Path) -> String {
    shell_words::quote(&path.to_string_lossy()).into_owned()
}

pub struct SshProvider {
    connection: Arc<ConnectionHandle>,
    policy: CommandPolicy,
    poll_interval: Duration,
}

impl SshProvider {
    pub fn new(connection: Arc<ConnectionHandle>, policy: CommandPolicy) -> Self {
        Self { connection, policy, poll_interval: POLL_INTERVAL }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn connection(&self) -> &Arc<ConnectionHandle> {
        &self.connection
    }

    async fn ensure_session(&self) -> Result<(), ProviderError> {
        let target = self.connection.target();
        if self.connection.status().is_connected()
            && self.connection.transport().is_alive(target).await
        {
            return Ok(());
        }
        self.connection.mark_lost();
        Err(ProviderError::ChannelClosed(format!("ssh session to {target} is not available")))
    }

    fn command(&self, remote: &str) -> tokio::process::Command {
        self.connection.transport().remote_command(self.connection.target(), remote)
    }

    /// Run an internal remote command (not subject to the command guard).
    async fn exec(&self, remote: &str, stdin: Option<&[u8]>) -> Result<std::process::Output, ProviderError> {
        self.ensure_session().await?;
        let mut cmd = self.command(remote);
        let output = match stdin {
            None => {
                cmd.stdin(Stdio::null());
                run_with_timeout(cmd, REMOTE_OP_TIMEOUT, remote).await.map_err(ProviderError::Io)?
            }
            Some(bytes) => {
                cmd.stdin(Stdio::piped()).stdout(Stdio::piped()).stderr(Stdio::piped()).kill_on_drop(true);
                let mut child = cmd.spawn().map_err(|e| ProviderError::Io(e.to_string()))?;
                if let Some(mut input) = child.stdin.take() {
                    input.write_all(bytes).await.map_err(|e| ProviderError::Io(e.to_string()))?;
                }
                tokio::time::timeout(REMOTE_OP_TIMEOUT, child.wait_with_output())
                    .await
                    .map_err(|_| ProviderError::Io(format!("{remote} timed out")))?
                    .map_err(|e| ProviderError::Io(e.to_string()))?
            }
        };
        if output.status.code() == Some(SSH_CONNECTION_FAILURE) {
            self.connection.mark_lost();
            return Err(ProviderError::ChannelClosed(String::from_utf8_lossy(&output.stderr).trim().to_string()));
        }
        Ok(output)
    }

    /// `cd <cwd> && echo $$ && exec env K=V <command> <args..>`
    fn launch_line(spec: &SpawnSpec) -> String {
        let mut words: Vec<String> = Vec::new();
        if !spec.env.is_empty() {
            words.push("env".to_string());
            words.extend(spec.env.iter().map(|(k, v)| format!("{k}={v}")));
        }
        words.push(spec.command.clone());
        words.extend(spec.args.iter().cloned());
        format!("cd {} && echo $$ && exec {}", quote(&spec.cwd), shell_words::join(&words))
    }

    async fn snapshot(&self, path: &Path, recursive: bool) -> Result<HashMap<PathBuf, String>, ProviderError> {
        let depth = if recursive { String::new() } else { " -maxdepth 1".to_string() };
        let remote = format!("find {}{} -mindepth 1 -printf '%T@ %p\\n'", quote(path), depth);
        let output = self.exec(&remote, None).await?;
        if !output.status.success() {
            return Err(ProviderError::NotFound(path.to_path_buf()));
        }
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter_map(|line| line.split_once(' '))
            .map(|(mtime, p)| (PathBuf::from(p), mtime.to_string()))
            .collect())
    }
}

#[async_trait]
impl ProcessProvider for SshProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Ssh
    }

    async fn spawn(&self, spec: SpawnSpec) -> Result<ProcessHandle, ProviderError> {
        self.policy.check(&spec)?;
        self.ensure_session().await?;

        let mut cmd = self.command(&Self::launch_line(&spec));
        cmd.stdin(Stdio::piped()).stdout(Stdio::piped()).stderr(Stdio::piped()).kill_on_drop(false);
        let mut child = cmd.spawn().map_err(|e| ProviderError::Spawn(format!("ssh: {e}")))?;

        let stdout = child.stdout.take().ok_or_else(|| ProviderError::Spawn("stdout not captured".into()))?;
        let stderr = child.stderr.take().ok_or_else(|| ProviderError::Spawn("stderr not captured".into()))?;
        let stdin = child.stdin.take().map(|s| Box::new(s) as ProcessWriter);

        // First stdout line is the remote shell's pid
        let mut stdout = BufReader::new(stdout);
        let mut first = String::new();
        stdout.read_line(&mut first).await.map_err(|e| ProviderError::Spawn(e.to_string()))?;
        let pid = match first.trim().parse::<u32>() {
            Ok(pid) => pid,
            Err(_) => {
                let status = child.wait().await.ok().and_then(|s| s.code());
                if status == Some(SSH_CONNECTION_FAILURE) {
                    self.connection.mark_lost();
                    return Err(ProviderError::ChannelClosed(format!("spawn of {} lost the session", spec.command)));
                }
                return Err(ProviderError::Spawn(format!(
                    "{} did not start on {} (exit {:?})",
                    spec.command,
                    self.connection.target(),
                    status
                )));
            }
        };
        tracing::debug!(pid, target = %self.connection.target(), command = %spec.display(), "remote process spawned");

        let connection = Arc::clone(&self.connection);
        let exit = Box::pin(async move {
            let status = child.wait().await.map_err(|e| ProviderError::Io(e.to_string()))?;
            match status.code() {
                Some(SSH_CONNECTION_FAILURE) => {
                    connection.mark_lost();
                    Err(ProviderError::ChannelClosed(format!("session to {} dropped", connection.target())))
                }
                code => Ok(code),
            }
        });
        Ok(ProcessHandle { pid, stdout: Box::new(stdout) as ProcessReader, stderr: Box::new(stderr), stdin, exit })
    }

    async fn signal(&self, pid: u32, signal: ProcessSignal) -> Result<(), ProviderError> {
        let output = self.exec(&format!("kill -{} {}", signal.name(), pid), None).await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(ProviderError::NoSuchProcess(pid))
        }
    }

    async fn is_alive(&self, pid: u32) -> Result<bool, ProviderError> {
        Ok(self.exec(&format!("kill -0 {pid}"), None).await?.status.success())
    }
}

#[async_trait]
impl FileSystemProvider for SshProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Ssh
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>, ProviderError> {
        let output = self.exec(&format!("cat -- {}", quote(path)), None).await?;
        if !output.status.success() {
            return Err(ProviderError::NotFound(path.to_path_buf()));
        }
        Ok(output.stdout)
    }

    async fn write(&self, path: &Path, bytes: &[u8]) -> Result<(), ProviderError> {
        let parent = path.parent().unwrap_or(Path::new("/"));
        let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        let tmp = parent.join(format!(".{name}.tmp"));
        let remote = format!(
            "mkdir -p {} && cat > {} && mv -f {} {}",
            quote(parent),
            quote(&tmp),
            quote(&tmp),
            quote(path)
        );
        let output = self.exec(&remote, Some(bytes)).await?;
        if !output.status.success() {
            return Err(ProviderError::Io(format!(
                "{}: {}",
                path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    async fn list(&self, path: &Path) -> Result<Vec<DirEntry>, ProviderError> {
        let output = self.exec(&format!("ls -1Ap -- {}", quote(path)), None).await?;
        if !output.status.success() {
            return Err(ProviderError::NotFound(path.to_path_buf()));
        }
        let mut entries: Vec<DirEntry> = String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter(|l| !l.is_empty())
            .map(|line| {
                let (name, is_dir) = match line.strip_suffix('/') {
                    Some(name) => (name, true),
                    None => (line, false),
                };
                DirEntry { name: name.to_string(), path: path.join(name), is_dir }
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn exists(&self, path: &Path) -> Result<bool, ProviderError> {
        Ok(self.exec(&format!("test -e {}", quote(path)), None).await?.status.success())
    }

    /// Polling watch: diffs successive `find` snapshots.
    async fn watch(&self, path: &Path, recursive: bool) -> Result<WatchStream, ProviderError> {
        let provider = SshProvider {
            connection: Arc::clone(&self.connection),
            policy: self.policy.clone(),
            poll_interval: self.poll_interval,
        };
        let mut previous = provider.snapshot(path, recursive).await?;
        let (tx, rx) = mpsc::channel(256);
        let root = path.to_path_buf();
        let task = tokio::spawn(async move {
            loop {
                tokio::time::sleep(provider.poll_interval).await;
                let current = match provider.snapshot(&root, recursive).await {
                    Ok(current) => current,
                    Err(ProviderError::NotFound(_)) => HashMap::new(),
                    Err(e) => {
                        tracing::warn!(path = %root.display(), error = %e, "remote watch poll failed");
                        continue;
                    }
                };
                let mut events = Vec::new();
                for (p, mtime) in &current {
                    match previous.get(p) {
                        None => events.push(FsEvent { kind: FsEventKind::Created, path: p.clone() }),
                        Some(old) if old != mtime => {
                            events.push(FsEvent { kind: FsEventKind::Modified, path: p.clone() })
                        }
                        _ => {}
                    }
                }
                for p in previous.keys().filter(|p| !current.contains_key(*p)) {
                    events.push(FsEvent { kind: FsEventKind::Removed, path: p.clone() });
                }
                for event in events {
                    if tx.send(event).await.is_err() {
                        return;
                    }
                }
                previous = current;
            }
        });
        Ok(WatchStream::new(rx, AbortOnDrop(task)))
    }
}

/// Stops the polling task when the stream is dropped.
struct AbortOnDrop(tokio::task::JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[cfg(test)]
#[path = "ssh_tests.rs"]
mod tests;
