// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! SSH transport: the handshake plus a way to run commands over it.
//!
//! The OpenSSH implementation keeps one ControlMaster per target. Every
//! command opens a channel on that master, so the whole project shares a
//! single authenticated session.

use crate::subprocess::{run_with_timeout, SSH_CONTROL_TIMEOUT};
use async_trait::async_trait;
use sdd_core::{ConnectionStatus, SshTarget};
use std::path::PathBuf;
use std::process::Stdio;

/// Callback reporting handshake stages.
pub type StageFn<'a> = &'a (dyn Fn(ConnectionStatus) + Send + Sync);

#[async_trait]
pub trait SshTransport: Send + Sync + 'static {
    /// One handshake attempt. Reports intermediate stages through `stage`.
    async fn handshake(&self, target: &SshTarget, stage: StageFn<'_>) -> Result<(), String>;

    /// Whether the shared session is still usable.
    async fn is_alive(&self, target: &SshTarget) -> bool;

    async fn disconnect(&self, target: &SshTarget);

    /// A local command that runs `remote` (a shell command line) on the target.
    fn remote_command(&self, target: &SshTarget, remote: &str) -> tokio::process::Command;
}

/// Transport backed by the system `ssh` client.
#[derive(Debug, Clone)]
pub struct OpenSshTransport {
    control_dir: PathBuf,
}

impl OpenSshTransport {
    pub fn new(control_dir: impl Into<PathBuf>) -> Self {
        Self { control_dir: control_dir.into() }
    }

    fn control_path(&self, target: &SshTarget) -> PathBuf {
        self.control_dir.join(format!("{}@{}-{}.sock", target.user, target.host, target.port))
    }

    fn base_command(&self, target: &SshTarget) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new("ssh");
        cmd.arg("-S")
            .arg(self.control_path(target))
            .arg("-p")
            .arg(target.port.to_string())
            .arg("-o")
            .arg("BatchMode=yes");
        cmd
    }
}

#[async_trait]
impl SshTransport for OpenSshTransport {
    async fn handshake(&self, target: &SshTarget, stage: StageFn<'_>) -> Result<(), String> {
        if let Err(e) = tokio::fs::create_dir_all(&self.control_dir).await {
            return Err(format!("cannot create control dir {}: {}", self.control_dir.display(), e));
        }
        // A master from a previous handshake may still be around
        if self.is_alive(target).await {
            return Ok(());
        }

        stage(ConnectionStatus::HostVerifying);
        stage(ConnectionStatus::Authenticating);
        let mut cmd = self.base_command(target);
        cmd.args(["-M", "-N", "-f", "-o", "ControlPersist=yes", "-o", "StrictHostKeyChecking=accept-new"])
            .arg(target.destination())
            .stdin(Stdio::null());
        let output = run_with_timeout(cmd, SSH_CONTROL_TIMEOUT, "ssh master").await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!("ssh to {} failed: {}", target, stderr.trim()));
        }
        Ok(())
    }

    async fn is_alive(&self, target: &SshTarget) -> bool {
        let mut cmd = self.base_command(target);
        cmd.args(["-O", "check"]).arg(target.destination()).stdin(Stdio::null());
        matches!(
            run_with_timeout(cmd, SSH_CONTROL_TIMEOUT, "ssh -O check").await,
            Ok(output) if output.status.success()
        )
    }

    async fn disconnect(&self, target: &SshTarget) {
        let mut cmd = self.base_command(target);
        cmd.args(["-O", "exit"]).arg(target.destination()).stdin(Stdio::null());
        if let Err(e) = run_with_timeout(cmd, SSH_CONTROL_TIMEOUT, "ssh -O exit").await {
            tracing::debug!(target = %target, error = %e, "ssh master exit failed");
        }
    }

    fn remote_command(&self, target: &SshTarget, remote: &str) -> tokio::process::Command {
        let mut cmd = self.base_command(target);
        cmd.args(["-o", "ControlMaster=no", "-T"]).arg(target.destination()).arg("--").arg(remote);
        cmd
    }
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod fake {
    use super::{SshTransport, StageFn};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use sdd_core::{ConnectionStatus, SshTarget};
    use std::collections::VecDeque;
    use std::sync::Arc;

    #[derive(Default)]
    struct FakeSshState {
        /// Scripted handshake results, consumed front to back; empty means success.
        script: VecDeque<Result<(), String>>,
        handshakes: u32,
        alive: bool,
        stages: Vec<ConnectionStatus>,
    }

    /// Scripted transport. Remote commands run through the local `sh`.
    #[derive(Clone, Default)]
    pub struct FakeSshTransport {
        inner: Arc<Mutex<FakeSshState>>,
    }

    impl FakeSshTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue the outcome of the next handshake.
        pub fn push_result(&self, result: Result<(), String>) {
            self.inner.lock().script.push_back(result);
        }

        pub fn fail_next(&self, n: usize) {
            for i in 0..n {
                self.push_result(Err(format!("connection refused ({})", i + 1)));
            }
        }

        pub fn handshakes(&self) -> u32 {
            self.inner.lock().handshakes
        }

        pub fn stages(&self) -> Vec<ConnectionStatus> {
            self.inner.lock().stages.clone()
        }

        /// Simulate the shared session dying.
        pub fn drop_session(&self) {
            self.inner.lock().alive = false;
        }
    }

    #[async_trait]
    impl SshTransport for FakeSshTransport {
        async fn handshake(&self, _target: &SshTarget, stage: StageFn<'_>) -> Result<(), String> {
            stage(ConnectionStatus::Authenticating);
            let mut inner = self.inner.lock();
            inner.handshakes += 1;
            inner.stages.push(ConnectionStatus::Authenticating);
            let result = inner.script.pop_front().unwrap_or(Ok(()));
            inner.alive = result.is_ok();
            result
        }

        async fn is_alive(&self, _target: &SshTarget) -> bool {
            self.inner.lock().alive
        }

        async fn disconnect(&self, _target: &SshTarget) {
            self.inner.lock().alive = false;
        }

        fn remote_command(&self, _target: &SshTarget, remote: &str) -> tokio::process::Command {
            let mut cmd = tokio::process::Command::new("sh");
            cmd.arg("-c").arg(remote);
            cmd
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeSshTransport;
