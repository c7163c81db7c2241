// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wiring for one CLI invocation: state lock, providers, supervisor and
//! orchestrator for the selected project.

use crate::config::Config;
use crate::exit_error::{ExitError, EXIT_FAILURE};
use crate::output::OutputFormat;
use anyhow::{Context as _, Result};
use fs2::FileExt;
use sdd_adapters::{ConnectionHandle, OpenSshTransport, ProviderFactory};
use sdd_core::{ExecutionTarget, ProjectRoot, SystemClock};
use sdd_engine::{
    spawn_connection_forwarder, spawn_log_forwarder, AgentCommandBuilder, ErrorCode, EventBus,
    FileLogSink, FsMetadataStore, MetadataStore, Orchestrator, OrchestratorDeps, Supervisor,
    SupervisorDeps,
};
use sdd_storage::{AutoExecStore, PidRecordStore};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;

pub const LOCK_FILE: &str = "supervisor.lock";

/// Exclusive lock on `{state_dir}/supervisor.lock`, held until drop.
#[derive(Debug)]
pub struct StateLock {
    _file: File,
    path: PathBuf,
}

impl StateLock {
    pub fn acquire(state_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(state_dir)
            .with_context(|| format!("creating state directory {}", state_dir.display()))?;
        let path = state_dir.join(LOCK_FILE);
        let file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("opening {}", path.display()))?;
        if file.try_lock_exclusive().is_err() {
            return Err(ExitError::coded(
                ErrorCode::AlreadyRunning,
                format!("another sdd process owns {}", path.display()),
            )
            .into());
        }
        Ok(Self { _file: file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// `--project` value, or the current directory. Relative local paths are
/// resolved against the current directory.
pub fn resolve_project(flag: Option<&str>) -> Result<ProjectRoot> {
    let cwd = std::env::current_dir().context("reading current directory")?;
    let Some(raw) = flag else {
        return Ok(ProjectRoot::local(cwd));
    };
    if raw.starts_with("ssh://") || Path::new(raw).is_absolute() {
        return raw
            .parse::<ProjectRoot>()
            .map_err(|e| anyhow::Error::new(ExitError::new(EXIT_FAILURE, e.to_string())));
    }
    Ok(ProjectRoot::local(cwd.join(raw)))
}

pub struct App {
    pub config: Config,
    pub format: OutputFormat,
    pub bus: EventBus,
    pub providers: Arc<ProviderFactory>,
    pub metadata: Arc<dyn MetadataStore>,
    pub orchestrator: Orchestrator<SystemClock>,
    tasks: Vec<JoinHandle<()>>,
    _lock: StateLock,
}

impl App {
    pub async fn open(
        config: Config,
        state_dir: PathBuf,
        root: ProjectRoot,
        format: OutputFormat,
    ) -> Result<Self> {
        let lock = StateLock::acquire(&state_dir)?;
        let bus = EventBus::new();
        let providers = Arc::new(ProviderFactory::new(config.command_policy()));
        let mut tasks = Vec::new();

        tasks.push(spawn_log_forwarder(&bus, Arc::new(FileLogSink::new(state_dir.join("logs")))));

        if let ExecutionTarget::Ssh(target) = &root.target {
            let control_dir = config.ssh.control_dir.clone().unwrap_or_else(|| state_dir.join("ssh"));
            std::fs::create_dir_all(&control_dir)
                .with_context(|| format!("creating {}", control_dir.display()))?;
            let connection = Arc::new(ConnectionHandle::new(
                target.clone(),
                Arc::new(OpenSshTransport::new(control_dir)),
                config.reconnect_policy(),
            ));
            providers.register_connection(Arc::clone(&connection));
            tasks.push(spawn_connection_forwarder(Arc::clone(&connection), bus.clone()));
            connection
                .connect()
                .await
                .map_err(|e| ExitError::coded(ErrorCode::ConnectionError, e))?;
        }

        let supervisor = Supervisor::open(
            SupervisorDeps {
                providers: Arc::clone(&providers),
                records: PidRecordStore::new(&state_dir),
                bus: bus.clone(),
            },
            SystemClock,
            config.supervisor_config(),
        )
        .await
        .map_err(ExitError::from)?;
        tasks.push(supervisor.spawn_monitor());

        let fs = providers.resolve(&root).map_err(|e| ExitError::coded(ErrorCode::ConnectionError, e))?.fs;
        let metadata: Arc<dyn MetadataStore> = Arc::new(FsMetadataStore::new(fs, root.path()));
        let orchestrator = Orchestrator::open(
            root,
            OrchestratorDeps {
                supervisor,
                metadata: Arc::clone(&metadata),
                sessions: AutoExecStore::new(&state_dir),
                commands: AgentCommandBuilder::new(config.agent_command_config()),
            },
            SystemClock,
        )
        .await;

        tracing::debug!(lock = %lock.path().display(), project = %orchestrator.root(), "sdd ready");
        Ok(Self { config, format, bus, providers, metadata, orchestrator, tasks, _lock: lock })
    }

    pub fn supervisor(&self) -> &Supervisor<SystemClock> {
        self.orchestrator.supervisor()
    }

    pub fn root(&self) -> &ProjectRoot {
        self.orchestrator.root()
    }
}

impl Drop for App {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
