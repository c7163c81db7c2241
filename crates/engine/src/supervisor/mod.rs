// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent execution supervisor.
//!
//! Owns the live agent registry. Spawns agents through the provider bound to
//! their project root, streams their output onto the [`EventBus`], mirrors
//! every handle into a durable [`PidRecord`], and reconciles those records on
//! open so a stale "running" belief never outlives a crash.

mod monitor;
mod pump;
mod reconcile;

pub use reconcile::ReconcileReport;

use crate::{EventBus, SupervisorError};
use parking_lot::Mutex;
use sdd_adapters::{
    ProcessHandle, ProcessProvider, ProcessSignal, ProcessWriter, ProviderError, ProviderFactory,
    SpawnSpec,
};
use sdd_core::{
    conflicts, AgentHandle, AgentId, AgentStatus, Clock, EntityId, Event, Phase, PhaseGroup,
    ProjectRoot,
};
use sdd_storage::{AgentLaunch, PidRecord, PidRecordStore};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// Supervisor tuning.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Idle time after which a running agent is flagged as possibly hung
    pub hang_threshold: Duration,
    pub monitor_interval: Duration,
    /// Minimum spacing between activity-only record writes
    pub persist_interval: Duration,
    pub resume_flag: String,
    /// Input sent on resume when the caller gives none
    pub continue_prompt: String,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            hang_threshold: Duration::from_secs(300),
            monitor_interval: Duration::from_secs(5),
            persist_interval: Duration::from_secs(5),
            resume_flag: "--resume".to_string(),
            continue_prompt: "continue".to_string(),
        }
    }
}

/// Collaborators the supervisor is wired to.
#[derive(Clone)]
pub struct SupervisorDeps {
    pub providers: Arc<ProviderFactory>,
    pub records: PidRecordStore,
    pub bus: EventBus,
}

/// What to launch for one phase of one entity.
#[derive(Debug, Clone)]
pub struct StartRequest {
    pub entity: EntityId,
    pub phase: Phase,
    pub group: PhaseGroup,
    pub root: ProjectRoot,
    pub cwd: PathBuf,
    pub command: String,
    pub args: Vec<String>,
    pub prompt: Option<String>,
    /// Continue an earlier CLI session instead of starting fresh
    pub resume_session_id: Option<String>,
}

impl StartRequest {
    pub fn new(entity: EntityId, phase: Phase, root: ProjectRoot, command: impl Into<String>) -> Self {
        Self {
            cwd: root.path().to_path_buf(),
            entity,
            phase,
            group: phase.group(),
            root,
            command: command.into(),
            args: Vec::new(),
            prompt: None,
            resume_session_id: None,
        }
    }

    sdd_core::setters! {
        into { cwd: PathBuf }
        set { args: Vec<String>, group: PhaseGroup }
        option { prompt: String, resume_session_id: String }
    }
}

struct AgentEntry {
    handle: AgentHandle,
    launch: AgentLaunch,
    /// Provider the process was spawned on; signals go back through it
    process: Option<Arc<dyn ProcessProvider>>,
    stdin: Option<Arc<tokio::sync::Mutex<ProcessWriter>>>,
    stop_requested: bool,
    /// Output and exit are observed by a pump task. Adopted agents are polled.
    pumped: bool,
    /// Bumped on resume so a previous run's pump cannot touch the new one
    run: u64,
    last_persist_ms: u64,
}

impl AgentEntry {
    fn new(handle: AgentHandle, launch: AgentLaunch, now_ms: u64) -> Self {
        Self {
            handle,
            launch,
            process: None,
            stdin: None,
            stop_requested: false,
            pumped: false,
            run: 0,
            last_persist_ms: now_ms,
        }
    }

    fn reset_process(&mut self) {
        self.process = None;
        self.stdin = None;
        self.stop_requested = false;
        self.pumped = false;
    }
}

/// How an agent stopped being observed.
pub(crate) enum Termination {
    Exited(Option<i32>),
    Lost(String),
}

/// A record captured under the registry lock, written once the lock is released.
#[must_use]
struct StagedRecord {
    seq: u64,
    record: PidRecord,
}

/// Undo information for a reserved registry slot.
enum Reservation {
    Fresh,
    Resumed(AgentHandle),
}

struct Inner<C: Clock> {
    providers: Arc<ProviderFactory>,
    records: PidRecordStore,
    bus: EventBus,
    clock: C,
    config: SupervisorConfig,
    agents: Mutex<HashMap<AgentId, AgentEntry>>,
    persist_seq: AtomicU64,
    /// Newest sequence written per record file; serializes writes
    written: Mutex<HashMap<PathBuf, u64>>,
}

#[derive(Clone)]
pub struct Supervisor<C: Clock> {
    inner: Arc<Inner<C>>,
}

fn find_conflict(
    agents: &HashMap<AgentId, AgentEntry>,
    entity: &EntityId,
    requested: (Phase, PhaseGroup),
    except: Option<&AgentId>,
) -> Option<AgentId> {
    agents
        .values()
        .filter(|e| e.handle.is_running() && e.handle.entity == *entity)
        .filter(|e| except != Some(&e.handle.agent_id))
        .find(|e| conflicts((e.handle.phase, e.handle.group), requested))
        .map(|e| e.handle.agent_id.clone())
}

fn status_event(handle: &AgentHandle) -> Event {
    Event::AgentStatusChanged {
        agent_id: handle.agent_id.clone(),
        entity: handle.entity.clone(),
        phase: handle.phase,
        status: handle.status,
        exit_code: handle.exit_code,
    }
}

impl<C: Clock> Inner<C> {
    /// Snapshot the entry for [`Inner::persist`]. Call with the registry lock held.
    fn stage(&self, entry: &mut AgentEntry, now_ms: u64) -> StagedRecord {
        entry.last_persist_ms = now_ms;
        StagedRecord {
            seq: self.persist_seq.fetch_add(1, Ordering::Relaxed),
            record: PidRecord::from_handle(&entry.handle, entry.launch.clone()),
        }
    }

    /// Write a staged record unless a newer one for the same file already
    /// landed. Never call with the registry lock held.
    fn persist(&self, staged: StagedRecord) {
        let StagedRecord { seq, record } = staged;
        let path = self.records.path_for(&record.entity, record.phase);
        let mut written = self.written.lock();
        if written.get(&path).is_some_and(|&newest| newest > seq) {
            tracing::trace!(agent_id = %record.agent_id, seq, "skipping superseded pid record");
            return;
        }
        match self.records.save(&record) {
            Ok(()) => {
                written.insert(path, seq);
            }
            Err(e) => tracing::warn!(agent_id = %record.agent_id, error = %e, "failed to persist pid record"),
        }
    }

    fn release(&self, agent_id: &AgentId, reservation: Reservation) {
        let mut agents = self.agents.lock();
        match reservation {
            Reservation::Fresh => {
                agents.remove(agent_id);
            }
            Reservation::Resumed(previous) => {
                if let Some(entry) = agents.get_mut(agent_id) {
                    entry.handle = previous;
                    entry.reset_process();
                }
            }
        }
    }

    /// Move a running agent to its terminal status. No-op if already terminal
    /// or if `run` names a superseded run.
    async fn conclude(&self, agent_id: &AgentId, run: Option<u64>, termination: Termination) {
        let now = self.clock.epoch_ms();
        let (event, staged) = {
            let mut agents = self.agents.lock();
            let Some(entry) = agents.get_mut(agent_id) else {
                return;
            };
            if !entry.handle.is_running() || run.is_some_and(|r| r != entry.run) {
                return;
            }
            let (status, exit_code) = match &termination {
                Termination::Exited(code) => {
                    (AgentStatus::from_exit(*code, entry.stop_requested), *code)
                }
                Termination::Lost(_) => (AgentStatus::Interrupted, None),
            };
            entry.handle.status = status;
            entry.handle.exit_code = exit_code;
            entry.handle.hang_suspected = false;
            entry.stdin = None;
            (status_event(&entry.handle), self.stage(entry, now))
        };
        self.persist(staged);

        match termination {
            Termination::Exited(code) => {
                tracing::info!(agent_id = %agent_id, exit_code = ?code, event = %event.log_summary(), "agent exited")
            }
            Termination::Lost(reason) => {
                tracing::info!(agent_id = %agent_id, reason = %reason, "agent marked interrupted")
            }
        }
        self.bus.publish(event).await;
    }
}

impl<C: Clock> Supervisor<C> {
    /// Open the supervisor. Reconciliation of persisted records completes
    /// before this returns.
    pub async fn open(
        deps: SupervisorDeps,
        clock: C,
        config: SupervisorConfig,
    ) -> Result<Self, SupervisorError> {
        let supervisor = Self {
            inner: Arc::new(Inner {
                providers: deps.providers,
                records: deps.records,
                bus: deps.bus,
                clock,
                config,
                agents: Mutex::new(HashMap::new()),
                persist_seq: AtomicU64::new(0),
                written: Mutex::new(HashMap::new()),
            }),
        };
        let report = supervisor.reconcile().await?;
        tracing::info!(
            interrupted = report.interrupted.len(),
            adopted = report.adopted.len(),
            restored = report.restored,
            "supervisor opened"
        );
        Ok(supervisor)
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.inner.config
    }

    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    pub fn providers(&self) -> &Arc<ProviderFactory> {
        &self.inner.providers
    }

    /// Spawn an agent, rejecting with `AlreadyRunning` when a conflicting
    /// group is live for the entity.
    pub async fn start(&self, req: StartRequest) -> Result<AgentHandle, SupervisorError> {
        let now = self.inner.clock.epoch_ms();
        let handle = AgentHandle {
            agent_id: AgentId::new(),
            entity: req.entity,
            phase: req.phase,
            group: req.group,
            pid: None,
            session_id: req.resume_session_id.clone(),
            status: AgentStatus::Running,
            started_at_ms: now,
            last_activity_at_ms: now,
            exit_code: None,
            hang_suspected: false,
        };
        let launch = AgentLaunch {
            root: req.root,
            command: req.command,
            args: req.args,
            prompt: req.prompt,
            cwd: req.cwd,
        };

        let mut args = launch.args.clone();
        if let Some(session_id) = &req.resume_session_id {
            args.push(self.inner.config.resume_flag.clone());
            args.push(session_id.clone());
        }
        if let Some(prompt) = &launch.prompt {
            args.push(prompt.clone());
        }

        let agent_id = handle.agent_id.clone();
        {
            let mut agents = self.inner.agents.lock();
            if let Some(running) =
                find_conflict(&agents, &handle.entity, (handle.phase, handle.group), None)
            {
                return Err(SupervisorError::AlreadyRunning {
                    entity: handle.entity,
                    phase: handle.phase,
                    running,
                });
            }
            // A new run supersedes the terminal record for the same phase
            agents.retain(|_, e| !(e.handle.entity == handle.entity && e.handle.phase == handle.phase));
            agents.insert(agent_id.clone(), AgentEntry::new(handle, launch, now));
        }

        self.launch(&agent_id, args, Reservation::Fresh).await
    }

    /// Re-spawn an interrupted agent, continuing its CLI session.
    pub async fn resume(
        &self,
        agent_id: &AgentId,
        input: Option<String>,
    ) -> Result<AgentHandle, SupervisorError> {
        let now = self.inner.clock.epoch_ms();
        let (previous, session_id, launch) = {
            let mut agents = self.inner.agents.lock();
            let entry =
                agents.get(agent_id).ok_or_else(|| SupervisorError::NotFound(agent_id.clone()))?;
            let handle = &entry.handle;
            if !handle.is_resumable() {
                let reason = match (handle.status, &handle.session_id) {
                    (AgentStatus::Interrupted, None) => "no session id recorded".to_string(),
                    (status, _) => format!("status is {status}"),
                };
                return Err(SupervisorError::NotResumable { agent_id: agent_id.clone(), reason });
            }
            if let Some(running) =
                find_conflict(&agents, &handle.entity, (handle.phase, handle.group), Some(agent_id))
            {
                return Err(SupervisorError::AlreadyRunning {
                    entity: handle.entity.clone(),
                    phase: handle.phase,
                    running,
                });
            }

            let Some(entry) = agents.get_mut(agent_id) else {
                return Err(SupervisorError::NotFound(agent_id.clone()));
            };
            let previous = entry.handle.clone();
            let session_id = entry.handle.session_id.clone().unwrap_or_default();
            entry.handle.status = AgentStatus::Running;
            entry.handle.pid = None;
            entry.handle.exit_code = None;
            entry.handle.hang_suspected = false;
            entry.handle.last_activity_at_ms = now;
            entry.reset_process();
            entry.run += 1;
            (previous, session_id, entry.launch.clone())
        };

        let mut args = launch.args;
        args.push(self.inner.config.resume_flag.clone());
        args.push(session_id);
        args.push(input.unwrap_or_else(|| self.inner.config.continue_prompt.clone()));
        self.launch(agent_id, args, Reservation::Resumed(previous)).await
    }

    async fn launch(
        &self,
        agent_id: &AgentId,
        args: Vec<String>,
        reservation: Reservation,
    ) -> Result<AgentHandle, SupervisorError> {
        let launch = self.inner.agents.lock().get(agent_id).map(|e| e.launch.clone());
        let Some(launch) = launch else {
            return Err(SupervisorError::NotFound(agent_id.clone()));
        };

        let spec = SpawnSpec::new(launch.command.clone(), launch.cwd.clone()).args(args);
        let command = spec.display();
        let spawned = match self.inner.providers.resolve(&launch.root) {
            Ok(pair) => pair.process.spawn(spec).await.map(|h| (pair.process, h)),
            Err(e) => Err(e),
        };
        let (process, child) = match spawned {
            Ok(spawned) => spawned,
            Err(e) => {
                tracing::error!(agent_id = %agent_id, root = %launch.root, command = %command, error = %e, "failed to spawn agent");
                self.inner.release(agent_id, reservation);
                return Err(e.into());
            }
        };

        let ProcessHandle { pid, stdout, stderr, stdin, exit } = child;
        let now = self.inner.clock.epoch_ms();
        let (handle, run, staged) = {
            let mut agents = self.inner.agents.lock();
            let Some(entry) = agents.get_mut(agent_id) else {
                return Err(SupervisorError::NotFound(agent_id.clone()));
            };
            entry.handle.pid = Some(pid);
            entry.process = Some(process);
            entry.stdin = stdin.map(|w| Arc::new(tokio::sync::Mutex::new(w)));
            entry.pumped = true;
            (entry.handle.clone(), entry.run, self.inner.stage(entry, now))
        };
        self.inner.persist(staged);

        tracing::info!(
            agent_id = %agent_id,
            entity = %handle.entity,
            phase = %handle.phase,
            pid,
            command = %command,
            "agent started"
        );
        self.inner.bus.publish(status_event(&handle)).await;
        pump::spawn(Arc::clone(&self.inner), agent_id.clone(), run, stdout, stderr, exit);
        Ok(handle)
    }

    /// Request termination. Completion is reported by a later status event.
    pub async fn stop(&self, agent_id: &AgentId) -> Result<(), SupervisorError> {
        let (pid, process, root, pumped) = {
            let mut agents = self.inner.agents.lock();
            let entry = agents
                .get_mut(agent_id)
                .ok_or_else(|| SupervisorError::NotFound(agent_id.clone()))?;
            if !entry.handle.is_running() {
                return Err(SupervisorError::NotRunning(agent_id.clone()));
            }
            let Some(pid) = entry.handle.pid else {
                return Err(SupervisorError::InvalidState {
                    agent_id: agent_id.clone(),
                    message: "agent is still starting".to_string(),
                });
            };
            entry.stop_requested = true;
            (pid, entry.process.clone(), entry.launch.root.clone(), entry.pumped)
        };

        let process = match process {
            Some(process) => Ok(process),
            None => self.inner.providers.resolve(&root).map(|pair| pair.process),
        };
        let result = match process {
            Ok(process) => process.signal(pid, ProcessSignal::Terminate).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                tracing::info!(agent_id = %agent_id, pid, "stop requested");
                Ok(())
            }
            Err(e @ (ProviderError::ChannelClosed(_) | ProviderError::NoConnection(_))) => {
                tracing::warn!(agent_id = %agent_id, pid, error = %e, "channel gone, presuming agent dead");
                self.inner.conclude(agent_id, None, Termination::Lost(e.to_string())).await;
                Ok(())
            }
            Err(ProviderError::NoSuchProcess(_)) => {
                if !pumped {
                    self.inner.conclude(agent_id, None, Termination::Lost("no such process".into())).await;
                }
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Write `text` to the agent's stdin.
    pub async fn send_input(&self, agent_id: &AgentId, text: &str) -> Result<(), SupervisorError> {
        let stdin = {
            let agents = self.inner.agents.lock();
            let entry =
                agents.get(agent_id).ok_or_else(|| SupervisorError::NotFound(agent_id.clone()))?;
            if !entry.handle.is_running() {
                return Err(SupervisorError::NotRunning(agent_id.clone()));
            }
            entry.stdin.clone().ok_or_else(|| SupervisorError::NotRunning(agent_id.clone()))?
        };

        let mut writer = stdin.lock().await;
        let result = match writer.write_all(text.as_bytes()).await {
            Ok(()) => writer.flush().await,
            Err(e) => Err(e),
        };
        result.map_err(|e| match e.kind() {
            std::io::ErrorKind::BrokenPipe => SupervisorError::NotRunning(agent_id.clone()),
            _ => SupervisorError::InvalidState { agent_id: agent_id.clone(), message: e.to_string() },
        })
    }

    pub fn get_agent(&self, agent_id: &AgentId) -> Option<AgentHandle> {
        self.inner.agents.lock().get(agent_id).map(|e| e.handle.clone())
    }

    pub fn get_agents(&self, entity: &EntityId) -> Vec<AgentHandle> {
        let mut handles: Vec<AgentHandle> = self
            .inner
            .agents
            .lock()
            .values()
            .filter(|e| e.handle.entity == *entity)
            .map(|e| e.handle.clone())
            .collect();
        handles.sort_by_key(|h| h.started_at_ms);
        handles
    }

    pub fn get_all_agents(&self) -> Vec<AgentHandle> {
        let mut handles: Vec<AgentHandle> =
            self.inner.agents.lock().values().map(|e| e.handle.clone()).collect();
        handles.sort_by_key(|h| h.started_at_ms);
        handles
    }

    /// Forget a terminal agent and delete its record.
    pub fn acknowledge(&self, agent_id: &AgentId) -> Result<AgentHandle, SupervisorError> {
        let mut agents = self.inner.agents.lock();
        let entry =
            agents.get(agent_id).ok_or_else(|| SupervisorError::NotFound(agent_id.clone()))?;
        if entry.handle.is_running() {
            return Err(SupervisorError::InvalidState {
                agent_id: agent_id.clone(),
                message: "cannot acknowledge a running agent".to_string(),
            });
        }
        let handle = entry.handle.clone();
        self.inner.records.remove(&handle.entity, handle.phase)?;
        agents.remove(agent_id);
        tracing::info!(agent_id = %agent_id, status = %handle.status, "agent acknowledged");
        Ok(handle)
    }
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
