// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Auto-execution orchestrator.
//!
//! Drives one project's entities through the phase sequence. Each entity
//! has a persisted [`AutoExecutionSession`]; agent status events from the
//! supervisor move it forward, so a restart can pick the continuation back
//! up from disk instead of losing an in-memory wait.
//!
//! All transitions for an entity run under that entity's lock.

mod advance;
pub mod verdict;

use crate::command::AgentCommandBuilder;
use crate::metadata::MetadataStore;
use crate::supervisor::{StartRequest, Supervisor};
use crate::{OrchestratorError, Subscription};
use parking_lot::Mutex;
use sdd_core::worktree::build_main_entity_path;
use sdd_core::{
    AgentHandle, AgentId, AgentStatus, AutoExecutionOutcome, AutoExecutionSession,
    AutoExecutionStatus, Clock, EntityId, Event, Permissions, Phase, PhasePermission, ProjectRoot,
    WorkKind,
};
use sdd_storage::AutoExecStore;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;

/// Collaborators the orchestrator is wired to.
pub struct OrchestratorDeps<C: Clock> {
    pub supervisor: Supervisor<C>,
    pub metadata: Arc<dyn MetadataStore>,
    pub sessions: AutoExecStore,
    pub commands: AgentCommandBuilder,
}

struct Inner<C: Clock> {
    root: ProjectRoot,
    supervisor: Supervisor<C>,
    metadata: Arc<dyn MetadataStore>,
    sessions: AutoExecStore,
    commands: AgentCommandBuilder,
    clock: C,
    locks: Mutex<HashMap<EntityId, Arc<tokio::sync::Mutex<()>>>>,
    /// Manually executed phases awaiting their agent
    manual: Mutex<HashMap<AgentId, Phase>>,
    events: Mutex<Option<JoinHandle<()>>>,
}

impl<C: Clock> Drop for Inner<C> {
    fn drop(&mut self) {
        if let Some(task) = self.events.lock().take() {
            task.abort();
        }
    }
}

#[derive(Clone)]
pub struct Orchestrator<C: Clock> {
    inner: Arc<Inner<C>>,
}

impl<C: Clock> Inner<C> {
    fn entity_lock(&self, entity: &EntityId) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(self.locks.lock().entry(entity.clone()).or_default())
    }

    fn load(&self, entity: &EntityId) -> Result<AutoExecutionSession, OrchestratorError> {
        self.sessions.load(entity)?.ok_or_else(|| OrchestratorError::NoSession(entity.clone()))
    }

    /// Working directory for an entity's agents: its worktree when it has one.
    async fn agent_cwd(&self, entity: &EntityId) -> Result<PathBuf, OrchestratorError> {
        Ok(match self.metadata.read_worktree_config(entity).await? {
            Some(worktree) if worktree.path.is_absolute() => worktree.path,
            Some(worktree) => self.root.path().join(worktree.path),
            None => self.root.path().to_path_buf(),
        })
    }

    async fn read_artifact(&self, entity: &EntityId, file: &str) -> Result<String, OrchestratorError> {
        let cwd = self.agent_cwd(entity).await?;
        let path = build_main_entity_path(&cwd, entity.kind, &entity.name).join(file);
        let fs = self.supervisor.providers().resolve(&self.root)?.fs;
        Ok(fs.read_to_string(&path).await?)
    }

    async fn spawn_work(
        &self,
        entity: &EntityId,
        phase: Phase,
        work: WorkKind,
    ) -> Result<AgentHandle, OrchestratorError> {
        let command = self.commands.for_work(entity, phase, work);
        let request = StartRequest::new(entity.clone(), phase, self.root.clone(), command.program)
            .cwd(self.agent_cwd(entity).await?)
            .args(command.args)
            .prompt(command.prompt);
        Ok(self.supervisor.start(request).await?)
    }

    /// Record a generated artifact and announce it.
    async fn mark_generated(&self, entity: &EntityId, phase: Phase) -> Result<(), OrchestratorError> {
        self.metadata.mark_generated(entity, phase).await?;
        self.supervisor
            .bus()
            .publish(Event::PhaseGenerated { entity: entity.clone(), phase })
            .await;
        Ok(())
    }

    /// Persist and announce a session.
    async fn commit(&self, session: &mut AutoExecutionSession) -> Result<(), OrchestratorError> {
        session.updated_at_ms = self.clock.epoch_ms();
        self.sessions.save(session)?;
        tracing::info!(
            entity = %session.entity,
            status = %session.status,
            phase = ?session.current_phase,
            "auto-execution state"
        );
        self.supervisor
            .bus()
            .publish(Event::AutoExecutionStatusChanged { session: Box::new(session.clone()) })
            .await;
        Ok(())
    }

    /// Record the outcome of a transition. An error halts the session.
    async fn settle(
        &self,
        session: &mut AutoExecutionSession,
        result: Result<(), OrchestratorError>,
    ) -> Result<(), OrchestratorError> {
        if let Err(e) = &result {
            tracing::error!(entity = %session.entity, error = %e, "auto-execution halted");
            session.fail(e.to_string(), self.clock.epoch_ms());
        }
        self.commit(session).await?;
        result
    }

    async fn on_agent_finished(&self, agent_id: AgentId, entity: EntityId, status: AgentStatus) {
        let lock = self.entity_lock(&entity);
        let _guard = lock.lock().await;

        let manual = self.manual.lock().remove(&agent_id);
        if let Some(phase) = manual {
            tracing::info!(agent_id = %agent_id, entity = %entity, phase = %phase, status = %status, "phase run finished");
            if status == AgentStatus::Completed {
                if let Err(e) = self.mark_generated(&entity, phase).await {
                    tracing::warn!(entity = %entity, phase = %phase, error = %e, "failed to record generated phase");
                }
            }
            return;
        }

        let session = match self.sessions.load(&entity) {
            Ok(Some(session)) => session,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(entity = %entity, error = %e, "failed to load auto-execution session");
                return;
            }
        };
        if session.status != AutoExecutionStatus::Running
            || session.awaiting.as_ref().map(|a| &a.agent_id) != Some(&agent_id)
        {
            return;
        }
        if let Err(e) = self.complete(session, status).await {
            tracing::warn!(entity = %entity, agent_id = %agent_id, error = %e, "auto-execution transition failed");
        }
    }

    /// Rebind or pause sessions that were running when the process exited.
    async fn recover(&self) {
        for mut session in self.sessions.load_all() {
            if session.status != AutoExecutionStatus::Running {
                continue;
            }
            let lock = self.entity_lock(&session.entity);
            let _guard = lock.lock().await;

            let agent = session
                .awaiting
                .as_ref()
                .map(|a| (a.agent_id.clone(), self.supervisor.get_agent(&a.agent_id)));
            let result = match agent {
                Some((agent_id, Some(handle))) if handle.is_running() => {
                    tracing::info!(entity = %session.entity, agent_id = %agent_id, "rebound auto-execution to running agent");
                    continue;
                }
                Some((_, Some(handle))) => self.complete(session, handle.status).await,
                Some((agent_id, None)) => {
                    session.pause(self.clock.epoch_ms());
                    session.last_error = Some(format!("agent {agent_id} was lost across restart"));
                    self.commit(&mut session).await
                }
                None => {
                    session.pause(self.clock.epoch_ms());
                    self.commit(&mut session).await
                }
            };
            if let Err(e) = result {
                tracing::warn!(error = %e, "failed to recover auto-execution session");
            }
        }
    }
}

async fn run_events<C: Clock>(inner: Weak<Inner<C>>, mut events: Subscription) {
    while let Some(event) = events.recv().await {
        let Event::AgentStatusChanged { agent_id, entity, status, .. } = event else {
            continue;
        };
        if !status.is_terminal() {
            continue;
        }
        let Some(inner) = inner.upgrade() else {
            break;
        };
        tokio::spawn(async move { inner.on_agent_finished(agent_id, entity, status).await });
    }
}

impl<C: Clock> Orchestrator<C> {
    /// Open the orchestrator for one project and recover persisted sessions.
    pub async fn open(root: ProjectRoot, deps: OrchestratorDeps<C>, clock: C) -> Self {
        let inner = Arc::new(Inner {
            root,
            supervisor: deps.supervisor,
            metadata: deps.metadata,
            sessions: deps.sessions,
            commands: deps.commands,
            clock,
            locks: Mutex::new(HashMap::new()),
            manual: Mutex::new(HashMap::new()),
            events: Mutex::new(None),
        });
        let events = inner.supervisor.bus().on_agent_status();
        *inner.events.lock() = Some(tokio::spawn(run_events(Arc::downgrade(&inner), events)));
        inner.recover().await;
        Self { inner }
    }

    pub fn root(&self) -> &ProjectRoot {
        &self.inner.root
    }

    pub fn supervisor(&self) -> &Supervisor<C> {
        &self.inner.supervisor
    }

    /// Run one phase outside auto-execution. Its upstream must be generated.
    pub async fn execute_phase(
        &self,
        entity: &EntityId,
        phase: Phase,
    ) -> Result<AgentHandle, OrchestratorError> {
        let lock = self.inner.entity_lock(entity);
        let _guard = lock.lock().await;

        let states = self.inner.metadata.read_phase_state(entity).await?;
        if let Some(upstream) = phase.upstream().filter(|up| !states.get(*up).is_generated()) {
            return Err(OrchestratorError::UpstreamNotReady { entity: entity.clone(), phase, upstream });
        }
        let handle = self.inner.spawn_work(entity, phase, WorkKind::Phase).await?;
        self.inner.manual.lock().insert(handle.agent_id.clone(), phase);
        Ok(handle)
    }

    /// Approve a generated phase.
    pub async fn approve_phase(&self, entity: &EntityId, phase: Phase) -> Result<(), OrchestratorError> {
        let states = self.inner.metadata.read_phase_state(entity).await?;
        if !states.get(phase).is_generated() {
            return Err(OrchestratorError::NotGenerated { entity: entity.clone(), phase });
        }
        self.inner.metadata.write_approval(entity, phase, true).await?;
        tracing::info!(entity = %entity, phase = %phase, "phase approved");
        Ok(())
    }

    pub async fn start_auto_execution(
        &self,
        entity: &EntityId,
        permissions: Permissions,
    ) -> Result<AutoExecutionSession, OrchestratorError> {
        let lock = self.inner.entity_lock(entity);
        let _guard = lock.lock().await;

        if let Some(existing) = self.inner.sessions.load(entity)?.filter(|s| s.status.is_active()) {
            return Err(OrchestratorError::AlreadyActive {
                entity: entity.clone(),
                status: existing.status,
            });
        }
        let mut session =
            AutoExecutionSession::start(entity.clone(), permissions, self.inner.clock.epoch_ms());
        tracing::info!(entity = %entity, "auto-execution started");
        let result = self.inner.advance(&mut session).await;
        self.inner.settle(&mut session, result).await?;
        Ok(session)
    }

    /// Stop the session. The in-flight agent is stopped best-effort.
    pub async fn stop_auto_execution(
        &self,
        entity: &EntityId,
    ) -> Result<AutoExecutionSession, OrchestratorError> {
        let lock = self.inner.entity_lock(entity);
        let _guard = lock.lock().await;

        let mut session = self.inner.load(entity)?;
        if !session.status.is_active() {
            return Err(OrchestratorError::InvalidState {
                entity: entity.clone(),
                message: format!("session is {}", session.status),
            });
        }
        if let Some(awaiting) = session.awaiting.take() {
            if let Err(e) = self.inner.supervisor.stop(&awaiting.agent_id).await {
                tracing::warn!(entity = %entity, agent_id = %awaiting.agent_id, error = %e, "failed to stop awaited agent");
            }
        }
        session.finish(AutoExecutionOutcome::Stopped, self.inner.clock.epoch_ms());
        self.inner.commit(&mut session).await?;
        Ok(session)
    }

    /// Continue a paused or failed session from the first unfinished phase.
    pub async fn resume_auto_execution(
        &self,
        entity: &EntityId,
    ) -> Result<AutoExecutionSession, OrchestratorError> {
        let lock = self.inner.entity_lock(entity);
        let _guard = lock.lock().await;

        let mut session = self.inner.load(entity)?;
        if !matches!(session.status, AutoExecutionStatus::Paused | AutoExecutionStatus::Error) {
            return Err(OrchestratorError::InvalidState {
                entity: entity.clone(),
                message: format!("cannot resume a {} session", session.status),
            });
        }
        session.status = AutoExecutionStatus::Running;
        session.last_error = None;
        session.outcome = None;
        tracing::info!(entity = %entity, "auto-execution resumed");
        let result = self.inner.advance(&mut session).await;
        self.inner.settle(&mut session, result).await?;
        Ok(session)
    }

    /// Toggle one phase's permission. Setting `run` on the phase a session
    /// is paused at restarts it.
    pub async fn set_permission(
        &self,
        entity: &EntityId,
        phase: Phase,
        permission: PhasePermission,
    ) -> Result<AutoExecutionSession, OrchestratorError> {
        let lock = self.inner.entity_lock(entity);
        let _guard = lock.lock().await;

        let mut session = self.inner.load(entity)?;
        session.permissions.set(phase, permission);
        let restart = permission == PhasePermission::Run
            && session.status == AutoExecutionStatus::Paused
            && session.current_phase == Some(phase);
        let result = if restart {
            session.status = AutoExecutionStatus::Running;
            self.inner.advance(&mut session).await
        } else {
            Ok(())
        };
        self.inner.settle(&mut session, result).await?;
        Ok(session)
    }

    /// Run the fix agent for the latest NOGO inspection round.
    pub async fn fix_inspection(
        &self,
        entity: &EntityId,
    ) -> Result<AutoExecutionSession, OrchestratorError> {
        let lock = self.inner.entity_lock(entity);
        let _guard = lock.lock().await;

        let mut session = self.inner.load(entity)?;
        let not_fixable =
            |reason: &str| OrchestratorError::NotFixable { entity: entity.clone(), reason: reason.to_string() };
        let round = session.inspection.blocking_round().ok_or_else(|| not_fixable("no unfixed NOGO round"))?;
        if session.awaiting.is_some() {
            return Err(not_fixable("an agent is already running for this session"));
        }
        session.status = AutoExecutionStatus::Running;
        session.last_error = None;
        session.outcome = None;
        let result = self.inner.launch(&mut session, Phase::Inspection, WorkKind::InspectionFix(round)).await;
        self.inner.settle(&mut session, result).await?;
        Ok(session)
    }

    /// Current session, or an idle one if the entity never ran.
    pub fn get_auto_execution_status(
        &self,
        entity: &EntityId,
    ) -> Result<AutoExecutionSession, OrchestratorError> {
        Ok(self
            .inner
            .sessions
            .load(entity)?
            .unwrap_or_else(|| AutoExecutionSession::idle(entity.clone())))
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
