// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::metadata::FakeMetadataStore;
use crate::supervisor::{SupervisorConfig, SupervisorDeps};
use crate::{ErrorCode, EventBus};
use sdd_adapters::{
    CommandPolicy, FakeFileSystem, FakeProcessProvider, ProviderError, ProviderFactory, ProviderPair,
};
use sdd_core::{
    AwaitingAgent, FakeClock, InspectionVerdict, PhaseState, ReviewStatus, WorktreeConfig,
};
use sdd_storage::PidRecordStore;
use std::time::Duration;
use tempfile::TempDir;

struct Harness {
    orchestrator: Orchestrator<FakeClock>,
    process: FakeProcessProvider,
    fs: FakeFileSystem,
    metadata: FakeMetadataStore,
    bus: EventBus,
    dir: TempDir,
}

async fn open_in(dir: TempDir, metadata: FakeMetadataStore) -> Harness {
    let process = FakeProcessProvider::new();
    let fs = FakeFileSystem::new();
    let pair = ProviderPair::new(Arc::new(process.clone()), Arc::new(fs.clone()));
    let providers = Arc::new(ProviderFactory::with_local(pair, CommandPolicy::default()));
    let bus = EventBus::new();
    let clock = FakeClock::new();
    let deps = SupervisorDeps {
        providers,
        records: PidRecordStore::new(&dir.path().join("records")),
        bus: bus.clone(),
    };
    let supervisor = Supervisor::open(deps, clock.clone(), SupervisorConfig::default()).await.unwrap();
    let deps = OrchestratorDeps {
        supervisor,
        metadata: Arc::new(metadata.clone()),
        sessions: AutoExecStore::new(&dir.path().join("auto")),
        commands: AgentCommandBuilder::default(),
    };
    let orchestrator = Orchestrator::open(ProjectRoot::local("/p"), deps, clock).await;
    Harness { orchestrator, process, fs, metadata, bus, dir }
}

async fn harness() -> Harness {
    open_in(TempDir::new().unwrap(), FakeMetadataStore::new()).await
}

fn auth() -> EntityId {
    EntityId::spec("auth")
}

impl Harness {
    fn set_states(&self, phases: &[(Phase, PhaseState)]) {
        for (phase, state) in phases {
            self.metadata.set_state(&auth(), *phase, *state);
        }
    }

    fn status(&self) -> AutoExecutionSession {
        self.orchestrator.get_auto_execution_status(&auth()).unwrap()
    }

    fn awaiting(&self) -> AwaitingAgent {
        self.status().awaiting.unwrap()
    }

    fn pid_of(&self, agent_id: &AgentId) -> u32 {
        self.orchestrator.supervisor().get_agent(agent_id).unwrap().pid.unwrap()
    }

    /// Exit the awaited agent and wait until the session moves past it.
    async fn finish_awaited(&self, code: i32) -> AutoExecutionSession {
        let awaited = self.awaiting().agent_id;
        self.process.exit(self.pid_of(&awaited), Some(code));
        self.wait_until(|s| s.awaiting.as_ref().map(|a| &a.agent_id) != Some(&awaited)).await
    }

    async fn wait_until(&self, check: impl Fn(&AutoExecutionSession) -> bool) -> AutoExecutionSession {
        for _ in 0..500 {
            let session = self.status();
            if check(&session) {
                return session;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("session never reached expected state: {:?}", self.status());
    }

    fn last_prompt(&self) -> String {
        self.process.last_spawn().unwrap().spec.args.last().cloned().unwrap()
    }

    fn artifact(&self, file: &str, contents: &str) {
        self.fs.insert(format!("/p/.kiro/specs/auth/{file}"), contents);
    }
}

#[tokio::test]
async fn manual_phase_run_generates_then_approves() {
    let h = harness().await;
    let entity = auth();
    let mut generated = h.bus.subscribe(|e| matches!(e, Event::PhaseGenerated { .. }));

    let requirements = h.orchestrator.execute_phase(&entity, Phase::Requirements).await.unwrap();
    assert_eq!(h.last_prompt(), "/kiro:spec-requirements auth");
    h.process.exit(requirements.pid.unwrap(), Some(0));
    let event = tokio::time::timeout(Duration::from_secs(5), generated.recv()).await.unwrap().unwrap();
    assert_eq!(event, Event::PhaseGenerated { entity: entity.clone(), phase: Phase::Requirements });
    assert_eq!(h.metadata.state(&entity, Phase::Requirements), PhaseState::Generated);
    drop(generated);

    h.orchestrator.approve_phase(&entity, Phase::Requirements).await.unwrap();
    assert_eq!(h.metadata.state(&entity, Phase::Requirements), PhaseState::Approved);

    h.orchestrator.execute_phase(&entity, Phase::Design).await.unwrap();
    let err = h.orchestrator.execute_phase(&entity, Phase::Design).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::AlreadyRunning);
}

#[tokio::test]
async fn manual_gates() {
    let h = harness().await;
    let entity = auth();

    let err = h.orchestrator.execute_phase(&entity, Phase::Design).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::UpstreamNotReady { upstream: Phase::Requirements, .. }));
    assert!(h.process.spawns().is_empty());

    let err = h.orchestrator.approve_phase(&entity, Phase::Requirements).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::NotGenerated { .. }));
}

#[tokio::test]
async fn failed_manual_run_stays_pending() {
    let h = harness().await;
    let entity = auth();
    let handle = h.orchestrator.execute_phase(&entity, Phase::Requirements).await.unwrap();
    let mut status = h.bus.on_agent_status();
    h.process.exit(handle.pid.unwrap(), Some(1));
    while let Some(event) = status.recv().await {
        if matches!(event, Event::AgentStatusChanged { status: AgentStatus::Failed, .. }) {
            break;
        }
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.metadata.state(&entity, Phase::Requirements), PhaseState::Pending);
}

#[tokio::test]
async fn auto_execution_runs_permitted_phases_and_pauses() {
    let h = harness().await;
    let mut announcements = h.bus.on_auto_execution_status();

    let session = h
        .orchestrator
        .start_auto_execution(&auth(), Permissions::running(&[Phase::Requirements, Phase::Design]))
        .await
        .unwrap();
    assert_eq!(session.status, AutoExecutionStatus::Running);
    assert_eq!(session.current_phase, Some(Phase::Requirements));
    assert!(matches!(announcements.try_recv(), Some(Event::AutoExecutionStatusChanged { .. })));
    assert_eq!(h.last_prompt(), "/kiro:spec-requirements auth");

    let session = h.finish_awaited(0).await;
    assert_eq!(session.current_phase, Some(Phase::Design));
    assert_eq!(h.last_prompt(), "/kiro:spec-design auth");
    assert_eq!(h.metadata.approvals(), vec![(auth(), Phase::Requirements, true)]);

    let session = h.finish_awaited(0).await;
    assert_eq!(session.status, AutoExecutionStatus::Paused);
    assert_eq!(session.current_phase, Some(Phase::Tasks));
    assert_eq!(session.executed_phases, vec![Phase::Requirements, Phase::Design]);
    assert_eq!(h.metadata.state(&auth(), Phase::Design), PhaseState::Generated);
    assert_eq!(h.process.spawns().len(), 2);
}

#[tokio::test]
async fn review_round_in_flight_finishes_but_pause_blocks_the_next() {
    let h = harness().await;
    h.set_states(&[
        (Phase::Requirements, PhaseState::Approved),
        (Phase::Design, PhaseState::Approved),
        (Phase::Tasks, PhaseState::Approved),
    ]);
    h.orchestrator
        .start_auto_execution(&auth(), Permissions::running(&[Phase::DocumentReview]))
        .await
        .unwrap();
    assert_eq!(h.awaiting().work, WorkKind::ReviewRound(1));
    assert_eq!(h.last_prompt(), "/kiro:document-review auth 1");

    // Flipped mid-round: the session keeps waiting on the running reviewer
    let session = h
        .orchestrator
        .set_permission(&auth(), Phase::DocumentReview, PhasePermission::Pause)
        .await
        .unwrap();
    assert_eq!(session.status, AutoExecutionStatus::Running);

    h.artifact("document-review-1-reply.md", "## Result\nFix Required: 2\n");
    let session = h.finish_awaited(0).await;
    assert_eq!(session.status, AutoExecutionStatus::Paused);
    assert_eq!(session.document_review.rounds.len(), 1);
    assert_eq!(session.document_review.status, ReviewStatus::InProgress);
    assert_eq!(h.process.spawns().len(), 1);

    let session = h
        .orchestrator
        .set_permission(&auth(), Phase::DocumentReview, PhasePermission::Run)
        .await
        .unwrap();
    assert_eq!(session.awaiting.unwrap().work, WorkKind::ReviewRound(2));
    assert_eq!(h.last_prompt(), "/kiro:document-review auth 2");

    h.artifact("document-review-2-reply.md", "Fix Required: 0");
    let session = h.finish_awaited(0).await;
    assert!(session.document_review.is_approved());
    assert_eq!(h.metadata.state(&auth(), Phase::DocumentReview), PhaseState::Generated);
    assert_eq!(session.status, AutoExecutionStatus::Paused);
    assert_eq!(session.current_phase, Some(Phase::Impl));
}

#[tokio::test]
async fn unreadable_review_reply_fails_the_session() {
    let h = harness().await;
    h.set_states(&[
        (Phase::Requirements, PhaseState::Approved),
        (Phase::Design, PhaseState::Approved),
        (Phase::Tasks, PhaseState::Approved),
    ]);
    h.orchestrator
        .start_auto_execution(&auth(), Permissions::running(&[Phase::DocumentReview]))
        .await
        .unwrap();
    h.artifact("document-review-1-reply.md", "I have thoughts.");

    let session = h.finish_awaited(0).await;
    assert_eq!(session.status, AutoExecutionStatus::Error);
    assert_eq!(session.document_review.status, ReviewStatus::Failed);
    assert!(session.last_error.unwrap().contains("Fix Required"));

    // Round failures are recoverable
    h.artifact("document-review-1-reply.md", "Fix Required: 0");
    let session = h.orchestrator.resume_auto_execution(&auth()).await.unwrap();
    assert_eq!(session.awaiting.unwrap().work, WorkKind::ReviewRound(1));
}

#[tokio::test]
async fn nogo_inspection_blocks_until_fixed() {
    let h = harness().await;
    h.set_states(&[
        (Phase::Requirements, PhaseState::Approved),
        (Phase::Design, PhaseState::Approved),
        (Phase::Tasks, PhaseState::Approved),
        (Phase::DocumentReview, PhaseState::Generated),
        (Phase::Impl, PhaseState::Generated),
    ]);
    h.orchestrator
        .start_auto_execution(&auth(), Permissions::running(&[Phase::Inspection]))
        .await
        .unwrap();
    assert_eq!(h.last_prompt(), "/kiro:spec-inspection auth 1");

    h.artifact("inspection-1.md", "Judgment: NOGO\n- missing tests");
    let session = h.finish_awaited(0).await;
    assert_eq!(session.status, AutoExecutionStatus::Paused);
    assert_eq!(session.inspection.blocking_round(), Some(1));

    // Blocked: resuming does not start another round
    let session = h.orchestrator.resume_auto_execution(&auth()).await.unwrap();
    assert_eq!(session.status, AutoExecutionStatus::Paused);
    assert_eq!(h.process.spawns().len(), 1);

    let session = h.orchestrator.fix_inspection(&auth()).await.unwrap();
    assert_eq!(session.awaiting.unwrap().work, WorkKind::InspectionFix(1));
    assert_eq!(h.last_prompt(), "/kiro:spec-inspection-fix auth 1");

    let session = h.finish_awaited(0).await;
    assert_eq!(session.awaiting.as_ref().unwrap().work, WorkKind::InspectionRound(2));
    assert!(session.inspection.rounds[0].fixed_at_ms.is_some());

    h.artifact("inspection-2.md", "**Judgment**: GO");
    let session = h.finish_awaited(0).await;
    assert_eq!(session.inspection.rounds.len(), 2);
    assert_eq!(session.inspection.rounds[1].verdict, InspectionVerdict::Go);
    assert_eq!(h.metadata.state(&auth(), Phase::Inspection), PhaseState::Generated);
    assert_eq!(session.current_phase, Some(Phase::Deploy));
    assert_eq!(session.status, AutoExecutionStatus::Paused);
}

#[tokio::test]
async fn fix_requires_a_blocking_round() {
    let h = harness().await;
    h.orchestrator.start_auto_execution(&auth(), Permissions::default()).await.unwrap();
    let err = h.orchestrator.fix_inspection(&auth()).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::NotFixable { .. }));
}

#[tokio::test]
async fn spawn_failure_halts_with_error() {
    let h = harness().await;
    h.process.fail_next_spawn(ProviderError::Spawn("boom".into()));

    let err = h.orchestrator.start_auto_execution(&auth(), Permissions::all_run()).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::SpawnError);

    let session = h.status();
    assert_eq!(session.status, AutoExecutionStatus::Error);
    assert_eq!(session.outcome, Some(AutoExecutionOutcome::Failed));
    assert!(session.last_error.unwrap().contains("boom"));
}

#[tokio::test]
async fn failed_agent_fails_session_and_resume_reruns_the_phase() {
    let h = harness().await;
    h.orchestrator.start_auto_execution(&auth(), Permissions::all_run()).await.unwrap();

    let session = h.finish_awaited(3).await;
    assert_eq!(session.status, AutoExecutionStatus::Error);
    assert!(session.last_error.unwrap().contains("failed"));
    assert_eq!(h.metadata.state(&auth(), Phase::Requirements), PhaseState::Pending);

    let session = h.orchestrator.resume_auto_execution(&auth()).await.unwrap();
    assert_eq!(session.status, AutoExecutionStatus::Running);
    assert_eq!(session.current_phase, Some(Phase::Requirements));
    assert_eq!(h.process.spawns().len(), 2);
}

#[tokio::test]
async fn stop_terminates_the_awaited_agent() {
    let h = harness().await;
    h.orchestrator.start_auto_execution(&auth(), Permissions::all_run()).await.unwrap();
    let pid = h.pid_of(&h.awaiting().agent_id);

    let session = h.orchestrator.stop_auto_execution(&auth()).await.unwrap();
    assert_eq!(session.status, AutoExecutionStatus::Stopped);
    assert_eq!(session.outcome, Some(AutoExecutionOutcome::Stopped));
    assert_eq!(h.process.signals().len(), 1);
    assert_eq!(h.process.signals()[0].0, pid);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.status().status, AutoExecutionStatus::Stopped);
    assert_eq!(h.process.spawns().len(), 1);

    let err = h.orchestrator.stop_auto_execution(&auth()).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidState);
}

#[tokio::test]
async fn only_one_active_session_per_entity() {
    let h = harness().await;
    h.orchestrator.start_auto_execution(&auth(), Permissions::all_run()).await.unwrap();
    let err = h.orchestrator.start_auto_execution(&auth(), Permissions::all_run()).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::AlreadyActive { status: AutoExecutionStatus::Running, .. }));
    assert_eq!(err.code(), ErrorCode::AlreadyRunning);
}

#[tokio::test]
async fn fully_generated_entity_completes_immediately() {
    let h = harness().await;
    for phase in Phase::ALL {
        h.metadata.set_state(&auth(), phase, PhaseState::Approved);
    }
    let session = h.orchestrator.start_auto_execution(&auth(), Permissions::all_run()).await.unwrap();
    assert_eq!(session.status, AutoExecutionStatus::Idle);
    assert_eq!(session.outcome, Some(AutoExecutionOutcome::Completed));
    assert!(h.process.spawns().is_empty());
}

#[tokio::test]
async fn worktree_entities_run_in_their_worktree() {
    let h = harness().await;
    h.metadata.set_worktree(
        &auth(),
        WorktreeConfig {
            path: ".kiro/worktrees/specs/auth".into(),
            branch: "feature/auth".into(),
            created_at: "2026-01-01T00:00:00Z".parse().unwrap(),
        },
    );
    h.orchestrator.execute_phase(&auth(), Phase::Requirements).await.unwrap();
    assert_eq!(
        h.process.last_spawn().unwrap().spec.cwd,
        PathBuf::from("/p/.kiro/worktrees/specs/auth")
    );
}

#[tokio::test]
async fn unknown_entity_reads_idle() {
    let h = harness().await;
    let session = h.orchestrator.get_auto_execution_status(&EntityId::bug("nope")).unwrap();
    assert_eq!(session.status, AutoExecutionStatus::Idle);
    let err = h.orchestrator.resume_auto_execution(&EntityId::bug("nope")).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotFound);
}

#[tokio::test]
async fn restart_pauses_sessions_whose_agent_is_gone() {
    let dir = TempDir::new().unwrap();
    let store = AutoExecStore::new(&dir.path().join("auto"));
    let mut session = AutoExecutionSession::start(auth(), Permissions::all_run(), 1);
    let lost = AgentId::new();
    session.current_phase = Some(Phase::Design);
    session.awaiting = Some(AwaitingAgent { agent_id: lost.clone(), phase: Phase::Design, work: WorkKind::Phase });
    store.save(&session).unwrap();

    let h = open_in(dir, FakeMetadataStore::new()).await;
    let session = h.status();
    assert_eq!(session.status, AutoExecutionStatus::Paused);
    assert!(session.last_error.unwrap().contains(&lost.to_string()));
    assert!(h.dir.path().join("auto").exists());
}
