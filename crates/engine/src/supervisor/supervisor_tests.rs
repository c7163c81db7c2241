// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::{ErrorCode, Subscription};
use proptest::prelude::*;
use sdd_adapters::{CommandPolicy, FakeFileSystem, FakeProcessProvider, ProviderPair};
use sdd_core::test_support::strategies::arb_phase;
use sdd_core::{FakeClock, OutputStream};
use std::time::Duration;
use tempfile::TempDir;

struct Harness {
    supervisor: Supervisor<FakeClock>,
    process: FakeProcessProvider,
    clock: FakeClock,
    bus: EventBus,
    records: PidRecordStore,
    _dir: TempDir,
}

fn factory(process: &FakeProcessProvider) -> Arc<ProviderFactory> {
    let pair = ProviderPair::new(Arc::new(process.clone()), Arc::new(FakeFileSystem::new()));
    Arc::new(ProviderFactory::with_local(pair, CommandPolicy::default()))
}

async fn open_in(dir: TempDir, process: FakeProcessProvider, bus: EventBus) -> Harness {
    let clock = FakeClock::new();
    let records = PidRecordStore::new(dir.path());
    let deps = SupervisorDeps { providers: factory(&process), records: records.clone(), bus: bus.clone() };
    let supervisor = Supervisor::open(deps, clock.clone(), SupervisorConfig::default()).await.unwrap();
    Harness { supervisor, process, clock, bus, records, _dir: dir }
}

async fn harness() -> Harness {
    open_in(TempDir::new().unwrap(), FakeProcessProvider::new(), EventBus::new()).await
}

fn request(entity: &str, phase: Phase) -> StartRequest {
    StartRequest::new(EntityId::spec(entity), phase, ProjectRoot::local("/project"), "claude")
        .args(vec!["-p".into()])
        .prompt(format!("/kiro:spec-{phase} {entity}"))
}

async fn next_event(sub: &mut Subscription) -> Event {
    tokio::time::timeout(Duration::from_secs(5), sub.recv()).await.unwrap().unwrap()
}

async fn next_status(sub: &mut Subscription) -> (AgentId, AgentStatus) {
    loop {
        if let Event::AgentStatusChanged { agent_id, status, .. } = next_event(sub).await {
            return (agent_id, status);
        }
    }
}

async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

#[tokio::test]
async fn output_is_streamed_in_order_and_exit_completes() {
    let h = harness().await;
    let mut status = h.bus.on_agent_status();
    let handle = h.supervisor.start(request("auth", Phase::Requirements)).await.unwrap();
    let pid = handle.pid.unwrap();
    let mut output = h.bus.on_agent_output(handle.agent_id.clone());
    assert_eq!(next_status(&mut status).await, (handle.agent_id.clone(), AgentStatus::Running));

    let spawn = h.process.last_spawn().unwrap();
    assert_eq!(spawn.spec.args, vec!["-p", "/kiro:spec-requirements auth"]);
    assert_eq!(spawn.spec.cwd, PathBuf::from("/project"));

    h.process.emit(pid, OutputStream::Stdout, "{\"type\":\"system\",\"session_id\":\"sess-1\"}\n").await;
    h.process.emit(pid, OutputStream::Stdout, "working\n").await;
    h.process.exit(pid, Some(0));

    let chunks: Vec<String> = vec![next_event(&mut output).await, next_event(&mut output).await]
        .into_iter()
        .filter_map(|e| match e {
            Event::AgentOutput { chunk, stream: OutputStream::Stdout, .. } => Some(chunk),
            _ => None,
        })
        .collect();
    assert_eq!(chunks, vec!["{\"type\":\"system\",\"session_id\":\"sess-1\"}\n", "working\n"]);
    assert_eq!(next_status(&mut status).await, (handle.agent_id.clone(), AgentStatus::Completed));

    let agent = h.supervisor.get_agent(&handle.agent_id).unwrap();
    assert_eq!(agent.session_id.as_deref(), Some("sess-1"));
    assert_eq!(agent.exit_code, Some(0));

    let record = h.records.load(&EntityId::spec("auth"), Phase::Requirements).unwrap().unwrap();
    assert_eq!(record.status, AgentStatus::Completed);
    assert_eq!(record.session_id.as_deref(), Some("sess-1"));
}

#[tokio::test]
async fn failing_exit_is_failed_not_interrupted() {
    let h = harness().await;
    let mut status = h.bus.on_agent_status();
    let handle = h.supervisor.start(request("auth", Phase::Design)).await.unwrap();
    next_status(&mut status).await;
    h.process.exit(handle.pid.unwrap(), Some(2));
    assert_eq!(next_status(&mut status).await.1, AgentStatus::Failed);
}

#[tokio::test]
async fn group_exclusion_rules() {
    let h = harness().await;
    h.supervisor.start(request("auth", Phase::Requirements)).await.unwrap();
    h.supervisor.start(request("auth", Phase::Design)).await.unwrap();

    let err = h.supervisor.start(request("auth", Phase::Design)).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::AlreadyRunning);

    let imp = h.supervisor.start(request("auth", Phase::Impl)).await.unwrap();
    let err = h.supervisor.start(request("auth", Phase::Inspection)).await.unwrap_err();
    match err {
        SupervisorError::AlreadyRunning { running, .. } => assert_eq!(running, imp.agent_id),
        other => panic!("unexpected {other:?}"),
    }

    // Other entities are independent
    h.supervisor.start(request("billing", Phase::Inspection)).await.unwrap();
    assert_eq!(h.supervisor.get_agents(&EntityId::spec("auth")).len(), 3);
    assert_eq!(h.supervisor.get_all_agents().len(), 4);
}

#[tokio::test]
async fn spawn_failure_releases_the_slot() {
    let h = harness().await;
    h.process.fail_next_spawn(sdd_adapters::ProviderError::Spawn("ENOENT".into()));
    let err = h.supervisor.start(request("auth", Phase::Impl)).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::SpawnError);
    assert!(h.supervisor.get_all_agents().is_empty());

    h.supervisor.start(request("auth", Phase::Impl)).await.unwrap();
}

#[tokio::test]
async fn guard_rejection_is_command_not_allowed() {
    let process = FakeProcessProvider::new().with_policy(CommandPolicy::default());
    let h = open_in(TempDir::new().unwrap(), process, EventBus::new()).await;
    let req = request("auth", Phase::Impl).prompt("do it; rm -rf /");
    let err = h.supervisor.start(req).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::CommandNotAllowed);
    assert!(h.process.spawns().is_empty());
}

#[tokio::test]
async fn stop_signals_and_reports_interrupted() {
    let h = harness().await;
    let mut status = h.bus.on_agent_status();
    let handle = h.supervisor.start(request("auth", Phase::Impl)).await.unwrap();
    next_status(&mut status).await;

    h.supervisor.stop(&handle.agent_id).await.unwrap();
    assert_eq!(next_status(&mut status).await.1, AgentStatus::Interrupted);
    assert_eq!(h.process.signals(), vec![(handle.pid.unwrap(), ProcessSignal::Terminate)]);

    let err = h.supervisor.stop(&handle.agent_id).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotRunning);
}

#[tokio::test]
async fn stop_over_dead_channel_degrades_to_interrupted() {
    let h = harness().await;
    let handle = h.supervisor.start(request("auth", Phase::Impl)).await.unwrap();
    h.process.set_channel_closed(true);

    h.supervisor.stop(&handle.agent_id).await.unwrap();
    let agent = h.supervisor.get_agent(&handle.agent_id).unwrap();
    assert_eq!(agent.status, AgentStatus::Interrupted);
}

#[tokio::test]
async fn resume_continues_the_session() {
    let h = harness().await;
    let mut status = h.bus.on_agent_status();
    let handle = h.supervisor.start(request("auth", Phase::Tasks)).await.unwrap();
    next_status(&mut status).await;

    let err = h.supervisor.resume(&handle.agent_id, None).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotResumable);

    h.process.emit(handle.pid.unwrap(), OutputStream::Stdout, "{\"session_id\":\"s-9\"}\n").await;
    eventually(|| h.supervisor.get_agent(&handle.agent_id).unwrap().session_id.is_some()).await;
    h.supervisor.stop(&handle.agent_id).await.unwrap();
    assert_eq!(next_status(&mut status).await.1, AgentStatus::Interrupted);

    let resumed = h.supervisor.resume(&handle.agent_id, Some("keep going".into())).await.unwrap();
    assert_eq!(resumed.agent_id, handle.agent_id);
    assert_eq!(resumed.status, AgentStatus::Running);
    assert_ne!(resumed.pid, handle.pid);
    let args = h.process.last_spawn().unwrap().spec.args;
    assert_eq!(args, vec!["-p", "--resume", "s-9", "keep going"]);

    let err = h.supervisor.resume(&handle.agent_id, None).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotResumable);
}

#[tokio::test]
async fn resume_without_input_sends_continue() {
    let h = harness().await;
    let handle = h
        .supervisor
        .start(request("auth", Phase::Tasks).resume_session_id("s-1"))
        .await
        .unwrap();
    assert_eq!(h.process.last_spawn().unwrap().spec.args, vec!["-p", "--resume", "s-1", "/kiro:spec-tasks auth"]);

    h.process.set_channel_closed(true);
    h.supervisor.stop(&handle.agent_id).await.unwrap();
    h.process.set_channel_closed(false);

    h.supervisor.resume(&handle.agent_id, None).await.unwrap();
    let args = h.process.last_spawn().unwrap().spec.args;
    assert_eq!(args.last().map(String::as_str), Some("continue"));
}

#[tokio::test]
async fn send_input_reaches_stdin_only_while_running() {
    let h = harness().await;
    let mut status = h.bus.on_agent_status();
    let handle = h.supervisor.start(request("auth", Phase::Impl)).await.unwrap();
    let pid = handle.pid.unwrap();
    next_status(&mut status).await;

    h.supervisor.send_input(&handle.agent_id, "yes\n").await.unwrap();
    eventually(|| h.process.stdin_text(pid) == "yes\n").await;

    h.process.exit(pid, Some(0));
    next_status(&mut status).await;
    let err = h.supervisor.send_input(&handle.agent_id, "late").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotRunning);

    let err = h.supervisor.send_input(&AgentId::new(), "x").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotFound);
}

#[tokio::test]
async fn record_writes_need_no_registry_lock_and_keep_the_newest() {
    let h = harness().await;
    let handle = h.supervisor.start(request("auth", Phase::Impl)).await.unwrap();
    let inner = &h.supervisor.inner;

    let mut agents = inner.agents.lock();
    let entry = agents.get_mut(&handle.agent_id).unwrap();
    let older = inner.stage(entry, 1);
    entry.handle.session_id = Some("sess-2".into());
    let newer = inner.stage(entry, 2);

    // Both writes complete while the registry is still locked here
    inner.persist(newer);
    inner.persist(older);
    drop(agents);

    let saved = h.records.load(&handle.entity, Phase::Impl).unwrap().unwrap();
    assert_eq!(saved.session_id.as_deref(), Some("sess-2"));
}

#[tokio::test]
async fn hang_is_flagged_once_and_cleared_by_output() {
    let h = harness().await;
    let handle = h.supervisor.start(request("auth", Phase::Impl)).await.unwrap();
    let mut events = h.bus.subscribe_all();

    h.clock.advance(Duration::from_secs(299));
    assert!(h.supervisor.check_hangs().await.is_empty());

    h.clock.advance(Duration::from_secs(2));
    assert_eq!(h.supervisor.check_hangs().await, vec![handle.agent_id.clone()]);
    assert!(matches!(next_event(&mut events).await, Event::AgentPossiblyHung { idle_ms: 301_000, .. }));
    assert!(h.supervisor.check_hangs().await.is_empty());

    let agent = h.supervisor.get_agent(&handle.agent_id).unwrap();
    assert!(agent.hang_suspected);
    assert_eq!(agent.status, AgentStatus::Running);
    assert!(h.process.signals().is_empty());

    h.process.emit(handle.pid.unwrap(), OutputStream::Stderr, "still here\n").await;
    assert_eq!(next_event(&mut events).await, Event::AgentHangCleared { agent_id: handle.agent_id.clone() });
    assert!(matches!(next_event(&mut events).await, Event::AgentOutput { stream: OutputStream::Stderr, .. }));
    assert!(!h.supervisor.get_agent(&handle.agent_id).unwrap().hang_suspected);
}

fn stale_record(entity: &str, phase: Phase, pid: u32, status: AgentStatus) -> PidRecord {
    let mut handle = sdd_core::test_support::running_handle(entity, phase, pid);
    handle.status = status;
    handle.session_id = Some("sess-old".into());
    PidRecord::from_handle(
        &handle,
        AgentLaunch {
            root: ProjectRoot::local("/project"),
            command: "claude".into(),
            args: vec!["-p".into()],
            prompt: Some("/kiro:spec-impl auth".into()),
            cwd: PathBuf::from("/project"),
        },
    )
}

#[tokio::test]
async fn reconcile_marks_dead_running_records_interrupted_once() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().to_path_buf();
    let records = PidRecordStore::new(&path);
    let dead = stale_record("auth", Phase::Impl, 999, AgentStatus::Running);
    let done = stale_record("auth", Phase::Design, 998, AgentStatus::Completed);
    records.save(&dead).unwrap();
    records.save(&done).unwrap();

    let bus = EventBus::new();
    let mut status = bus.on_agent_status();
    let h = open_in(dir, FakeProcessProvider::new(), bus).await;

    assert_eq!(next_status(&mut status).await, (dead.agent_id.clone(), AgentStatus::Interrupted));
    let stored = records.load(&dead.entity, Phase::Impl).unwrap().unwrap();
    assert_eq!(stored.status, AgentStatus::Interrupted);
    assert_eq!(h.supervisor.get_agent(&done.agent_id).unwrap().status, AgentStatus::Completed);

    // Second pass in the same process and a fresh open both find nothing to do
    assert_eq!(h.supervisor.reconcile().await.unwrap(), ReconcileReport::default());
    let deps = SupervisorDeps { providers: factory(&h.process), records: records.clone(), bus: h.bus.clone() };
    let again = Supervisor::open(deps, h.clock.clone(), SupervisorConfig::default()).await.unwrap();
    assert_eq!(again.reconcile().await.unwrap(), ReconcileReport::default());
    assert_eq!(records.load(&dead.entity, Phase::Impl).unwrap().unwrap().status, AgentStatus::Interrupted);
    assert!(status.try_recv().is_none());

    // Interrupted with a session is resumable after restart
    assert!(again.resume(&dead.agent_id, None).await.is_ok());
}

#[tokio::test]
async fn reconcile_adopts_live_agents_and_polls_them() {
    let dir = TempDir::new().unwrap();
    let records = PidRecordStore::new(dir.path());
    let live = stale_record("auth", Phase::Impl, 777, AgentStatus::Running);
    records.save(&live).unwrap();

    let process = FakeProcessProvider::new();
    process.set_alive(777, true);
    let h = open_in(dir, process, EventBus::new()).await;
    let mut status = h.bus.on_agent_status();

    assert!(h.supervisor.get_agent(&live.agent_id).unwrap().is_running());
    let err = h.supervisor.start(request("auth", Phase::Inspection)).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::AlreadyRunning);

    h.process.set_alive(777, false);
    h.supervisor.check_hangs().await;
    assert_eq!(next_status(&mut status).await, (live.agent_id.clone(), AgentStatus::Interrupted));
}

#[tokio::test]
async fn acknowledge_removes_terminal_agents_only() {
    let h = harness().await;
    let mut status = h.bus.on_agent_status();
    let handle = h.supervisor.start(request("auth", Phase::Impl)).await.unwrap();
    next_status(&mut status).await;

    let err = h.supervisor.acknowledge(&handle.agent_id).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidState);

    h.process.exit(handle.pid.unwrap(), Some(1));
    next_status(&mut status).await;
    let acked = h.supervisor.acknowledge(&handle.agent_id).unwrap();
    assert_eq!(acked.status, AgentStatus::Failed);
    assert!(h.supervisor.get_agent(&handle.agent_id).is_none());
    assert!(h.records.load(&EntityId::spec("auth"), Phase::Impl).unwrap().is_none());
}

#[test]
fn session_id_parsing() {
    assert_eq!(pump::parse_session_id("{\"session_id\":\"abc\",\"x\":1}").as_deref(), Some("abc"));
    assert_eq!(pump::parse_session_id("{\"message\":{\"session_id\":\"nested\"}}"), None);
    assert_eq!(pump::parse_session_id("plain text"), None);
    assert_eq!(pump::parse_session_id("{broken"), None);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn concurrent_starts_admit_exactly_one(n in 2usize..8, phase in arb_phase()) {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(4)
            .enable_all()
            .build()
            .unwrap();
        let (ok, rejected) = rt.block_on(async move {
            let h = harness().await;
            let tasks: Vec<_> = (0..n)
                .map(|_| {
                    let supervisor = h.supervisor.clone();
                    tokio::spawn(async move { supervisor.start(request("race", phase)).await })
                })
                .collect();
            let mut ok = 0;
            let mut rejected = 0;
            for task in tasks {
                match task.await.unwrap() {
                    Ok(_) => ok += 1,
                    Err(e) if e.code() == ErrorCode::AlreadyRunning => rejected += 1,
                    Err(e) => panic!("unexpected {e}"),
                }
            }
            (ok, rejected)
        });
        prop_assert_eq!(ok, 1);
        prop_assert_eq!(rejected, n - 1);
    }
}
