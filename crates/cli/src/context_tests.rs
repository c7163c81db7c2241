// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::exit_error::exit_code;

#[test]
fn second_lock_holder_is_refused_until_release() {
    let dir = tempfile::tempdir().unwrap();
    let first = StateLock::acquire(dir.path()).unwrap();
    assert_eq!(first.path(), dir.path().join(LOCK_FILE));

    let err = StateLock::acquire(dir.path()).unwrap_err();
    let exit = err.downcast_ref::<ExitError>().unwrap();
    assert_eq!(exit.code, exit_code(ErrorCode::AlreadyRunning));
    assert!(exit.message.contains("supervisor.lock"));

    drop(first);
    assert!(StateLock::acquire(dir.path()).is_ok());
}

#[test]
fn lock_creates_missing_state_dir() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("a/b");
    let _lock = StateLock::acquire(&nested).unwrap();
    assert!(nested.join(LOCK_FILE).exists());
}

#[test]
fn project_defaults_to_current_dir() {
    let root = resolve_project(None).unwrap();
    assert_eq!(root.path(), std::env::current_dir().unwrap());
    assert!(root.target.is_local());
}

#[test]
fn relative_project_is_joined_to_current_dir() {
    let root = resolve_project(Some("sub/project")).unwrap();
    assert_eq!(root.path(), std::env::current_dir().unwrap().join("sub/project"));
}

#[test]
fn ssh_project_parses_target() {
    let root = resolve_project(Some("ssh://dev@build.example:2222/srv/app")).unwrap();
    assert_eq!(root.path(), Path::new("/srv/app"));
    let ExecutionTarget::Ssh(target) = &root.target else { panic!("expected ssh target") };
    assert_eq!(target.port, 2222);
}

#[test]
fn malformed_ssh_project_is_rejected() {
    assert!(resolve_project(Some("ssh://build.example/srv/app")).is_err());
}

#[tokio::test]
async fn opened_app_runs_the_hang_monitor() {
    let dir = tempfile::tempdir().unwrap();
    let project = dir.path().join("project");
    std::fs::create_dir_all(&project).unwrap();
    let config = Config::parse(
        "[supervisor]\nhang_threshold_secs = 0\nmonitor_interval_ms = 20\n[security]\nallowed_commands = [\"sleep\"]\n",
    )
    .unwrap();

    let app = App::open(config, dir.path().join("state"), ProjectRoot::local(project.clone()), OutputFormat::Text)
        .await
        .unwrap();
    let mut hung = app.bus.subscribe(|e| matches!(e, sdd_core::Event::AgentPossiblyHung { .. }));
    let request = sdd_engine::StartRequest::new(
        sdd_core::EntityId::spec("auth"),
        sdd_core::Phase::Impl,
        app.root().clone(),
        "sleep",
    )
    .args(vec!["30".into()]);
    let handle = app.supervisor().start(request).await.unwrap();

    let event = tokio::time::timeout(std::time::Duration::from_secs(5), hung.recv()).await.unwrap().unwrap();
    let sdd_core::Event::AgentPossiblyHung { agent_id, .. } = event else { panic!("expected hang event") };
    assert_eq!(agent_id, handle.agent_id);
    app.supervisor().stop(&handle.agent_id).await.unwrap();
}
