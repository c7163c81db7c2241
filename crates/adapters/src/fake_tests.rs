// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::test]
async fn emitted_output_arrives_in_order_then_eof() {
    let fake = FakeProcessProvider::new();
    let handle = fake.spawn(SpawnSpec::new("claude", "/p")).await.unwrap();
    fake.emit(handle.pid, OutputStream::Stdout, "one\n").await;
    fake.emit(handle.pid, OutputStream::Stdout, "two\n").await;
    fake.exit(handle.pid, Some(0));

    let mut lines = BufReader::new(handle.stdout).lines();
    assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("one"));
    assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("two"));
    assert_eq!(lines.next_line().await.unwrap(), None);
    assert_eq!(handle.exit.await.unwrap(), Some(0));
}

#[tokio::test]
async fn signal_kills_and_closed_channel_errors() {
    let fake = FakeProcessProvider::new();
    let handle = fake.spawn(SpawnSpec::new("claude", "/p")).await.unwrap();
    assert!(fake.is_alive(handle.pid).await.unwrap());
    fake.signal(handle.pid, ProcessSignal::Terminate).await.unwrap();
    assert_eq!(handle.exit.await.unwrap(), None);
    assert!(!fake.is_alive(handle.pid).await.unwrap());

    fake.set_channel_closed(true);
    assert!(matches!(
        fake.signal(1, ProcessSignal::Kill).await,
        Err(ProviderError::ChannelClosed(_))
    ));
}

#[tokio::test]
async fn policy_is_enforced_when_set() {
    let fake = FakeProcessProvider::new().with_policy(CommandPolicy::default());
    let err = fake.spawn(SpawnSpec::new("claude", "/p").arg("a;b")).await.unwrap_err();
    assert!(matches!(err, ProviderError::CommandNotAllowed { .. }));
    assert!(fake.spawns().is_empty());
}

#[tokio::test]
async fn fs_watch_respects_depth() {
    let fs = FakeFileSystem::new();
    fs.create_dir("/r/wt");
    let mut shallow = fs.watch(Path::new("/r/wt"), false).await.unwrap();
    let mut deep = fs.watch(Path::new("/r/wt"), true).await.unwrap();

    fs.insert("/r/wt/a/file.md", "x");

    let first = shallow.recv().await.unwrap();
    assert_eq!(first, FsEvent { kind: FsEventKind::Created, path: PathBuf::from("/r/wt/a") });

    let mut deep_paths = vec![deep.recv().await.unwrap().path, deep.recv().await.unwrap().path];
    deep_paths.sort();
    assert_eq!(deep_paths, vec![PathBuf::from("/r/wt/a"), PathBuf::from("/r/wt/a/file.md")]);
}

#[tokio::test]
async fn fs_list_and_remove() {
    let fs = FakeFileSystem::new();
    fs.insert("/r/specs/a/spec.json", "{}");
    fs.insert("/r/specs/b/spec.json", "{}");
    let names: Vec<String> = fs.list(Path::new("/r/specs")).await.unwrap().into_iter().map(|e| e.name).collect();
    assert_eq!(names, vec!["a", "b"]);

    fs.remove("/r/specs/a");
    assert!(!fs.exists(Path::new("/r/specs/a/spec.json")).await.unwrap());
    assert_eq!(fs.list(Path::new("/r/specs")).await.unwrap().len(), 1);
}
