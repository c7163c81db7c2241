// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tempfile::tempdir;

#[test]
fn creates_parent_dirs_and_replaces() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("a/b/record.json");

    write_atomic(&path, b"first").unwrap();
    write_atomic(&path, b"second").unwrap();

    assert_eq!(fs::read_to_string(&path).unwrap(), "second");
}

#[test]
fn leaves_no_temp_file_behind() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("x.json");
    write_json_atomic(&path, &serde_json::json!({ "k": 1 })).unwrap();

    let names: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["x.json".to_string()]);
}

#[test]
fn failed_write_keeps_previous_content() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("keep.json");
    write_atomic(&path, b"old").unwrap();

    // Renaming a file over a non-empty directory fails
    let blocked = dir.path().join("blocked");
    fs::create_dir_all(blocked.join("inner")).unwrap();
    assert!(write_atomic(&blocked, b"new").is_err());

    assert_eq!(fs::read_to_string(&path).unwrap(), "old");
    assert!(!dir.path().join(".blocked.tmp").exists());
}
