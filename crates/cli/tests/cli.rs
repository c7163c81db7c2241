// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use assert_cmd::Command;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

struct Project {
    dir: TempDir,
}

impl Project {
    fn new() -> Self {
        let project = Self { dir: TempDir::new().unwrap() };
        std::fs::create_dir_all(project.root()).unwrap();
        std::fs::create_dir_all(project.state()).unwrap();
        project.config("");
        project
    }

    fn root(&self) -> PathBuf {
        self.dir.path().join("project")
    }

    fn state(&self) -> PathBuf {
        self.dir.path().join("state")
    }

    fn config(&self, toml: &str) {
        std::fs::write(self.dir.path().join("config.toml"), toml).unwrap();
    }

    fn spec_json(&self, name: &str) -> PathBuf {
        self.root().join(".kiro/specs").join(name).join("spec.json")
    }

    fn write_spec(&self, name: &str, json: &str) {
        let path = self.spec_json(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, json).unwrap();
    }

    fn read_spec(&self, name: &str) -> serde_json::Value {
        serde_json::from_str(&std::fs::read_to_string(self.spec_json(name)).unwrap()).unwrap()
    }

    fn sdd(&self) -> Command {
        let mut cmd = Command::cargo_bin("sdd").unwrap();
        cmd.env("SDD_CONFIG", self.dir.path().join("config.toml"))
            .env("NO_COLOR", "1")
            .env("SDD_LOG", "warn")
            .arg("--project")
            .arg(self.root())
            .arg("--state-dir")
            .arg(self.state());
        cmd
    }
}

fn stdout(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

const REQUIREMENTS_GENERATED: &str =
    r#"{"feature_name":"auth","approvals":{"requirements":{"generated":true,"approved":false}}}"#;

#[test]
fn help_lists_subcommands() {
    let output = Command::cargo_bin("sdd").unwrap().arg("--help").output().unwrap();
    assert!(output.status.success());
    let text = stdout(&output);
    for sub in ["run", "auto", "agents", "resume", "stop", "ack", "approve", "rebase", "watch"] {
        assert!(text.contains(sub), "missing {sub} in help");
    }
}

#[test]
fn agents_on_fresh_state_is_empty() {
    let project = Project::new();
    let output = project.sdd().arg("agents").output().unwrap();
    assert!(output.status.success(), "{}", stderr(&output));
    assert_eq!(stdout(&output), "No agents\n");
    assert!(project.state().join("supervisor.lock").exists());
    assert!(project.state().join("logs").is_dir());

    let output = project.sdd().args(["-o", "json", "agents"]).output().unwrap();
    assert_eq!(stdout(&output).trim(), "[]");
}

#[test]
fn approve_requires_a_generated_phase() {
    let project = Project::new();
    project.write_spec("auth", REQUIREMENTS_GENERATED);

    let output = project.sdd().args(["approve", "auth", "design"]).output().unwrap();
    assert_eq!(output.status.code(), Some(18));
    assert!(stderr(&output).contains("INVALID_STATE"));

    let output = project.sdd().args(["approve", "specs/auth", "requirements"]).output().unwrap();
    assert!(output.status.success(), "{}", stderr(&output));
    assert_eq!(stdout(&output), "Approved requirements for specs/auth\n");

    let spec = project.read_spec("auth");
    assert_eq!(spec["approvals"]["requirements"]["approved"], true);
    assert_eq!(spec["feature_name"], "auth");
}

#[test]
fn unknown_entity_is_not_found() {
    let project = Project::new();
    let output = project.sdd().args(["approve", "ghost", "requirements"]).output().unwrap();
    assert_eq!(output.status.code(), Some(16));
    assert!(stderr(&output).contains("NOT_FOUND"));
}

#[test]
fn ack_of_unknown_agent_is_not_found() {
    let project = Project::new();
    let output = project.sdd().args(["ack", "agt-missing"]).output().unwrap();
    assert_eq!(output.status.code(), Some(16));
}

#[test]
fn run_rejects_commands_outside_the_allowlist() {
    let project = Project::new();
    project.write_spec("auth", r#"{"approvals":{}}"#);
    project.config("[agent]\nprogram = \"sh\"\nargs = [\"-c\"]\n");

    let output = project.sdd().args(["run", "auth", "requirements"]).output().unwrap();
    assert_eq!(output.status.code(), Some(12));
    assert!(stderr(&output).contains("COMMAND_NOT_ALLOWED"));
}

#[test]
fn run_upstream_gate_is_enforced() {
    let project = Project::new();
    project.write_spec("auth", r#"{"approvals":{}}"#);
    let output = project.sdd().args(["run", "auth", "tasks"]).output().unwrap();
    assert_eq!(output.status.code(), Some(18));
    assert!(stderr(&output).contains("needs design generated first"));
}

#[test]
fn run_streams_output_and_records_generation() {
    let project = Project::new();
    project.write_spec("auth", r#"{"approvals":{}}"#);
    project.config("[agent]\nprogram = \"echo\"\nargs = []\n[security]\nallowed_commands = [\"echo\"]\n");

    let output = project.sdd().args(["run", "auth", "requirements"]).output().unwrap();
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stdout(&output).contains("/kiro:spec-requirements auth"));

    let spec = project.read_spec("auth");
    assert_eq!(spec["approvals"]["requirements"]["generated"], true);
    assert_eq!(spec["approvals"]["requirements"]["approved"], false);

    let output = project.sdd().args(["-o", "json", "agents", "--entity", "auth"]).output().unwrap();
    let agents: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(agents[0]["status"], "completed");
    assert_eq!(agents[0]["phase"], "requirements");
}

#[test]
fn auto_status_of_untouched_entity_is_idle() {
    let project = Project::new();
    project.write_spec("auth", r#"{"approvals":{}}"#);
    let output = project.sdd().args(["auto", "auth", "--status"]).output().unwrap();
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stdout(&output).contains("Status: idle"));
}

#[test]
fn auto_without_permissions_pauses_immediately() {
    let project = Project::new();
    project.write_spec("auth", r#"{"approvals":{}}"#);
    let output = project.sdd().args(["-o", "json", "auto", "auth"]).output().unwrap();
    assert!(output.status.success(), "{}", stderr(&output));
    let session: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(session["status"], "paused");
    assert_eq!(session["current_phase"], "requirements");

    let output = project.sdd().args(["auto", "auth", "--stop"]).output().unwrap();
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(stdout(&output).contains("Status: stopped"));
}

#[test]
fn rebase_needs_a_worktree() {
    let project = Project::new();
    project.write_spec("auth", r#"{"approvals":{}}"#);
    let output = project.sdd().args(["rebase", "auth"]).output().unwrap();
    assert_eq!(output.status.code(), Some(18));
    assert!(stderr(&output).contains("has no worktree"));
}

#[test]
fn malformed_ssh_project_fails_before_touching_state() {
    let project = Project::new();
    let output = Command::cargo_bin("sdd")
        .unwrap()
        .env("SDD_CONFIG", project.dir.path().join("config.toml"))
        .args(["--project", "ssh://nohost/path", "--state-dir"])
        .arg(project.state())
        .arg("agents")
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(!Path::new(&project.state().join("supervisor.lock")).exists());
}
