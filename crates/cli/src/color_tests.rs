// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serial_test::serial;

fn force_color() {
    std::env::set_var("COLOR", "1");
    std::env::remove_var("NO_COLOR");
}

fn disable_color() {
    std::env::set_var("NO_COLOR", "1");
    std::env::remove_var("COLOR");
}

#[test]
#[serial]
fn styles_follow_color_setting() {
    let plain = format!("{:?}", Styles::plain());
    force_color();
    assert_ne!(format!("{:?}", styles()), plain);
    disable_color();
    assert_eq!(format!("{:?}", styles()), plain);
}

#[test]
#[serial]
fn agent_statuses_get_distinct_colors() {
    force_color();
    assert!(agent_status(AgentStatus::Completed).contains("\x1b[38;5;108m"));
    assert!(agent_status(AgentStatus::Interrupted).contains("\x1b[38;5;179m"));
    assert!(agent_status(AgentStatus::Failed).contains("\x1b[38;5;167m"));
    assert!(agent_status(AgentStatus::Running).ends_with("running\x1b[0m"));
}

#[test]
#[serial]
fn session_status_paused_is_a_warning() {
    force_color();
    assert!(session_status(AutoExecutionStatus::Paused).contains("\x1b[38;5;179m"));
    assert!(session_status(AutoExecutionStatus::Error).contains("\x1b[38;5;167m"));
}

#[test]
#[serial]
fn helpers_plain_when_no_color() {
    disable_color();
    assert_eq!(header("foo"), "foo");
    assert_eq!(muted("dim"), "dim");
    assert_eq!(agent_status(AgentStatus::Failed), "failed");
    assert_eq!(session_status(AutoExecutionStatus::Idle), "idle");
}

#[test]
#[serial]
fn no_color_overrides_color_force() {
    std::env::set_var("NO_COLOR", "1");
    std::env::set_var("COLOR", "1");
    assert!(!should_colorize());
    std::env::remove_var("NO_COLOR");
    assert!(should_colorize());
}
