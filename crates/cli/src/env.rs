// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the CLI.

use std::path::PathBuf;
use std::time::Duration;

/// Resolve state directory: SDD_STATE_DIR > XDG_STATE_HOME/sdd > ~/.local/state/sdd
pub fn state_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("SDD_STATE_DIR") {
        return Some(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Some(PathBuf::from(xdg).join("sdd"));
    }
    dirs::home_dir().map(|home| home.join(".local/state/sdd"))
}

/// Explicit state directory override only, without fallbacks.
pub fn state_dir_override() -> Option<PathBuf> {
    std::env::var("SDD_STATE_DIR").ok().filter(|s| !s.is_empty()).map(PathBuf::from)
}

/// Config file: SDD_CONFIG > {config_dir}/sdd/config.toml
pub fn config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("SDD_CONFIG") {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir().map(|dir| dir.join("sdd").join("config.toml"))
}

/// Hang threshold override in seconds
pub fn hang_threshold() -> Option<Duration> {
    std::env::var("SDD_HANG_THRESHOLD_SECS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Log filter directive: SDD_LOG > RUST_LOG
pub fn log_filter() -> Option<String> {
    std::env::var("SDD_LOG")
        .ok()
        .or_else(|| std::env::var("RUST_LOG").ok())
        .filter(|s| !s.is_empty())
}
