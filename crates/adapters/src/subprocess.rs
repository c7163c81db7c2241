// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Helpers for short-lived subprocesses.

use std::process::Output;
use std::time::Duration;

/// ssh control operations (master start, check, exit).
pub const SSH_CONTROL_TIMEOUT: Duration = Duration::from_secs(30);

/// Remote file operations (cat, ls, find, kill).
pub const REMOTE_OP_TIMEOUT: Duration = Duration::from_secs(60);

/// Run `cmd` to completion, failing if it takes longer than `timeout`.
///
/// The child is killed when the timeout fires.
pub async fn run_with_timeout(
    mut cmd: tokio::process::Command,
    timeout: Duration,
    description: &str,
) -> Result<Output, String> {
    cmd.kill_on_drop(true);
    match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(format!("{description} failed: {e}")),
        Err(_) => Err(format!("{description} timed out after {}s", timeout.as_secs())),
    }
}

#[cfg(test)]
#[path = "subprocess_tests.rs"]
mod tests;
