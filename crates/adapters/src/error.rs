// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use sdd_core::SshTarget;
use std::path::PathBuf;
use thiserror::Error;

/// Errors from execution providers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// Rejected by the command guard. Never retried.
    #[error("command not allowed: {command}: {reason}")]
    CommandNotAllowed { command: String, reason: String },
    #[error("spawn failed: {0}")]
    Spawn(String),
    #[error("not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("io error: {0}")]
    Io(String),
    /// The transport the process was reached through is gone.
    #[error("channel closed: {0}")]
    ChannelClosed(String),
    /// An ssh provider was requested before its connection was registered.
    #[error("no connection registered for {0}")]
    NoConnection(SshTarget),
    #[error("no such process: {0}")]
    NoSuchProcess(u32),
    #[error("watch failed: {0}")]
    Watch(String),
}

impl ProviderError {
    pub(crate) fn io(path: &std::path::Path, e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::NotFound {
            ProviderError::NotFound(path.to_path_buf())
        } else {
            ProviderError::Io(format!("{}: {}", path.display(), e))
        }
    }
}
