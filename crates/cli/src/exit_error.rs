// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Custom error type that carries a process exit code.
//!
//! Commands return `ExitError` instead of calling `std::process::exit()`
//! directly, allowing `main()` to handle process termination.

use sdd_engine::{ErrorCode, OrchestratorError, RebaseError, SupervisorError};
use std::fmt;

/// Exit code for usage errors and anything without a stable code.
pub const EXIT_FAILURE: i32 = 1;

#[derive(Debug)]
pub struct ExitError {
    pub code: i32,
    pub message: String,
}

impl ExitError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    /// `CODE: message`, exiting with the code's number.
    pub fn coded(code: ErrorCode, message: impl fmt::Display) -> Self {
        Self::new(exit_code(code), format!("{code}: {message}"))
    }
}

impl From<SupervisorError> for ExitError {
    fn from(e: SupervisorError) -> Self {
        Self::coded(e.code(), e)
    }
}

impl From<OrchestratorError> for ExitError {
    fn from(e: OrchestratorError) -> Self {
        Self::coded(e.code(), e)
    }
}

impl From<RebaseError> for ExitError {
    fn from(e: RebaseError) -> Self {
        Self::coded(e.code(), e)
    }
}

/// Stable process exit code per error code.
pub fn exit_code(code: ErrorCode) -> i32 {
    match code {
        ErrorCode::AlreadyRunning => 10,
        ErrorCode::NotResumable => 11,
        ErrorCode::CommandNotAllowed => 12,
        ErrorCode::SpawnError => 13,
        ErrorCode::ConnectionError => 14,
        ErrorCode::ConflictUnresolved => 15,
        ErrorCode::NotFound => 16,
        ErrorCode::NotRunning => 17,
        ErrorCode::InvalidState => 18,
        ErrorCode::StorageError => 19,
    }
}

impl fmt::Display for ExitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ExitError {}

#[cfg(test)]
#[path = "exit_error_tests.rs"]
mod tests;
