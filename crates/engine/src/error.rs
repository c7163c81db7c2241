// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use crate::metadata::MetadataError;
use sdd_adapters::ProviderError;
use sdd_core::{AgentId, AutoExecutionStatus, EntityId, Phase};
use sdd_storage::StorageError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable error codes surfaced to collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    AlreadyRunning,
    NotResumable,
    CommandNotAllowed,
    SpawnError,
    ConnectionError,
    ConflictUnresolved,
    NotFound,
    NotRunning,
    InvalidState,
    StorageError,
}

sdd_core::simple_display! {
    ErrorCode {
        AlreadyRunning => "ALREADY_RUNNING",
        NotResumable => "NOT_RESUMABLE",
        CommandNotAllowed => "COMMAND_NOT_ALLOWED",
        SpawnError => "SPAWN_ERROR",
        ConnectionError => "CONNECTION_ERROR",
        ConflictUnresolved => "CONFLICT_UNRESOLVED",
        NotFound => "NOT_FOUND",
        NotRunning => "NOT_RUNNING",
        InvalidState => "INVALID_STATE",
        StorageError => "STORAGE_ERROR",
    }
}

/// Errors returned by the agent supervisor.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("{phase} for {entity} conflicts with running agent {running}")]
    AlreadyRunning { entity: EntityId, phase: Phase, running: AgentId },
    #[error("agent {agent_id} is not resumable: {reason}")]
    NotResumable { agent_id: AgentId, reason: String },
    #[error("command not allowed: {command}: {reason}")]
    CommandNotAllowed { command: String, reason: String },
    #[error("spawn failed: {0}")]
    SpawnError(String),
    #[error("connection error: {0}")]
    Connection(String),
    #[error("agent not found: {0}")]
    NotFound(AgentId),
    #[error("agent {0} is not running")]
    NotRunning(AgentId),
    #[error("agent {agent_id}: {message}")]
    InvalidState { agent_id: AgentId, message: String },
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl SupervisorError {
    pub fn code(&self) -> ErrorCode {
        match self {
            SupervisorError::AlreadyRunning { .. } => ErrorCode::AlreadyRunning,
            SupervisorError::NotResumable { .. } => ErrorCode::NotResumable,
            SupervisorError::CommandNotAllowed { .. } => ErrorCode::CommandNotAllowed,
            SupervisorError::SpawnError(_) => ErrorCode::SpawnError,
            SupervisorError::Connection(_) => ErrorCode::ConnectionError,
            SupervisorError::NotFound(_) => ErrorCode::NotFound,
            SupervisorError::NotRunning(_) => ErrorCode::NotRunning,
            SupervisorError::InvalidState { .. } => ErrorCode::InvalidState,
            SupervisorError::Storage(_) => ErrorCode::StorageError,
        }
    }
}

impl From<ProviderError> for SupervisorError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::CommandNotAllowed { command, reason } => {
                SupervisorError::CommandNotAllowed { command, reason }
            }
            ProviderError::ChannelClosed(_) | ProviderError::NoConnection(_) => {
                SupervisorError::Connection(e.to_string())
            }
            other => SupervisorError::SpawnError(other.to_string()),
        }
    }
}

/// Errors returned by the auto-execution orchestrator.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
    #[error(transparent)]
    Metadata(#[from] MetadataError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("{phase} for {entity} needs {upstream} generated first")]
    UpstreamNotReady { entity: EntityId, phase: Phase, upstream: Phase },
    #[error("{phase} for {entity} has not been generated")]
    NotGenerated { entity: EntityId, phase: Phase },
    #[error("auto-execution for {entity} is already {status}")]
    AlreadyActive { entity: EntityId, status: AutoExecutionStatus },
    #[error("no auto-execution session for {0}")]
    NoSession(EntityId),
    #[error("nothing to fix for {entity}: {reason}")]
    NotFixable { entity: EntityId, reason: String },
    #[error("auto-execution for {entity}: {message}")]
    InvalidState { entity: EntityId, message: String },
}

impl OrchestratorError {
    pub fn code(&self) -> ErrorCode {
        match self {
            OrchestratorError::Supervisor(e) => e.code(),
            OrchestratorError::Metadata(MetadataError::NotFound(_)) => ErrorCode::NotFound,
            OrchestratorError::Metadata(MetadataError::Provider(e)) => provider_code(e),
            OrchestratorError::Metadata(MetadataError::Malformed { .. }) => ErrorCode::StorageError,
            OrchestratorError::Storage(_) => ErrorCode::StorageError,
            OrchestratorError::Provider(e) => provider_code(e),
            OrchestratorError::AlreadyActive { .. } => ErrorCode::AlreadyRunning,
            OrchestratorError::NoSession(_) => ErrorCode::NotFound,
            OrchestratorError::UpstreamNotReady { .. }
            | OrchestratorError::NotGenerated { .. }
            | OrchestratorError::NotFixable { .. }
            | OrchestratorError::InvalidState { .. } => ErrorCode::InvalidState,
        }
    }
}

pub(crate) fn provider_code(e: &ProviderError) -> ErrorCode {
    match e {
        ProviderError::CommandNotAllowed { .. } => ErrorCode::CommandNotAllowed,
        ProviderError::ChannelClosed(_) | ProviderError::NoConnection(_) => {
            ErrorCode::ConnectionError
        }
        ProviderError::NotFound(_) => ErrorCode::NotFound,
        _ => ErrorCode::SpawnError,
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
