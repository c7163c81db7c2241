// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sdd-engine: agent supervision and auto-execution
//!
//! The [`Supervisor`] owns live agent processes; the [`Orchestrator`] walks
//! entities through their phases on top of it. Both report through the
//! [`EventBus`].

mod bus;
pub mod command;
mod connection;
mod error;
pub mod log_sink;
pub mod metadata;
pub mod orchestrator;
pub mod rebase;
pub mod supervisor;
pub mod watcher;

pub use bus::{EventBus, Subscription};
pub use command::{AgentCommand, AgentCommandBuilder, AgentCommandConfig};
pub use connection::spawn_connection_forwarder;
pub use error::{ErrorCode, OrchestratorError, SupervisorError};
pub use log_sink::{spawn_log_forwarder, FileLogSink, LogEntry, LogSink};
pub use metadata::{FsMetadataStore, MetadataError, MetadataStore};
pub use orchestrator::{Orchestrator, OrchestratorDeps};
pub use rebase::{
    rebase_from_main, GitMergeBackend, MergeBackend, MergeResult, RebaseError, RebaseOutcome,
    MAX_CONFLICT_RESOLUTION_ATTEMPTS,
};
pub use supervisor::{ReconcileReport, StartRequest, Supervisor, SupervisorConfig, SupervisorDeps};
pub use watcher::{EntityDelta, EntityWatcher, WatchConfig, WatchError};

#[cfg(any(test, feature = "test-support"))]
pub use metadata::FakeMetadataStore;
#[cfg(any(test, feature = "test-support"))]
pub use rebase::FakeMergeBackend;
