// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sdd-adapters: execution providers for local and SSH project roots
//!
//! Providers expose no retry policy; callers decide what is safe to retry.

mod error;
mod factory;
mod guard;
mod local;
mod provider;
pub mod ssh;
pub mod subprocess;

#[cfg(any(test, feature = "test-support"))]
mod fake;

pub use error::ProviderError;
pub use factory::{ProviderFactory, ProviderPair};
pub use guard::CommandPolicy;
pub use local::LocalProvider;
pub use provider::{
    CommandOutput, DirEntry, FileSystemProvider, FsEvent, FsEventKind, ProcessHandle,
    ProcessProvider, ProcessReader, ProcessSignal, ProcessWriter, ProviderKind, SpawnSpec,
    WatchStream,
};
pub use ssh::{
    ConnectionError, ConnectionHandle, ConnectionSnapshot, OpenSshTransport, ReconnectPolicy,
    SshProvider, SshTransport,
};

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeFileSystem, FakeProcessProvider, FakeSpawn};
#[cfg(any(test, feature = "test-support"))]
pub use ssh::FakeSshTransport;
