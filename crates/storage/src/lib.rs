// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sdd-storage: durable side files for crash recovery
//!
//! Everything here lives under the supervisor's state directory and is
//! written with [`write_atomic`] so a crash mid-write leaves either the old
//! or the new file, never a torn one.

mod atomic;
mod auto_exec;
mod error;
mod pid_record;

pub use atomic::{write_atomic, write_json_atomic};
pub use auto_exec::AutoExecStore;
pub use error::StorageError;
pub use pid_record::{AgentLaunch, PidRecord, PidRecordStore};
