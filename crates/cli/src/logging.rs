// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tracing setup: stderr plus a daily rolling file under the state dir.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_FILTER: &str = "info";

fn filter() -> EnvFilter {
    crate::env::log_filter()
        .and_then(|directive| EnvFilter::try_new(directive).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber. The returned guard flushes the file
/// writer on drop and must live until exit.
pub fn init(state_dir: &Path) -> anyhow::Result<WorkerGuard> {
    let log_dir = state_dir.join("logs");
    std::fs::create_dir_all(&log_dir)?;
    let (file, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(log_dir, "sdd.log"));

    tracing_subscriber::registry()
        .with(filter())
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(fmt::layer().with_writer(file).with_ansi(false))
        .try_init()?;
    Ok(guard)
}
