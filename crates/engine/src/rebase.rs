// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pulling main-branch changes into a worktree.
//!
//! A structural merge runs first. If it conflicts, an agent is asked to
//! resolve the conflicted files, up to [`MAX_CONFLICT_RESOLUTION_ATTEMPTS`]
//! times. Running out of attempts aborts the merge; a partial merge is never
//! left behind.

use crate::command::AgentCommandBuilder;
use crate::error::provider_code;
use crate::ErrorCode;
use async_trait::async_trait;
use sdd_adapters::{CommandOutput, ProcessProvider, ProviderError, SpawnSpec};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

pub const MAX_CONFLICT_RESOLUTION_ATTEMPTS: u32 = 7;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeResult {
    Clean,
    Conflicts(Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebaseOutcome {
    UpToDate,
    Merged { commits: u32 },
}

impl RebaseOutcome {
    pub fn message(&self) -> String {
        match self {
            RebaseOutcome::UpToDate => "already up to date with main".to_string(),
            RebaseOutcome::Merged { commits: 1 } => "merged 1 commit from main".to_string(),
            RebaseOutcome::Merged { commits } => format!("merged {commits} commits from main"),
        }
    }
}

#[derive(Debug, Error)]
pub enum RebaseError {
    #[error("conflicts unresolved after {attempts} attempts: {}", files.join(", "))]
    ConflictUnresolved { attempts: u32, files: Vec<String> },
    #[error("{command} failed: {message}")]
    Command { command: String, message: String },
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl RebaseError {
    pub fn code(&self) -> ErrorCode {
        match self {
            RebaseError::ConflictUnresolved { .. } => ErrorCode::ConflictUnresolved,
            RebaseError::Command { .. } => ErrorCode::SpawnError,
            RebaseError::Provider(e) => provider_code(e),
        }
    }
}

/// Version-control operations a rebase needs, run inside one worktree.
#[async_trait]
pub trait MergeBackend: Send + Sync {
    /// Commits on main not yet in the worktree branch
    async fn upstream_commits(&self, worktree: &Path) -> Result<u32, RebaseError>;
    async fn merge(&self, worktree: &Path) -> Result<MergeResult, RebaseError>;
    /// One resolution pass. Returns the files still conflicted afterwards.
    async fn resolve_conflicts(
        &self,
        worktree: &Path,
        files: &[String],
    ) -> Result<Vec<String>, RebaseError>;
    /// Commit a merge whose conflicts were resolved
    async fn conclude(&self, worktree: &Path) -> Result<(), RebaseError>;
    async fn abort(&self, worktree: &Path) -> Result<(), RebaseError>;
}

pub async fn rebase_from_main(
    backend: &dyn MergeBackend,
    worktree: &Path,
) -> Result<RebaseOutcome, RebaseError> {
    let commits = backend.upstream_commits(worktree).await?;
    if commits == 0 {
        tracing::info!(worktree = %worktree.display(), "worktree already up to date");
        return Ok(RebaseOutcome::UpToDate);
    }

    let mut files = match backend.merge(worktree).await? {
        MergeResult::Clean => Vec::new(),
        MergeResult::Conflicts(files) => files,
    };
    if !files.is_empty() {
        if let Err(e) = resolve(backend, worktree, &mut files).await {
            if let Err(abort) = backend.abort(worktree).await {
                tracing::warn!(worktree = %worktree.display(), error = %abort, "failed to abort merge");
            }
            return Err(e);
        }
        backend.conclude(worktree).await?;
    }

    tracing::info!(worktree = %worktree.display(), commits, "merged main into worktree");
    Ok(RebaseOutcome::Merged { commits })
}

async fn resolve(
    backend: &dyn MergeBackend,
    worktree: &Path,
    files: &mut Vec<String>,
) -> Result<(), RebaseError> {
    for attempt in 1..=MAX_CONFLICT_RESOLUTION_ATTEMPTS {
        tracing::info!(worktree = %worktree.display(), attempt, files = files.len(), "resolving merge conflicts");
        *files = backend.resolve_conflicts(worktree, files).await?;
        if files.is_empty() {
            return Ok(());
        }
        tracing::warn!(worktree = %worktree.display(), attempt, remaining = files.len(), "conflicts remain");
    }
    Err(RebaseError::ConflictUnresolved {
        attempts: MAX_CONFLICT_RESOLUTION_ATTEMPTS,
        files: std::mem::take(files),
    })
}

/// Git plus a resolver agent, both run through a project's process provider.
pub struct GitMergeBackend {
    process: Arc<dyn ProcessProvider>,
    commands: AgentCommandBuilder,
    main_branch: String,
}

impl GitMergeBackend {
    pub fn new(
        process: Arc<dyn ProcessProvider>,
        commands: AgentCommandBuilder,
        main_branch: impl Into<String>,
    ) -> Self {
        Self { process, commands, main_branch: main_branch.into() }
    }

    async fn git(&self, worktree: &Path, args: &[&str]) -> Result<CommandOutput, RebaseError> {
        let spec = SpawnSpec::new("git", worktree).args(args.iter().map(|a| a.to_string()).collect());
        Ok(self.process.run(spec).await?)
    }

    async fn git_ok(&self, worktree: &Path, args: &[&str]) -> Result<CommandOutput, RebaseError> {
        let output = self.git(worktree, args).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(RebaseError::Command {
                command: format!("git {}", args.join(" ")),
                message: output.stderr.trim().to_string(),
            })
        }
    }

    async fn conflicted_files(&self, worktree: &Path) -> Result<Vec<String>, RebaseError> {
        let output = self.git_ok(worktree, &["diff", "--name-only", "--diff-filter=U"]).await?;
        Ok(output.stdout.lines().map(str::trim).filter(|l| !l.is_empty()).map(String::from).collect())
    }
}

#[async_trait]
impl MergeBackend for GitMergeBackend {
    async fn upstream_commits(&self, worktree: &Path) -> Result<u32, RebaseError> {
        let range = format!("HEAD..{}", self.main_branch);
        let output = self.git_ok(worktree, &["rev-list", "--count", &range]).await?;
        output.stdout.trim().parse().map_err(|_| RebaseError::Command {
            command: format!("git rev-list --count {range}"),
            message: format!("unexpected output: {}", output.stdout.trim()),
        })
    }

    async fn merge(&self, worktree: &Path) -> Result<MergeResult, RebaseError> {
        let output = self.git(worktree, &["merge", "--no-edit", &self.main_branch]).await?;
        if output.success() {
            return Ok(MergeResult::Clean);
        }
        let files = self.conflicted_files(worktree).await?;
        if files.is_empty() {
            return Err(RebaseError::Command {
                command: format!("git merge --no-edit {}", self.main_branch),
                message: output.stderr.trim().to_string(),
            });
        }
        Ok(MergeResult::Conflicts(files))
    }

    async fn resolve_conflicts(
        &self,
        worktree: &Path,
        files: &[String],
    ) -> Result<Vec<String>, RebaseError> {
        let command = self.commands.conflict_resolution(files);
        let mut args = command.args;
        args.push(command.prompt);
        let spec = SpawnSpec::new(command.program, worktree).args(args);
        let output = self.process.run(spec).await?;
        if !output.success() {
            tracing::warn!(worktree = %worktree.display(), exit_code = ?output.code, "conflict resolver exited unsuccessfully");
        }
        self.conflicted_files(worktree).await
    }

    async fn conclude(&self, worktree: &Path) -> Result<(), RebaseError> {
        self.git_ok(worktree, &["add", "-A"]).await?;
        self.git_ok(worktree, &["commit", "--no-edit"]).await?;
        Ok(())
    }

    async fn abort(&self, worktree: &Path) -> Result<(), RebaseError> {
        self.git_ok(worktree, &["merge", "--abort"]).await?;
        Ok(())
    }
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    #![cfg_attr(coverage_nightly, coverage(off))]

    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct FakeMergeState {
        commits: u32,
        conflicts: Vec<String>,
        /// Remaining files after each resolution pass; exhausted means unchanged
        passes: VecDeque<Vec<String>>,
        calls: Vec<&'static str>,
    }

    /// Scripted merge backend.
    #[derive(Clone, Default)]
    pub struct FakeMergeBackend {
        inner: Arc<Mutex<FakeMergeState>>,
    }

    impl FakeMergeBackend {
        pub fn new(commits: u32) -> Self {
            let fake = Self::default();
            fake.inner.lock().commits = commits;
            fake
        }

        pub fn with_conflicts(self, files: &[&str]) -> Self {
            self.inner.lock().conflicts = files.iter().map(|f| f.to_string()).collect();
            self
        }

        /// Files left after the next resolution pass.
        pub fn then_remaining(self, files: &[&str]) -> Self {
            self.inner.lock().passes.push_back(files.iter().map(|f| f.to_string()).collect());
            self
        }

        pub fn calls(&self) -> Vec<&'static str> {
            self.inner.lock().calls.clone()
        }
    }

    #[async_trait]
    impl MergeBackend for FakeMergeBackend {
        async fn upstream_commits(&self, _worktree: &Path) -> Result<u32, RebaseError> {
            let mut inner = self.inner.lock();
            inner.calls.push("upstream");
            Ok(inner.commits)
        }

        async fn merge(&self, _worktree: &Path) -> Result<MergeResult, RebaseError> {
            let mut inner = self.inner.lock();
            inner.calls.push("merge");
            Ok(if inner.conflicts.is_empty() {
                MergeResult::Clean
            } else {
                MergeResult::Conflicts(inner.conflicts.clone())
            })
        }

        async fn resolve_conflicts(
            &self,
            _worktree: &Path,
            files: &[String],
        ) -> Result<Vec<String>, RebaseError> {
            let mut inner = self.inner.lock();
            inner.calls.push("resolve");
            Ok(inner.passes.pop_front().unwrap_or_else(|| files.to_vec()))
        }

        async fn conclude(&self, _worktree: &Path) -> Result<(), RebaseError> {
            self.inner.lock().calls.push("conclude");
            Ok(())
        }

        async fn abort(&self, _worktree: &Path) -> Result<(), RebaseError> {
            self.inner.lock().calls.push("abort");
            Ok(())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeMergeBackend;

#[cfg(test)]
#[path = "rebase_tests.rs"]
mod tests;
