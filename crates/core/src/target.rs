// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Execution targets and project roots.
//!
//! A project root is either an absolute local path or
//! `ssh://user@host[:port]/path`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_SSH_PORT: u16 = 22;

/// Identity of a remote host connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SshTarget {
    pub user: String,
    pub host: String,
    pub port: u16,
}

impl SshTarget {
    pub fn new(user: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self { user: user.into(), host: host.into(), port }
    }

    /// `user@host` destination for the ssh client
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }
}

impl fmt::Display for SshTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.port == DEFAULT_SSH_PORT {
            write!(f, "{}@{}", self.user, self.host)
        } else {
            write!(f, "{}@{}:{}", self.user, self.host, self.port)
        }
    }
}

/// Where commands and file operations run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionTarget {
    Local,
    Ssh(SshTarget),
}

impl ExecutionTarget {
    pub fn is_local(&self) -> bool {
        matches!(self, ExecutionTarget::Local)
    }
}

/// Logical root of a project: a target plus an absolute path on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectRoot {
    pub target: ExecutionTarget,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProjectRootError {
    #[error("project path must be absolute: {0}")]
    NotAbsolute(String),
    #[error("invalid ssh url {url}: {reason}")]
    InvalidSshUrl { url: String, reason: &'static str },
}

impl ProjectRoot {
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self { target: ExecutionTarget::Local, path: path.into() }
    }

    pub fn ssh(target: SshTarget, path: impl Into<PathBuf>) -> Self {
        Self { target: ExecutionTarget::Ssh(target), path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parse_ssh(url: &str, rest: &str) -> Result<Self, ProjectRootError> {
        let invalid = |reason| ProjectRootError::InvalidSshUrl { url: url.to_string(), reason };
        let (authority, path) = match rest.find('/') {
            Some(idx) => rest.split_at(idx),
            None => return Err(invalid("missing path")),
        };
        let (user, host_port) = authority.split_once('@').ok_or_else(|| invalid("missing user"))?;
        if user.is_empty() {
            return Err(invalid("missing user"));
        }
        let (host, port) = match host_port.rsplit_once(':') {
            Some((host, port)) => (host, port.parse::<u16>().map_err(|_| invalid("bad port"))?),
            None => (host_port, DEFAULT_SSH_PORT),
        };
        if host.is_empty() {
            return Err(invalid("missing host"));
        }
        if path.len() <= 1 {
            return Err(invalid("missing path"));
        }
        Ok(Self::ssh(SshTarget::new(user, host, port), path))
    }
}

impl FromStr for ProjectRoot {
    type Err = ProjectRootError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(rest) = s.strip_prefix("ssh://") {
            return Self::parse_ssh(s, rest);
        }
        let path = Path::new(s);
        if !path.is_absolute() {
            return Err(ProjectRootError::NotAbsolute(s.to_string()));
        }
        Ok(Self::local(path))
    }
}

impl fmt::Display for ProjectRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            ExecutionTarget::Local => write!(f, "{}", self.path.display()),
            ExecutionTarget::Ssh(t) => write!(f, "ssh://{}{}", t, self.path.display()),
        }
    }
}

#[cfg(test)]
#[path = "target_tests.rs"]
mod tests;
