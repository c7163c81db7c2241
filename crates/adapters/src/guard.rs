// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command guard applied at the provider boundary.
//!
//! A command passes only if `[command, args..]` starts with one of the
//! allowed token prefixes and no token contains a shell metacharacter.
//! Offending input is rejected, never escaped.

use crate::{ProviderError, SpawnSpec};

const METACHARACTERS: &[&str] = &[";", "&", "|", "`", "$(", "(", ")", ">", "<", "\r", "\n"];

/// Allowlist of command prefixes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandPolicy {
    allowed: Vec<Vec<String>>,
}

impl Default for CommandPolicy {
    fn default() -> Self {
        Self::new(["claude", "git"])
    }
}

impl CommandPolicy {
    /// Each entry is split into tokens; `"git merge"` allows only `git merge ...`.
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let allowed = allowed
            .into_iter()
            .filter_map(|entry| shell_words::split(entry.as_ref()).ok())
            .filter(|tokens| !tokens.is_empty())
            .collect();
        Self { allowed }
    }

    pub fn check(&self, spec: &SpawnSpec) -> Result<(), ProviderError> {
        let reject = |reason: String| ProviderError::CommandNotAllowed {
            command: spec.command.clone(),
            reason,
        };

        let tokens: Vec<&str> =
            std::iter::once(spec.command.as_str()).chain(spec.args.iter().map(String::as_str)).collect();

        for token in &tokens {
            if let Some(meta) = METACHARACTERS.iter().find(|m| token.contains(*m)) {
                return Err(reject(format!("argument contains shell metacharacter {meta:?}")));
            }
        }
        for (key, value) in &spec.env {
            if METACHARACTERS.iter().any(|m| key.contains(m) || value.contains(m)) {
                return Err(reject(format!("environment variable {key} contains a shell metacharacter")));
            }
        }

        let permitted = self.allowed.iter().any(|prefix| {
            prefix.len() <= tokens.len() && prefix.iter().zip(&tokens).all(|(p, t)| p == t)
        });
        if !permitted {
            return Err(reject("not in the allowed command list".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "guard_tests.rs"]
mod tests;
