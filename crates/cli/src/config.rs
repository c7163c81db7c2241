// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `config.toml` loading.
//!
//! Every section is optional; missing keys take the library defaults.

use anyhow::{Context, Result};
use sdd_adapters::{CommandPolicy, ReconnectPolicy};
use sdd_engine::{AgentCommandConfig, SupervisorConfig, WatchConfig};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub state_dir: Option<PathBuf>,
    pub supervisor: SupervisorSection,
    pub agent: AgentSection,
    pub security: SecuritySection,
    pub ssh: SshSection,
    pub watch: WatchSection,
    pub rebase: RebaseSection,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SupervisorSection {
    pub hang_threshold_secs: u64,
    pub monitor_interval_ms: u64,
    pub persist_interval_ms: u64,
    pub resume_flag: String,
    pub continue_prompt: String,
}

impl Default for SupervisorSection {
    fn default() -> Self {
        let defaults = SupervisorConfig::default();
        Self {
            hang_threshold_secs: defaults.hang_threshold.as_secs(),
            monitor_interval_ms: millis(defaults.monitor_interval),
            persist_interval_ms: millis(defaults.persist_interval),
            resume_flag: defaults.resume_flag,
            continue_prompt: defaults.continue_prompt,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentSection {
    pub program: String,
    pub args: Vec<String>,
    /// Prompt templates keyed by phase name
    pub prompts: BTreeMap<String, String>,
}

impl Default for AgentSection {
    fn default() -> Self {
        let defaults = AgentCommandConfig::default();
        Self { program: defaults.program, args: defaults.args, prompts: defaults.prompts }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SecuritySection {
    pub allowed_commands: Vec<String>,
}

impl Default for SecuritySection {
    fn default() -> Self {
        Self { allowed_commands: vec!["claude".to_string(), "git".to_string()] }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SshSection {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// ControlMaster socket directory; defaults to `{state_dir}/ssh`
    pub control_dir: Option<PathBuf>,
}

impl Default for SshSection {
    fn default() -> Self {
        let defaults = ReconnectPolicy::default();
        Self {
            max_attempts: defaults.max_attempts,
            base_delay_ms: millis(defaults.base_delay),
            max_delay_ms: millis(defaults.max_delay),
            control_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WatchSection {
    pub debounce_ms: u64,
}

impl Default for WatchSection {
    fn default() -> Self {
        Self { debounce_ms: millis(WatchConfig::default().debounce) }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RebaseSection {
    pub main_branch: String,
}

impl Default for RebaseSection {
    fn default() -> Self {
        Self { main_branch: "main".to_string() }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

impl Config {
    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
        };
        Self::parse(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Flag > SDD_STATE_DIR > config file > XDG default.
    pub fn resolve_state_dir(&self, flag: Option<PathBuf>) -> Result<PathBuf> {
        flag.or_else(crate::env::state_dir_override)
            .or_else(|| self.state_dir.clone())
            .or_else(crate::env::state_dir)
            .context("cannot determine state directory; set SDD_STATE_DIR or --state-dir")
    }

    pub fn supervisor_config(&self) -> SupervisorConfig {
        let section = &self.supervisor;
        SupervisorConfig {
            hang_threshold: crate::env::hang_threshold()
                .unwrap_or(Duration::from_secs(section.hang_threshold_secs)),
            monitor_interval: Duration::from_millis(section.monitor_interval_ms),
            persist_interval: Duration::from_millis(section.persist_interval_ms),
            resume_flag: section.resume_flag.clone(),
            continue_prompt: section.continue_prompt.clone(),
        }
    }

    pub fn agent_command_config(&self) -> AgentCommandConfig {
        AgentCommandConfig {
            program: self.agent.program.clone(),
            args: self.agent.args.clone(),
            prompts: self.agent.prompts.clone(),
        }
    }

    pub fn command_policy(&self) -> CommandPolicy {
        CommandPolicy::new(self.security.allowed_commands.iter())
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts: self.ssh.max_attempts,
            base_delay: Duration::from_millis(self.ssh.base_delay_ms),
            max_delay: Duration::from_millis(self.ssh.max_delay_ms),
        }
    }

    pub fn watch_config(&self) -> WatchConfig {
        WatchConfig { debounce: Duration::from_millis(self.watch.debounce_ms) }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
