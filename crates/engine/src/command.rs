// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent command lines for each unit of work.

use sdd_core::{EntityId, EntityKind, Phase, WorkKind};
use std::collections::BTreeMap;

/// Prompt template keys beyond the phase names
pub const INSPECTION_FIX: &str = "inspection-fix";
pub const CONFLICT_RESOLUTION: &str = "conflict-resolution";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentCommandConfig {
    pub program: String,
    pub args: Vec<String>,
    /// Overrides keyed by phase name, `inspection-fix` or `conflict-resolution`.
    /// Placeholders: `{name}`, `{kind}`, `{round}`, `{files}`.
    pub prompts: BTreeMap<String, String>,
}

impl Default for AgentCommandConfig {
    fn default() -> Self {
        Self {
            program: "claude".to_string(),
            args: ["-p", "--output-format", "stream-json", "--verbose"]
                .into_iter()
                .map(String::from)
                .collect(),
            prompts: BTreeMap::new(),
        }
    }
}

/// A fully resolved agent invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentCommand {
    pub program: String,
    pub args: Vec<String>,
    pub prompt: String,
}

#[derive(Debug, Clone, Default)]
pub struct AgentCommandBuilder {
    config: AgentCommandConfig,
}

fn default_template(key: &str, kind: EntityKind) -> String {
    let family = match kind {
        EntityKind::Specs => "spec",
        EntityKind::Bugs => "bug",
    };
    match key {
        "document-review" => "/kiro:document-review {name} {round}".to_string(),
        "inspection" => format!("/kiro:{family}-inspection {{name}} {{round}}"),
        INSPECTION_FIX => format!("/kiro:{family}-inspection-fix {{name}} {{round}}"),
        CONFLICT_RESOLUTION => "/kiro:resolve-conflicts {files}".to_string(),
        phase => format!("/kiro:{family}-{phase} {{name}}"),
    }
}

impl AgentCommandBuilder {
    pub fn new(config: AgentCommandConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AgentCommandConfig {
        &self.config
    }

    /// Command for one unit of auto-execution or manual work.
    pub fn for_work(&self, entity: &EntityId, phase: Phase, work: WorkKind) -> AgentCommand {
        let (key, round) = match work {
            WorkKind::Phase => (phase.as_str(), None),
            WorkKind::ReviewRound(n) => (Phase::DocumentReview.as_str(), Some(n)),
            WorkKind::InspectionRound(n) => (Phase::Inspection.as_str(), Some(n)),
            WorkKind::InspectionFix(n) => (INSPECTION_FIX, Some(n)),
        };
        // Phase runs of the looped phases still need a round number
        let round = round.or(match phase {
            Phase::DocumentReview | Phase::Inspection => Some(1),
            _ => None,
        });
        let prompt = self.render(key, entity.kind, |name| match name {
            "name" => Some(entity.name.clone()),
            "kind" => Some(entity.kind.to_string()),
            "round" => round.map(|r| r.to_string()),
            _ => None,
        });
        self.command(prompt)
    }

    /// Command for an AI conflict-resolution pass over `files`.
    pub fn conflict_resolution(&self, files: &[String]) -> AgentCommand {
        let joined = files.join(" ");
        let prompt = self.render(CONFLICT_RESOLUTION, EntityKind::Specs, |name| {
            (name == "files").then(|| joined.clone())
        });
        self.command(prompt)
    }

    fn command(&self, prompt: String) -> AgentCommand {
        AgentCommand { program: self.config.program.clone(), args: self.config.args.clone(), prompt }
    }

    fn render(&self, key: &str, kind: EntityKind, value: impl Fn(&str) -> Option<String>) -> String {
        let template = self
            .config
            .prompts
            .get(key)
            .cloned()
            .unwrap_or_else(|| default_template(key, kind));
        let mut out = String::with_capacity(template.len());
        let mut rest = template.as_str();
        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let tail = &rest[start + 1..];
            match tail.find('}').and_then(|end| value(&tail[..end]).map(|v| (v, end))) {
                Some((v, end)) => {
                    out.push_str(&v);
                    rest = &tail[end + 1..];
                }
                None => {
                    out.push('{');
                    rest = tail;
                }
            }
        }
        out.push_str(rest);
        out.trim_end().to_string()
    }
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
