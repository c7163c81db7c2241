// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    requirements = { Phase::Requirements, WorkKind::Phase, "/kiro:spec-requirements auth" },
    design = { Phase::Design, WorkKind::Phase, "/kiro:spec-design auth" },
    imp = { Phase::Impl, WorkKind::Phase, "/kiro:spec-impl auth" },
    review = { Phase::DocumentReview, WorkKind::ReviewRound(3), "/kiro:document-review auth 3" },
    inspection = { Phase::Inspection, WorkKind::InspectionRound(2), "/kiro:spec-inspection auth 2" },
    fix = { Phase::Inspection, WorkKind::InspectionFix(2), "/kiro:spec-inspection-fix auth 2" },
    manual_inspection = { Phase::Inspection, WorkKind::Phase, "/kiro:spec-inspection auth 1" },
)]
fn default_prompts(phase: Phase, work: WorkKind, expected: &str) {
    let cmd = AgentCommandBuilder::default().for_work(&EntityId::spec("auth"), phase, work);
    assert_eq!(cmd.prompt, expected);
    assert_eq!(cmd.program, "claude");
    assert_eq!(cmd.args, vec!["-p", "--output-format", "stream-json", "--verbose"]);
}

#[test]
fn bugs_use_their_own_family() {
    let cmd = AgentCommandBuilder::default().for_work(&EntityId::bug("crash"), Phase::Design, WorkKind::Phase);
    assert_eq!(cmd.prompt, "/kiro:bug-design crash");
}

#[test]
fn overrides_and_unknown_placeholders() {
    let mut config = AgentCommandConfig::default();
    config.prompts.insert("design".into(), "design {kind}/{name} {unknown}".into());
    let cmd = AgentCommandBuilder::new(config).for_work(&EntityId::spec("auth"), Phase::Design, WorkKind::Phase);
    assert_eq!(cmd.prompt, "design specs/auth {unknown}");
}

#[test]
fn conflict_prompt_lists_files() {
    let cmd = AgentCommandBuilder::default().conflict_resolution(&["src/a.rs".into(), "README.md".into()]);
    assert_eq!(cmd.prompt, "/kiro:resolve-conflicts src/a.rs README.md");
}
