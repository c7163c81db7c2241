// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reading reviewer and inspector verdicts out of their report files.

use regex::Regex;
use sdd_core::InspectionVerdict;
use std::sync::LazyLock;

/// `Fix Required: N`, tolerating markdown emphasis around the label and value
#[allow(clippy::expect_used)]
static FIX_REQUIRED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)fix\s+required\**\s*[:：]\s*\**\s*(\d+)").expect("constant regex pattern is valid")
});

/// A judgment or verdict line carrying GO / NOGO, in any case
#[allow(clippy::expect_used)]
static JUDGMENT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^[^\n]*(?:judge?ment|verdict)[^\n]*?\b(no[- ]?go|go)\b")
        .expect("constant regex pattern is valid")
});

/// A line that is only the verdict
#[allow(clippy::expect_used)]
static BARE_VERDICT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^[\s#*>-]*(no[- ]?go|go)[\s*.!]*$").expect("constant regex pattern is valid")
});

/// Issue count from a document-review reply. `None` when the reply has no count.
pub fn parse_fix_required(reply: &str) -> Option<u32> {
    FIX_REQUIRED.captures(reply)?.get(1)?.as_str().parse().ok()
}

/// Verdict from an inspection report. A judgment line wins over a bare one.
pub fn parse_inspection_verdict(report: &str) -> Option<InspectionVerdict> {
    let caps = JUDGMENT_LINE.captures(report).or_else(|| BARE_VERDICT.captures(report))?;
    if caps.get(1)?.as_str().eq_ignore_ascii_case("go") {
        Some(InspectionVerdict::Go)
    } else {
        Some(InspectionVerdict::NoGo)
    }
}

#[cfg(test)]
#[path = "verdict_tests.rs"]
mod tests;
