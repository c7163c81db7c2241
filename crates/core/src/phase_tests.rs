// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[test]
fn phases_are_ordered_topologically() {
    for phase in Phase::ALL {
        if let Some(up) = phase.upstream() {
            assert!(up < phase, "{up} must precede {phase}");
        }
    }
}

#[test]
fn serde_uses_kebab_case() {
    let json = serde_json::to_string(&Phase::DocumentReview).unwrap();
    assert_eq!(json, "\"document-review\"");
    assert_eq!(serde_json::from_str::<Phase>("\"impl\"").unwrap(), Phase::Impl);
}

#[test]
fn from_str_round_trips_display() {
    for phase in Phase::ALL {
        assert_eq!(phase.to_string().parse::<Phase>().unwrap(), phase);
    }
    assert!("review".parse::<Phase>().is_err());
}

#[test]
fn next_walks_the_order() {
    assert_eq!(Phase::Requirements.next(), Some(Phase::Design));
    assert_eq!(Phase::Inspection.next(), Some(Phase::Deploy));
    assert_eq!(Phase::Deploy.next(), None);
}

#[parameterized(
    same_doc_phase = { Phase::Design, Phase::Design, true },
    distinct_doc_phases = { Phase::Requirements, Phase::Design, false },
    doc_and_impl = { Phase::Tasks, Phase::Impl, false },
    impl_self = { Phase::Impl, Phase::Impl, true },
    impl_and_deploy = { Phase::Impl, Phase::Deploy, true },
    impl_and_inspection = { Phase::Impl, Phase::Inspection, true },
    inspection_and_deploy = { Phase::Inspection, Phase::Deploy, true },
    inspection_self = { Phase::Inspection, Phase::Inspection, true },
    review_and_inspection = { Phase::DocumentReview, Phase::Inspection, false },
)]
fn group_exclusion(running: Phase, requested: Phase, expected: bool) {
    assert_eq!(
        conflicts((running, running.group()), (requested, requested.group())),
        expected
    );
    // symmetric
    assert_eq!(
        conflicts((requested, requested.group()), (running, running.group())),
        expected
    );
}

#[test]
fn phase_states_default_to_pending() {
    let states = PhaseStates::default().with(Phase::Requirements, PhaseState::Approved);
    assert_eq!(states.get(Phase::Design), PhaseState::Pending);
    assert_eq!(states.first_pending(), Some(Phase::Design));
    assert!(states.upstream_ready(Phase::Design));
    assert!(!states.upstream_ready(Phase::Tasks));
    assert!(states.upstream_ready(Phase::Requirements));
}

#[test]
fn permissions_default_to_pause() {
    let mut perms = Permissions::running(&[Phase::Requirements]);
    assert!(perms.allows(Phase::Requirements));
    assert!(!perms.allows(Phase::Design));
    perms.set(Phase::Design, PhasePermission::Run);
    assert!(perms.allows(Phase::Design));
    assert!(Permissions::all_run().allows(Phase::Deploy));
}
