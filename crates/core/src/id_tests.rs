// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;

crate::define_id! {
    /// Test ID type for macro verification.
    pub struct TestId("tst-");
}

#[test]
fn new_ids_carry_prefix_and_are_unique() {
    let a = TestId::new();
    let b = TestId::new();
    assert!(a.as_str().starts_with("tst-"));
    assert_eq!(a.as_str().len(), 4 + 19);
    assert_ne!(a, b);
}

#[test]
fn hash_map_lookup_by_str() {
    let mut map = HashMap::new();
    map.insert(TestId::from_string("tst-k"), 42);
    assert_eq!(map.get("tst-k"), Some(&42));
}

#[test]
fn short_strips_prefix_and_truncates() {
    let id = TestId::from_string("tst-abcdefghijk");
    assert_eq!(id.short(4), "abcd");
    assert_eq!(id.short(100), "abcdefghijk");
}

#[test]
fn serde_is_transparent() {
    let id = TestId::from_string("tst-xyz");
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "\"tst-xyz\"");
    let back: TestId = serde_json::from_str(&json).unwrap();
    assert_eq!(back, id);
}
