// SPDX-License-Identifier: MIT

use super::IdBuf;
use yare::parameterized;

crate::define_id! {
    pub struct TestId("tst-");
}

#[test]
fn new_ids_carry_the_prefix() {
    let id = TestId::new();
    assert!(id.as_str().starts_with("tst-"));
    assert_eq!(id.as_str().len(), 23);
}

#[test]
fn from_string_roundtrips() {
    let id = TestId::from_string("tst-abc123");
    assert_eq!(id.as_str(), "tst-abc123");
    assert_eq!(id.suffix(), "abc123");
}

#[test]
fn ids_are_comparable_to_str() {
    let id = TestId::from_string("tst-xyz");
    assert_eq!(id, "tst-xyz");
    assert_eq!(id, *"tst-xyz".to_string());
}

#[parameterized(
    empty = { "", 0 },
    short = { "ab", 2 },
    exact = { "01234567890123456789012", 23 },
)]
fn short_truncates_to_n_chars(s: &str, len: usize) {
    let buf = IdBuf::new(s);
    assert_eq!(buf.as_str().len(), len);
}

#[test]
fn serde_roundtrip() {
    let id = TestId::from_string("tst-serde1");
    let json = serde_json::to_string(&id).expect("serialize");
    let back: TestId = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(id, back);
}
