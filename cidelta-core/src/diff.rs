//! Failed-test delta between a reference build and a verification build.
//!
//! Both sides are keyed by `class::name`, sorted ordinally and merge-joined.
//! Failures only present on the reference side are fixed and dropped.

use crate::model::FailedTest;
use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Bit-set of diff outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DiffStatus(u8);

impl DiffStatus {
    pub const NONE: Self = Self(0);
    /// A test fails on demand that did not fail in the reference.
    pub const NEW: Self = Self(1);
    /// A test fails in both, with different detail.
    pub const UPDATED: Self = Self(1 << 1);
    /// Failures on both sides are identical.
    pub const SAME: Self = Self(1 << 2);

    const LABELS: [(Self, &'static str); 3] = [
        (Self::NEW, "new"),
        (Self::UPDATED, "updated"),
        (Self::SAME, "same"),
    ];

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Whether anything needs a human's attention.
    pub fn has_changes(self) -> bool {
        self.contains(Self::NEW) || self.contains(Self::UPDATED)
    }

    pub fn labels(self) -> Vec<&'static str> {
        Self::LABELS
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, label)| *label)
            .collect()
    }
}

impl BitOr for DiffStatus {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for DiffStatus {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for DiffStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        f.write_str(&self.labels().join("+"))
    }
}

impl Serialize for DiffStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.labels().serialize(serializer)
    }
}

/// Outcome of [`diff`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiffResult {
    pub status: DiffStatus,
    /// Failing on both sides with new detail (on-demand version).
    pub updated: Vec<FailedTest>,
    /// Failing only on demand.
    pub added: Vec<FailedTest>,
}

fn keyed(tests: &[FailedTest]) -> Vec<(String, &FailedTest)> {
    let mut keyed: Vec<(String, &FailedTest)> = tests.iter().map(|t| (t.key(), t)).collect();
    // Stable: the first occurrence of a duplicated key wins.
    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    keyed.dedup_by(|later, earlier| later.0 == earlier.0);
    keyed
}

/// Compare the reference failures against the on-demand failures.
pub fn diff(reference: &[FailedTest], on_demand: &[FailedTest]) -> DiffResult {
    let reference = keyed(reference);
    let on_demand = keyed(on_demand);

    let mut result = DiffResult::default();
    let mut matched = false;
    let (mut r, mut o) = (0, 0);

    while o < on_demand.len() {
        let (o_key, o_test) = &on_demand[o];
        let ordering = match reference.get(r) {
            Some((r_key, _)) => r_key.as_str().cmp(o_key.as_str()),
            None => Ordering::Greater,
        };
        match ordering {
            Ordering::Less => r += 1,
            Ordering::Greater => {
                result.added.push((*o_test).clone());
                result.status |= DiffStatus::NEW;
                o += 1;
            }
            Ordering::Equal => {
                let (_, r_test) = reference[r];
                if r_test.detail == o_test.detail {
                    matched = true;
                } else {
                    result.updated.push((*o_test).clone());
                    result.status |= DiffStatus::UPDATED;
                }
                r += 1;
                o += 1;
            }
        }
    }

    if matched && !result.status.has_changes() {
        result.status |= DiffStatus::SAME;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn t(class: &str, name: &str, detail: &str) -> FailedTest {
        FailedTest::new(class, name, detail)
    }

    #[test]
    fn updated_and_new_scenario() {
        let reference = vec![t("ClassA", "Test1", "x"), t("ClassB", "Test2", "y")];
        let on_demand = vec![
            t("ClassA", "Test1", "x"),
            t("ClassB", "Test2", "z"),
            t("ClassC", "Test3", "w"),
        ];

        let result = diff(&reference, &on_demand);
        assert_eq!(result.status, DiffStatus::UPDATED | DiffStatus::NEW);
        assert_eq!(result.updated, vec![t("ClassB", "Test2", "z")]);
        assert_eq!(result.added, vec![t("ClassC", "Test3", "w")]);
    }

    #[test]
    fn both_empty_is_none() {
        let result = diff(&[], &[]);
        assert_eq!(result.status, DiffStatus::NONE);
        assert!(result.updated.is_empty());
        assert!(result.added.is_empty());
        assert_eq!(result.status.to_string(), "none");
    }

    #[test]
    fn fixed_failures_are_dropped() {
        let reference = vec![t("A", "gone", "x")];
        let result = diff(&reference, &[]);
        assert!(result.status.is_empty());
        assert!(result.added.is_empty());
        assert!(result.updated.is_empty());
    }

    #[test]
    fn identical_sets_are_same() {
        let tests = vec![t("A", "one", "x"), t("B", "two", "y")];
        let result = diff(&tests, &tests);
        assert_eq!(result.status, DiffStatus::SAME);
        assert_eq!(result.status.to_string(), "same");
    }

    #[test]
    fn sorting_uses_joined_key_ordinally() {
        // "A.B::y" sorts before "A::x" because '.' < ':'.
        let on_demand = vec![t("A", "x", "1"), t("A.B", "y", "2")];
        let result = diff(&[], &on_demand);
        assert_eq!(result.added, vec![t("A.B", "y", "2"), t("A", "x", "1")]);
    }

    #[test]
    fn duplicate_keys_keep_first_occurrence() {
        let on_demand = vec![t("A", "x", "first"), t("A", "x", "second")];
        let result = diff(&[], &on_demand);
        assert_eq!(result.added, vec![t("A", "x", "first")]);
    }

    #[test]
    fn status_serializes_as_labels() {
        let status = DiffStatus::NEW | DiffStatus::UPDATED;
        assert_eq!(
            serde_json::to_value(status).unwrap(),
            serde_json::json!(["new", "updated"])
        );
        assert_eq!(status.to_string(), "new+updated");
    }

    fn failed_tests() -> impl Strategy<Value = Vec<FailedTest>> {
        prop::collection::vec(
            ("[A-D]", "t[0-5]", "[xyz]").prop_map(|(c, n, d)| FailedTest::new(c, n, d)),
            0..12,
        )
    }

    fn is_sorted_by_key(tests: &[FailedTest]) -> bool {
        tests.windows(2).all(|w| w[0].key() < w[1].key())
    }

    proptest! {
        #[test]
        fn empty_on_demand_adds_nothing(reference in failed_tests()) {
            let result = diff(&reference, &[]);
            prop_assert!(result.added.is_empty());
            prop_assert!(result.updated.is_empty());
        }

        #[test]
        fn empty_reference_adds_everything_sorted(on_demand in failed_tests()) {
            let result = diff(&[], &on_demand);
            let unique: std::collections::BTreeSet<String> =
                on_demand.iter().map(FailedTest::key).collect();
            prop_assert_eq!(result.added.len(), unique.len());
            prop_assert!(is_sorted_by_key(&result.added));
        }

        #[test]
        fn self_diff_is_same(tests in failed_tests()) {
            let result = diff(&tests, &tests);
            prop_assert!(result.added.is_empty());
            prop_assert!(result.updated.is_empty());
            prop_assert_eq!(result.status.contains(DiffStatus::SAME), !tests.is_empty());
        }

        #[test]
        fn input_order_does_not_matter(reference in failed_tests(), on_demand in failed_tests()) {
            let forward = diff(&reference, &on_demand);
            let mut reversed_ref = reference.clone();
            reversed_ref.sort_by_key(FailedTest::key);
            let mut reversed_od = on_demand.clone();
            reversed_od.sort_by_key(FailedTest::key);
            // Only order-independent when keys are unique on each side.
            let unique = |v: &[FailedTest]| {
                let keys: std::collections::BTreeSet<String> =
                    v.iter().map(FailedTest::key).collect();
                keys.len() == v.len()
            };
            prop_assume!(unique(&reference) && unique(&on_demand));
            reversed_ref.reverse();
            reversed_od.reverse();
            let backward = diff(&reversed_ref, &reversed_od);
            prop_assert_eq!(forward, backward);
        }
    }
}
