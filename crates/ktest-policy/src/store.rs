//! Denial state store
//!
//! One [`DiffRecord`] per [`ResourceKey`], created on first sight and never
//! removed. Every transition runs while holding the entry guard of the
//! underlying map, so concurrent checks on the same key are serialized while
//! checks on other keys proceed independently.

use crate::key::ResourceKey;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Default lifetime denial ceiling per key
pub const DEFAULT_MAX_DENIALS: u32 = 20;

/// Number of identical-diff denials after which the diff is admitted
const STREAK_TO_ADMIT: u8 = 2;

/// Per-key denial history
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffRecord {
    /// Diff of the most recent denied change, if a cycle is in progress
    pub last_diff: Option<String>,

    /// Consecutive identical-diff denials in the current cycle (0..=2)
    pub streak: u8,

    /// Total denials for the key since process start
    pub lifetime_denials: u32,
}

/// Result of applying one check to a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The change was denied; the record now holds the given counters
    Denied {
        /// Streak after the denial
        streak: u8,
        /// Lifetime denials after the denial
        lifetime_denials: u32,
        /// Whether this denial started a new cycle
        restarted: bool,
    },

    /// An identical diff was resubmitted enough times; the cycle was reset
    Admitted {
        /// Lifetime denials (unchanged by admission)
        lifetime_denials: u32,
    },

    /// The key already reached the lifetime ceiling
    CeilingReached {
        /// Lifetime denials (equal to the ceiling)
        lifetime_denials: u32,
    },
}

impl Transition {
    /// Check if the transition admits the change
    pub fn is_allowed(&self) -> bool {
        !matches!(self, Self::Denied { .. })
    }
}

impl DiffRecord {
    /// Apply one check with the given diff to this record
    pub fn observe(&mut self, diff: &str, max_denials: u32) -> Transition {
        if self.lifetime_denials >= max_denials {
            return Transition::CeilingReached {
                lifetime_denials: self.lifetime_denials,
            };
        }

        let same = self.last_diff.as_deref() == Some(diff);
        if same && self.streak >= STREAK_TO_ADMIT {
            self.last_diff = None;
            self.streak = 0;
            return Transition::Admitted {
                lifetime_denials: self.lifetime_denials,
            };
        }

        let restarted = !same;
        if restarted {
            self.last_diff = Some(diff.to_string());
            self.streak = 1;
        } else {
            self.streak += 1;
        }
        self.lifetime_denials += 1;

        Transition::Denied {
            streak: self.streak,
            lifetime_denials: self.lifetime_denials,
            restarted,
        }
    }
}

/// Process-wide keyed store of denial records
#[derive(Debug, Default)]
pub struct DenialStore {
    records: DashMap<ResourceKey, DiffRecord>,
}

impl DenialStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one check for `key`, creating its record if needed
    ///
    /// The whole read-modify-write happens under the key's entry lock.
    pub fn observe(&self, key: &ResourceKey, diff: &str, max_denials: u32) -> Transition {
        let mut record = self.records.entry(key.clone()).or_default();
        record.observe(diff, max_denials)
    }

    /// Snapshot of the record for `key`
    pub fn record(&self, key: &ResourceKey) -> Option<DiffRecord> {
        self.records.get(key).map(|r| r.value().clone())
    }

    /// Replace the record for `key`
    ///
    /// Used to seed state when restoring a known history.
    pub fn insert(&self, key: ResourceKey, record: DiffRecord) {
        self.records.insert(key, record);
    }

    /// Number of keys seen so far
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if no key has been seen yet
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn key() -> ResourceKey {
        ResourceKey::new("web", "prod")
    }

    #[test]
    fn test_fresh_key_denies_and_starts_cycle() {
        let store = DenialStore::new();
        let t = store.observe(&key(), "D", DEFAULT_MAX_DENIALS);
        assert_eq!(
            t,
            Transition::Denied {
                streak: 1,
                lifetime_denials: 1,
                restarted: true
            }
        );
        let record = store.record(&key()).unwrap();
        assert_eq!(record.last_diff.as_deref(), Some("D"));
        assert_eq!(record.streak, 1);
        assert_eq!(record.lifetime_denials, 1);
    }

    #[test]
    fn test_third_identical_admits_and_resets() {
        let store = DenialStore::new();
        store.observe(&key(), "D", DEFAULT_MAX_DENIALS);
        let second = store.observe(&key(), "D", DEFAULT_MAX_DENIALS);
        assert_eq!(
            second,
            Transition::Denied {
                streak: 2,
                lifetime_denials: 2,
                restarted: false
            }
        );

        let third = store.observe(&key(), "D", DEFAULT_MAX_DENIALS);
        assert_eq!(third, Transition::Admitted { lifetime_denials: 2 });
        assert_eq!(
            store.record(&key()).unwrap(),
            DiffRecord {
                last_diff: None,
                streak: 0,
                lifetime_denials: 2
            }
        );
    }

    #[test]
    fn test_changed_diff_restarts_cycle() {
        let store = DenialStore::new();
        store.observe(&key(), "D", DEFAULT_MAX_DENIALS);
        store.observe(&key(), "D", DEFAULT_MAX_DENIALS);

        let t = store.observe(&key(), "E", DEFAULT_MAX_DENIALS);
        assert_eq!(
            t,
            Transition::Denied {
                streak: 1,
                lifetime_denials: 3,
                restarted: true
            }
        );
        assert_eq!(store.record(&key()).unwrap().last_diff.as_deref(), Some("E"));
    }

    #[test]
    fn test_ceiling_blocks_all_mutation() {
        let store = DenialStore::new();
        store.insert(
            key(),
            DiffRecord {
                last_diff: Some("D".into()),
                streak: 1,
                lifetime_denials: 19,
            },
        );

        assert!(!store.observe(&key(), "X", 20).is_allowed());
        assert_eq!(store.record(&key()).unwrap().lifetime_denials, 20);

        let before = store.record(&key()).unwrap();
        for diff in ["X", "Y", "X"] {
            assert_eq!(
                store.observe(&key(), diff, 20),
                Transition::CeilingReached { lifetime_denials: 20 }
            );
        }
        assert_eq!(store.record(&key()).unwrap(), before);
    }

    #[test]
    fn test_empty_diff_is_an_ordinary_diff() {
        let store = DenialStore::new();
        assert!(!store.observe(&key(), "", 20).is_allowed());
        assert!(!store.observe(&key(), "", 20).is_allowed());
        assert!(store.observe(&key(), "", 20).is_allowed());
    }

    #[test]
    fn test_distinct_keys_are_independent() {
        let store = DenialStore::new();
        let other = ResourceKey::new("api", "prod");
        store.observe(&key(), "D", 20);
        store.observe(&key(), "D", 20);

        assert!(!store.observe(&other, "D", 20).is_allowed());
        assert!(store.observe(&key(), "D", 20).is_allowed());
        assert_eq!(store.record(&other).unwrap().streak, 1);
        assert_eq!(store.len(), 2);
    }

    proptest! {
        #[test]
        fn prop_lifetime_is_monotonic_and_bounded(
            diffs in proptest::collection::vec(prop_oneof!["a", "b", "c"], 1..80),
            max in 1u32..30,
        ) {
            let store = DenialStore::new();
            let mut last = 0;
            for diff in &diffs {
                store.observe(&key(), diff, max);
                let record = store.record(&key()).unwrap();
                prop_assert!(record.lifetime_denials >= last);
                prop_assert!(record.lifetime_denials <= max);
                prop_assert!(record.streak <= 2);
                last = record.lifetime_denials;
            }
        }

        #[test]
        fn prop_identical_triple_admits_on_fresh_key(diff in ".{0,32}") {
            let store = DenialStore::new();
            let verdicts: Vec<bool> = (0..3)
                .map(|_| store.observe(&key(), &diff, DEFAULT_MAX_DENIALS).is_allowed())
                .collect();
            prop_assert_eq!(verdicts, vec![false, false, true]);
        }
    }
}
