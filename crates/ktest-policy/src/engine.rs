//! Streak-based decision engine
//!
//! Denies a change the first time it is seen and admits it only after the
//! identical change has been denied twice. A change in the diff restarts the
//! cycle. Once a resource accumulates `max_denials` denials it is admitted
//! unconditionally for the rest of the process lifetime.

use crate::decision::Decision;
use crate::key::ResourceKey;
use crate::policy::AdmissionPolicy;
use crate::store::{DenialStore, DiffRecord, Transition, DEFAULT_MAX_DENIALS};
use crate::subject::AdmissionSubject;

/// Decision engine holding the denial state of every resource seen
#[derive(Debug)]
pub struct DecisionEngine {
    store: DenialStore,
    max_denials: u32,
}

impl Default for DecisionEngine {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DENIALS)
    }
}

impl DecisionEngine {
    /// Create an engine with the given lifetime denial ceiling
    pub fn new(max_denials: u32) -> Self {
        Self {
            store: DenialStore::new(),
            max_denials,
        }
    }

    /// Lifetime denial ceiling
    pub fn max_denials(&self) -> u32 {
        self.max_denials
    }

    /// Decide on a change to `key` described by `diff`
    pub fn decide(&self, key: &ResourceKey, diff: &str) -> Decision {
        match self.store.observe(key, diff, self.max_denials) {
            Transition::Denied {
                streak,
                lifetime_denials,
                restarted,
            } => {
                tracing::debug!(
                    resource = %key,
                    streak,
                    lifetime_denials,
                    restarted,
                    "Denial cycle advanced"
                );
                if lifetime_denials == self.max_denials {
                    tracing::warn!(
                        resource = %key,
                        max_denials = self.max_denials,
                        "Denial ceiling reached; resource will be admitted from now on"
                    );
                }
                tracing::info!(resource = %key, streak, lifetime_denials, "Denying change");
                Decision::deny(format!(
                    "ktest: denying change to {} (streak {}, lifetime {} of {}); resubmit the identical change to proceed",
                    key, streak, lifetime_denials, self.max_denials
                ))
            }
            Transition::Admitted { lifetime_denials } => {
                tracing::debug!(resource = %key, lifetime_denials, "Identical change resubmitted; admitting");
                Decision::allow()
            }
            Transition::CeilingReached { lifetime_denials } => {
                tracing::debug!(resource = %key, lifetime_denials, "Denial ceiling reached; admitting");
                Decision::allow()
            }
        }
    }

    /// Snapshot of the denial record for `key`
    pub fn record(&self, key: &ResourceKey) -> Option<DiffRecord> {
        self.store.record(key)
    }

    /// Seed the denial record for `key`
    pub fn restore(&self, key: ResourceKey, record: DiffRecord) {
        self.store.insert(key, record);
    }

    /// Number of resources seen so far
    pub fn tracked_keys(&self) -> usize {
        self.store.len()
    }
}

impl AdmissionPolicy for DecisionEngine {
    fn id(&self) -> &str {
        "streak"
    }

    fn decide(&self, subject: &AdmissionSubject) -> Decision {
        DecisionEngine::decide(self, &subject.key, &subject.diff)
    }

    fn description(&self) -> &str {
        "Denies each change until it is resubmitted identically twice"
    }

    fn tracked_keys(&self) -> Option<usize> {
        Some(DecisionEngine::tracked_keys(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn verdicts(engine: &DecisionEngine, key: &ResourceKey, diffs: &[&str]) -> Vec<bool> {
        diffs.iter().map(|d| engine.decide(key, d).is_allowed()).collect()
    }

    #[test]
    fn test_sequence_laws() {
        let key = ResourceKey::new("web", "prod");

        assert_eq!(verdicts(&DecisionEngine::default(), &key, &["D", "D"]), [false, false]);
        assert_eq!(
            verdicts(&DecisionEngine::default(), &key, &["D", "D", "D"]),
            [false, false, true]
        );
        assert_eq!(verdicts(&DecisionEngine::default(), &key, &["D", "E"]), [false, false]);
    }

    #[test]
    fn test_replace_image_tag_scenario() {
        let engine = DecisionEngine::new(20);
        let key = ResourceKey::new("web", "prod");
        let diff = "replace image tag";

        assert_eq!(verdicts(&engine, &key, &[diff, diff, diff]), [false, false, true]);
        assert!(engine.decide(&key, diff).is_denied());
        assert_eq!(engine.record(&key).unwrap().lifetime_denials, 3);
    }

    #[test]
    fn test_ceiling_scenario() {
        let engine = DecisionEngine::new(20);
        let key = ResourceKey::new("flaky", "prod");
        engine.restore(
            key.clone(),
            DiffRecord {
                last_diff: Some("old".into()),
                streak: 1,
                lifetime_denials: 19,
            },
        );

        assert!(engine.decide(&key, "anything").is_denied());
        assert_eq!(engine.record(&key).unwrap().lifetime_denials, 20);

        assert!(engine.decide(&key, "something else").is_allowed());
        assert!(engine.decide(&key, "anything").is_allowed());
        assert_eq!(engine.record(&key).unwrap().lifetime_denials, 20);
    }

    #[test]
    fn test_non_idempotent_retries_hit_ceiling() {
        let engine = DecisionEngine::new(5);
        let key = ResourceKey::new("web", "prod");

        for attempt in 0..5 {
            let diff = format!("timestamp {}", attempt);
            assert!(engine.decide(&key, &diff).is_denied());
        }
        assert!(engine.decide(&key, "timestamp 99").is_allowed());
    }

    #[test]
    fn test_deny_reason_names_resource() {
        let engine = DecisionEngine::default();
        let decision = engine.decide(&ResourceKey::new("web", "prod"), "D");
        let reason = decision.reason().unwrap();
        assert!(reason.contains("prod/web"));
        assert!(reason.contains("streak 1"));
        assert!(reason.contains("lifetime 1 of 20"));
    }

    #[test]
    fn test_policy_trait_uses_subject() {
        let engine = DecisionEngine::default();
        let subject = AdmissionSubject::new(ResourceKey::new("web", "prod"), "D");
        let policy: &dyn AdmissionPolicy = &engine;

        assert!(policy.decide(&subject).is_denied());
        assert!(policy.decide(&subject).is_denied());
        assert!(policy.decide(&subject).is_allowed());
    }

    #[test]
    fn test_concurrent_same_key_loses_no_updates() {
        let engine = Arc::new(DecisionEngine::new(1_000));
        let key = ResourceKey::new("web", "prod");

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let engine = engine.clone();
                let key = key.clone();
                thread::spawn(move || {
                    let mut denials = 0u32;
                    for i in 0..50 {
                        if engine.decide(&key, &format!("{}-{}", t, i)).is_denied() {
                            denials += 1;
                        }
                    }
                    denials
                })
            })
            .collect();

        let denials: u32 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(engine.record(&key).unwrap().lifetime_denials, denials);
    }

    #[test]
    fn test_concurrent_distinct_keys_do_not_interfere() {
        let engine = Arc::new(DecisionEngine::default());

        let handles: Vec<_> = (0..16)
            .map(|n| {
                let engine = engine.clone();
                thread::spawn(move || {
                    let key = ResourceKey::new(format!("app-{}", n), "prod");
                    verdicts(&engine, &key, &["D", "D", "D"])
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), [false, false, true]);
        }
        assert_eq!(engine.tracked_keys(), 16);
    }
}
