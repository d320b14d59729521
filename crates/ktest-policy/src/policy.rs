//! Admission policy trait and policy selection
//!
//! Both policies implement [`AdmissionPolicy`]; which one runs is decided
//! once, from [`PolicyConfig::mode`], when the policy is built.

use crate::decision::Decision;
use crate::delay::{DelayPolicy, DEFAULT_MARKER_ANNOTATION, DEFAULT_MAX_DELAY_SECS};
use crate::engine::DecisionEngine;
use crate::store::DEFAULT_MAX_DENIALS;
use crate::subject::AdmissionSubject;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Policy judging a proposed change
pub trait AdmissionPolicy: Send + Sync + fmt::Debug {
    /// Unique identifier for this policy
    fn id(&self) -> &str;

    /// Judge one proposed change
    ///
    /// Synchronous and total: every input yields a decision.
    fn decide(&self, subject: &AdmissionSubject) -> Decision;

    /// Get policy description
    fn description(&self) -> &str {
        "Admission policy"
    }

    /// Number of resources the policy holds state for, if it is stateful
    fn tracked_keys(&self) -> Option<usize> {
        None
    }
}

/// Which policy to run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyMode {
    /// Deny each new change until it is resubmitted identically
    #[default]
    Streak,

    /// Allow everything after a random delay, toggled by a marker annotation
    Delay,
}

impl fmt::Display for PolicyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Streak => write!(f, "streak"),
            Self::Delay => write!(f, "delay"),
        }
    }
}

/// Policy configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Policy to run
    #[serde(default)]
    pub mode: PolicyMode,

    /// Lifetime denial ceiling per resource (streak mode)
    #[serde(default = "default_max_denials")]
    pub max_denials: u32,

    /// Upper bound (exclusive) of the injected delay in seconds (delay mode)
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,

    /// Annotation toggling delay injection (delay mode)
    #[serde(default = "default_marker_annotation")]
    pub marker_annotation: String,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            mode: PolicyMode::Streak,
            max_denials: DEFAULT_MAX_DENIALS,
            max_delay_secs: DEFAULT_MAX_DELAY_SECS,
            marker_annotation: DEFAULT_MARKER_ANNOTATION.to_string(),
        }
    }
}

fn default_max_denials() -> u32 {
    DEFAULT_MAX_DENIALS
}

fn default_max_delay_secs() -> u64 {
    DEFAULT_MAX_DELAY_SECS
}

fn default_marker_annotation() -> String {
    DEFAULT_MARKER_ANNOTATION.to_string()
}

/// Build the configured policy
pub fn build_policy(config: &PolicyConfig) -> Arc<dyn AdmissionPolicy> {
    match config.mode {
        PolicyMode::Streak => Arc::new(DecisionEngine::new(config.max_denials)),
        PolicyMode::Delay => Arc::new(DelayPolicy::new(
            config.marker_annotation.clone(),
            config.max_delay_secs,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::ResourceKey;

    #[test]
    fn test_default_config() {
        let config = PolicyConfig::default();
        assert_eq!(config.mode, PolicyMode::Streak);
        assert_eq!(config.max_denials, 20);
        assert_eq!(config.max_delay_secs, 10);
        assert_eq!(config.marker_annotation, "ktest.ibm.com");
    }

    #[test]
    fn test_mode_serde() {
        let mode: PolicyMode = serde_json::from_str("\"delay\"").unwrap();
        assert_eq!(mode, PolicyMode::Delay);
        assert_eq!(serde_json::to_string(&PolicyMode::Streak).unwrap(), "\"streak\"");
        assert!(serde_json::from_str::<PolicyMode>("\"random\"").is_err());
    }

    #[test]
    fn test_build_streak_policy() {
        let policy = build_policy(&PolicyConfig::default());
        assert_eq!(policy.id(), "streak");
        assert_eq!(policy.tracked_keys(), Some(0));

        let subject = AdmissionSubject::new(ResourceKey::new("web", "prod"), "D");
        assert!(policy.decide(&subject).is_denied());
        assert_eq!(policy.tracked_keys(), Some(1));
    }

    #[test]
    fn test_build_delay_policy() {
        let config = PolicyConfig {
            mode: PolicyMode::Delay,
            max_delay_secs: 1,
            ..Default::default()
        };
        let policy = build_policy(&config);
        assert_eq!(policy.id(), "delay");
        assert!(policy.tracked_keys().is_none());

        let subject = AdmissionSubject::new(ResourceKey::new("web", "prod"), "D");
        assert!(policy.decide(&subject).is_allowed());
    }
}
