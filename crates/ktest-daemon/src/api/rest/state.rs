//! Application state for API handlers

use crate::config::DaemonConfig;
use ktest_policy::{build_policy, AdmissionPolicy, PolicyMode};
use std::sync::Arc;
use std::time::Duration;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Active admission policy
    pub policy: Arc<dyn AdmissionPolicy>,

    /// Mode the policy was built from
    pub mode: PolicyMode,

    /// Force every verdict to allow without consulting the policy
    pub observe_only: bool,

    /// Budget for a single policy decision
    pub decision_timeout: Duration,

    /// Maximum accepted request body size in bytes
    pub max_body_size: usize,

    /// Daemon version
    pub version: String,

    /// Daemon start time
    pub started_at: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    /// Create new application state
    pub fn new(policy: Arc<dyn AdmissionPolicy>, mode: PolicyMode) -> Self {
        Self {
            policy,
            mode,
            observe_only: false,
            decision_timeout: Duration::from_secs(2),
            max_body_size: 10 * 1024 * 1024,
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: chrono::Utc::now(),
        }
    }

    /// Create application state from the daemon configuration
    pub fn from_config(config: &DaemonConfig) -> Self {
        let policy = build_policy(&config.policy.policy);
        Self {
            observe_only: config.policy.observe_only,
            decision_timeout: config.server.decision_timeout(),
            max_body_size: config.server.max_body_size,
            ..Self::new(policy, config.policy.policy.mode)
        }
    }

    /// Set the observe-only switch
    pub fn with_observe_only(mut self, observe_only: bool) -> Self {
        self.observe_only = observe_only;
        self
    }

    /// Set the decision budget
    pub fn with_decision_timeout(mut self, timeout: Duration) -> Self {
        self.decision_timeout = timeout;
        self
    }

    /// Get uptime as a human-readable string
    pub fn uptime(&self) -> String {
        let duration = chrono::Utc::now() - self.started_at;
        let secs = duration.num_seconds();

        if secs < 60 {
            format!("{}s", secs)
        } else if secs < 3600 {
            format!("{}m {}s", secs / 60, secs % 60)
        } else if secs < 86400 {
            format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
        } else {
            format!("{}d {}h", secs / 86400, (secs % 86400) / 3600)
        }
    }
}
