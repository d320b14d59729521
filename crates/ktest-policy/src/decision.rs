//! Admission decision types

use json_patch::Patch;
use std::time::Duration;

/// Outcome of an admission check
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    /// Whether the change may be committed
    pub allow: bool,

    /// Human-readable reason, surfaced to whoever attempted the change
    pub reason: Option<String>,

    /// How long the endpoint should wait before replying
    pub delay: Option<Duration>,

    /// Patch to return alongside an allowed change
    pub patch: Option<Patch>,
}

impl Decision {
    /// Create an allow decision
    pub fn allow() -> Self {
        Self {
            allow: true,
            reason: None,
            delay: None,
            patch: None,
        }
    }

    /// Create a deny decision
    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allow: false,
            reason: Some(reason.into()),
            delay: None,
            patch: None,
        }
    }

    /// Attach a reply delay
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Attach a patch
    pub fn with_patch(mut self, patch: Patch) -> Self {
        self.patch = Some(patch);
        self
    }

    /// Check if the decision allows the change
    pub fn is_allowed(&self) -> bool {
        self.allow
    }

    /// Check if the decision denies the change
    pub fn is_denied(&self) -> bool {
        !self.allow
    }

    /// Get the reason for this decision (if any)
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }
}
