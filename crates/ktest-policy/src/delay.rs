//! Delay-injection policy
//!
//! Simulates admission latency. Every change is allowed; a marker annotation
//! on the proposed object picks the behavior:
//!
//! - marker absent or empty: reply after a random delay in `[0, max_delay)`
//! - marker set: reply immediately with a patch clearing the marker, so the
//!   next check on the object is delayed again

use crate::decision::Decision;
use crate::policy::AdmissionPolicy;
use crate::subject::AdmissionSubject;
use json_patch::{Patch, PatchOperation, ReplaceOperation};
use rand::Rng;
use serde_json::Value;
use std::time::Duration;

/// Default marker annotation
pub const DEFAULT_MARKER_ANNOTATION: &str = "ktest.ibm.com";

/// Default exclusive upper bound of the injected delay
pub const DEFAULT_MAX_DELAY_SECS: u64 = 10;

/// Policy allowing every change after an optional injected delay
#[derive(Debug, Clone)]
pub struct DelayPolicy {
    marker: String,
    max_delay_secs: u64,
}

impl Default for DelayPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MARKER_ANNOTATION, DEFAULT_MAX_DELAY_SECS)
    }
}

impl DelayPolicy {
    /// Create a delay policy
    pub fn new(marker: impl Into<String>, max_delay_secs: u64) -> Self {
        Self {
            marker: marker.into(),
            max_delay_secs,
        }
    }

    /// Marker annotation name
    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// Patch resetting the marker to the empty string
    pub fn clear_marker_patch(&self) -> Patch {
        Patch(vec![PatchOperation::Replace(ReplaceOperation {
            path: format!("/metadata/annotations/{}", escape_pointer(&self.marker)),
            value: Value::String(String::new()),
        })])
    }

    fn random_delay(&self) -> Duration {
        if self.max_delay_secs == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs(rand::thread_rng().gen_range(0..self.max_delay_secs))
    }
}

impl AdmissionPolicy for DelayPolicy {
    fn id(&self) -> &str {
        "delay"
    }

    fn decide(&self, subject: &AdmissionSubject) -> Decision {
        match subject.annotation(&self.marker) {
            Some(value) if !value.is_empty() => {
                tracing::info!(resource = %subject.key, marker = %self.marker, "Clearing delay marker");
                Decision::allow().with_patch(self.clear_marker_patch())
            }
            _ => {
                let delay = self.random_delay();
                tracing::info!(resource = %subject.key, delay_secs = delay.as_secs(), "Injecting admission delay");
                Decision::allow().with_delay(delay)
            }
        }
    }

    fn description(&self) -> &str {
        "Allows every change after a random delay toggled by a marker annotation"
    }
}

fn escape_pointer(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}
