//! # ktest Policy
//!
//! Admission policies that verify controllers retry idempotently.
//!
//! ## Overview
//!
//! A cluster control plane asks for a verdict before it commits a change to
//! a watched resource. The streak policy denies every change the first time
//! it is seen and admits it only once the identical change has been
//! resubmitted twice. Any variation between attempts restarts the cycle, and
//! a per-resource lifetime ceiling stops a controller that never retries
//! identically from being blocked forever.
//!
//! ## Key Components
//!
//! - [`ResourceKey`]: `(name, namespace)` identity of a resource
//! - [`diff_documents`]: deterministic text diff of two documents
//! - [`AdmissionSubject`]: policy input built from an old/new document pair
//! - [`DenialStore`]: per-resource [`DiffRecord`]s
//! - [`DecisionEngine`]: the streak policy
//! - [`DelayPolicy`]: the delay-injection policy
//! - [`AdmissionPolicy`]: the capability both policies implement
//!
//! ## Example
//!
//! ```rust
//! use ktest_policy::{DecisionEngine, ResourceKey};
//!
//! let engine = DecisionEngine::new(20);
//! let key = ResourceKey::new("web", "prod");
//!
//! assert!(engine.decide(&key, "replace image tag").is_denied());
//! assert!(engine.decide(&key, "replace image tag").is_denied());
//! assert!(engine.decide(&key, "replace image tag").is_allowed());
//! ```
//!
//! ## Fail-Open
//!
//! Inputs that cannot be turned into a document pair never reach a policy:
//!
//! ```rust
//! use ktest_policy::{admit, build_policy, PolicyConfig};
//! use serde_json::json;
//!
//! let policy = build_policy(&PolicyConfig::default());
//! let new = json!({"metadata": {"name": "web", "namespace": "prod"}});
//!
//! assert!(admit(policy.as_ref(), None, Some(&new)).is_allowed());
//! assert_eq!(policy.tracked_keys(), Some(0));
//! ```

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod decision;
pub mod delay;
pub mod diff;
pub mod engine;
pub mod error;
pub mod key;
pub mod policy;
pub mod store;
pub mod subject;

// Re-exports
pub use decision::Decision;
pub use delay::{DelayPolicy, DEFAULT_MARKER_ANNOTATION, DEFAULT_MAX_DELAY_SECS};
pub use diff::diff_documents;
pub use engine::DecisionEngine;
pub use error::{PolicyError, Result};
pub use key::ResourceKey;
pub use policy::{build_policy, AdmissionPolicy, PolicyConfig, PolicyMode};
pub use store::{DenialStore, DiffRecord, Transition, DEFAULT_MAX_DENIALS};
pub use subject::AdmissionSubject;

use serde_json::Value;

/// Judge a proposed change given its stored and proposed documents
///
/// A document pair that cannot be decoded yields an allow decision without
/// consulting the policy.
pub fn admit(policy: &dyn AdmissionPolicy, old: Option<&Value>, new: Option<&Value>) -> Decision {
    match AdmissionSubject::from_documents(old, new) {
        Ok(subject) => policy.decide(&subject),
        Err(e) => {
            tracing::warn!(error = %e, "Admitting change that could not be decoded");
            Decision::allow()
        }
    }
}
