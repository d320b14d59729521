//! Resource identity
//!
//! Successive admission checks on the same object are correlated through a
//! [`ResourceKey`] built from the object's metadata.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Identity of a watched resource: `(name, namespace)`
///
/// Both components are kept separately, so names containing any separator
/// character cannot collide with another key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey {
    /// Object name
    pub name: String,

    /// Object namespace (empty for cluster-scoped objects)
    pub namespace: String,
}

impl ResourceKey {
    /// Create a new resource key
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    /// Resolve the key of a resource document
    ///
    /// Reads `metadata.name` and `metadata.namespace`. Anything missing or
    /// not a string resolves to an empty component; this never fails.
    pub fn resolve(document: &Value) -> Self {
        let field = |name: &str| {
            document
                .get("metadata")
                .and_then(|meta| meta.get(name))
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        Self {
            name: field("name"),
            namespace: field("namespace"),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}/{}", self.namespace, self.name)
        }
    }
}
