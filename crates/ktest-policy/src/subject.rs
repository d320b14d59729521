//! Policy input built from an old/new document pair

use crate::diff::diff_documents;
use crate::error::{PolicyError, Result};
use crate::key::ResourceKey;
use serde_json::Value;
use std::collections::BTreeMap;

/// Everything a policy needs to judge one proposed change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionSubject {
    /// Identity of the changed resource
    pub key: ResourceKey,

    /// Structural diff between the stored and proposed versions
    pub diff: String,

    /// `metadata.annotations` of the proposed version
    pub annotations: BTreeMap<String, String>,
}

impl AdmissionSubject {
    /// Create a subject directly from a key and a diff
    pub fn new(key: ResourceKey, diff: impl Into<String>) -> Self {
        Self {
            key,
            diff: diff.into(),
            annotations: BTreeMap::new(),
        }
    }

    /// Add annotations to the subject
    pub fn with_annotations(mut self, annotations: BTreeMap<String, String>) -> Self {
        self.annotations = annotations;
        self
    }

    /// Build a subject from the stored (`old`) and proposed (`new`) documents
    ///
    /// Both documents must be present JSON objects. An absent old document is
    /// a decode failure, never an empty baseline to diff against.
    pub fn from_documents(old: Option<&Value>, new: Option<&Value>) -> Result<Self> {
        let old = require_object("old", old)?;
        let new = require_object("new", new)?;

        Ok(Self {
            key: ResourceKey::resolve(new),
            diff: diff_documents(old, new),
            annotations: annotations_of(new),
        })
    }

    /// Look up an annotation value
    pub fn annotation(&self, name: &str) -> Option<&str> {
        self.annotations.get(name).map(String::as_str)
    }
}

fn require_object<'a>(which: &str, document: Option<&'a Value>) -> Result<&'a Value> {
    match document {
        Some(value @ Value::Object(_)) => Ok(value),
        Some(other) => Err(PolicyError::DecodeFailure(format!(
            "{} object is not a structured document (found {})",
            which,
            kind_of(other)
        ))),
        None => Err(PolicyError::DecodeFailure(format!("{} object is absent", which))),
    }
}

fn annotations_of(document: &Value) -> BTreeMap<String, String> {
    document
        .pointer("/metadata/annotations")
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
