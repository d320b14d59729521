//! Structural diff of two resource documents
//!
//! The output is plain text with one line per differing leaf. Object keys are
//! visited in lexicographic order and array elements by index, so the text is
//! byte-identical for identical inputs regardless of the source key order.

use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt::Write;

/// Compute the diff between `old` and `new`
///
/// Returns an empty string when the documents are equal.
pub fn diff_documents(old: &Value, new: &Value) -> String {
    let mut out = String::new();
    walk(&mut String::new(), old, new, &mut out);
    out
}

fn walk(path: &mut String, old: &Value, new: &Value, out: &mut String) {
    match (old, new) {
        (Value::Object(a), Value::Object(b)) => {
            let keys: BTreeSet<&String> = a.keys().chain(b.keys()).collect();
            for key in keys {
                let len = path.len();
                push_segment(path, key);
                match (a.get(key.as_str()), b.get(key.as_str())) {
                    (Some(x), Some(y)) => walk(path, x, y, out),
                    (Some(x), None) => removed(path, x, out),
                    (None, Some(y)) => added(path, y, out),
                    (None, None) => {}
                }
                path.truncate(len);
            }
        }
        (Value::Array(a), Value::Array(b)) => {
            for index in 0..a.len().max(b.len()) {
                let len = path.len();
                let _ = write!(path, "/{}", index);
                match (a.get(index), b.get(index)) {
                    (Some(x), Some(y)) => walk(path, x, y, out),
                    (Some(x), None) => removed(path, x, out),
                    (None, Some(y)) => added(path, y, out),
                    (None, None) => {}
                }
                path.truncate(len);
            }
        }
        _ if old == new => {}
        _ => {
            removed(path, old, out);
            added(path, new, out);
        }
    }
}

// JSON pointer escaping: `~` first, then `/`.
fn push_segment(path: &mut String, key: &str) {
    path.push('/');
    for c in key.chars() {
        match c {
            '~' => path.push_str("~0"),
            '/' => path.push_str("~1"),
            _ => path.push(c),
        }
    }
}

fn removed(path: &str, value: &Value, out: &mut String) {
    let _ = writeln!(out, "-{}: {}", path, value);
}

fn added(path: &str, value: &Value, out: &mut String) {
    let _ = writeln!(out, "+{}: {}", path, value);
}
