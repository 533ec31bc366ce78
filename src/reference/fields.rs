//! Ordered field candidates for normalizing loosely shaped API records.
//!
//! Different endpoints nest the same attribute in different places
//! (`user.userId` on one, `userId` or `id` on another). Each logical
//! attribute lists the paths that may carry it, highest priority first, and
//! the first present value wins.

use serde_json::Value;
use taskflow_common::parse_id;

/// One logical attribute and where to look for it.
#[derive(Debug, Clone, Copy)]
pub struct FieldCandidates {
    pub name: &'static str,
    paths: &'static [&'static [&'static str]],
}

impl FieldCandidates {
    pub const fn new(name: &'static str, paths: &'static [&'static [&'static str]]) -> Self {
        Self { name, paths }
    }

    /// First candidate value that is present.
    ///
    /// `null`, empty strings, `false` and numeric zero count as absent: the
    /// API uses them interchangeably for "not set".
    pub fn resolve<'a>(&self, record: &'a Value) -> Option<&'a Value> {
        self.paths
            .iter()
            .filter_map(|path| lookup(record, path))
            .find(|value| is_present(value))
    }

    /// The winning value as text. Numbers are rendered; other non-string
    /// values are ignored.
    pub fn resolve_str(&self, record: &Value) -> Option<String> {
        match self.resolve(record)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// The winning value as an integer id.
    pub fn resolve_id(&self, record: &Value) -> Option<i64> {
        self.resolve(record).and_then(parse_id)
    }
}

fn lookup<'a>(record: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(record, |value, key| value.get(key))
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null | Value::Bool(false) => false,
        Value::String(s) => !s.is_empty(),
        Value::Number(n) => n.as_f64() != Some(0.0),
        _ => true,
    }
}
