//! Dot-path expressions such as `"user.address.city"` or `"items.0"`.
//!
//! A path is accepted when it only contains letters, digits, `_`, `$` and
//! `.`. Evaluation walks the segments through the reactive accessors, so a
//! watcher evaluating a path subscribes to every key along it. A missing
//! segment yields [`Value::Null`].

use crate::value::Value;

/// Parsed dot-path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Path {
    segments: Vec<String>,
}

impl Path {
    /// Parse `path`. `None` for anything outside the simple dot grammar.
    pub fn parse(path: &str) -> Option<Self> {
        let valid = path
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '.' | '$' | '_'));
        if !valid {
            return None;
        }
        Some(Self {
            segments: path.split('.').map(str::to_owned).collect(),
        })
    }

    /// Dot-separated segments, in order.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Resolve against `root`.
    pub fn evaluate(&self, root: &Value) -> Value {
        let mut current = root.clone();
        for segment in &self.segments {
            let next = match &current {
                Value::Map(map) => map.get(segment),
                Value::List(list) => segment.parse().ok().and_then(|index| list.get(index)),
                _ => None,
            };
            match next {
                Some(value) => current = value,
                None => return Value::Null,
            }
        }
        current
    }
}
