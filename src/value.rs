//! Dynamic values held by reactive containers and produced by evaluators.

use std::fmt;
use std::sync::Arc;

use crate::list::ReactiveList;
use crate::map::ReactiveMap;
use crate::observer::Observer;

/// A value that can live in a reactive container.
///
/// Primitives compare by value; maps and lists compare by identity, the same
/// way a setter decides whether anything changed. Cloning a container clones
/// the handle, not the contents.
#[derive(Clone, Default)]
pub enum Value {
    /// Absent / undefined.
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// Number. `NaN` is considered identical to `NaN`.
    Number(f64),
    /// Immutable string.
    String(Arc<str>),
    /// Reactive key/value container.
    Map(ReactiveMap),
    /// Reactive sequence.
    List(ReactiveList),
}

impl Value {
    /// Identity comparison used by setters and watchers.
    ///
    /// Like `===` except that `NaN` is identical to itself.
    pub fn same_value(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a.ptr_eq(b),
            (Value::List(a), Value::List(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// Maps and lists. A watcher producing a container always fires its
    /// callback, since identity cannot reveal internal mutation.
    pub fn is_container(&self) -> bool {
        matches!(self, Value::Map(_) | Value::List(_))
    }

    /// `true` for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The observer attached to this container, if it has been observed.
    pub fn observer(&self) -> Option<&Observer> {
        match self {
            Value::Map(map) => map.observer(),
            Value::List(list) => list.observer(),
            _ => None,
        }
    }

    /// The boolean, if this is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The number, if this is one.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The string, if this is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// The map, if this is one.
    pub fn as_map(&self) -> Option<&ReactiveMap> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// The list, if this is one.
    pub fn as_list(&self) -> Option<&ReactiveList> {
        match self {
            Value::List(list) => Some(list),
            _ => None,
        }
    }

    /// Short type name for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Map(_) => "map",
            Value::List(_) => "list",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.same_value(other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Number(n) => write!(f, "Number({n})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Map(map) => fmt::Debug::fmt(map, f),
            Value::List(list) => fmt::Debug::fmt(list, f),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => f.write_str(s),
            Value::Map(_) => f.write_str("[map]"),
            Value::List(_) => f.write_str("[list]"),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Number(f64::from(value))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Number(f64::from(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Number(value as f64)
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Value::Number(value as f64)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(Arc::from(value))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(Arc::from(value))
    }
}

impl From<ReactiveMap> for Value {
    fn from(value: ReactiveMap) -> Self {
        Value::Map(value)
    }
}

impl From<ReactiveList> for Value {
    fn from(value: ReactiveList) -> Self {
        Value::List(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}
