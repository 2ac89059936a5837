use im::OrdMap;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::record::{FixtureRecord, RecordId};

/// Attribute map of a record. Ordered so that dumps and row comparisons are
/// deterministic; persistent so that snapshots are cheap.
pub type Attributes = OrdMap<String, Value>;

/// A detached foreign key: what an association looks like once it is written
/// to storage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordRef {
    pub table: String,
    pub id: RecordId,
}

impl fmt::Display for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.table, self.id)
    }
}

/// An attribute value.
///
/// `Record` holds a live association. Two `Record` values are equal only when
/// they point at the same in-memory record, never because their contents match.
///
/// # Examples
///
/// ```rust
/// use fixture_preload::Value;
/// let n = Value::from(3);
/// assert_eq!(n.type_name(), "Int");
/// let s = Value::from("hello");
/// assert_eq!(s.as_str(), Some("hello"));
/// assert!(Value::default().is_nil());
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub enum Value {
    #[default]
    Nil,
    Int(i64),
    Float(f64),
    String(String),
    Bool(bool),
    List(Vec<Value>),
    Ref(RecordRef),
    Record(FixtureRecord),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "Nil",
            Value::Int(_) => "Int",
            Value::Float(_) => "Float",
            Value::String(_) => "String",
            Value::Bool(_) => "Bool",
            Value::List(_) => "List",
            Value::Ref(_) => "Ref",
            Value::Record(_) => "Record",
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(n) => Some(*n),
            Value::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the live association, if this value holds one.
    pub fn as_record(&self) -> Option<&FixtureRecord> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }

    /// The foreign key this value points at, for both live and detached
    /// associations. A live association whose record was never persisted has none.
    pub fn as_ref_key(&self) -> Option<RecordRef> {
        match self {
            Value::Ref(r) => Some(r.clone()),
            Value::Record(r) => r.record_ref(),
            _ => None,
        }
    }

    /// Converts the value into the form a storage row holds: live associations
    /// become detached foreign keys.
    pub fn to_stored(&self) -> Value {
        match self {
            Value::Record(r) => match r.record_ref() {
                Some(key) => Value::Ref(key),
                None => Value::Nil,
            },
            Value::List(items) => Value::List(items.iter().map(Value::to_stored).collect()),
            other => other.clone(),
        }
    }

    fn fmt_list(f: &mut fmt::Formatter<'_>, items: &[Value]) -> fmt::Result {
        write!(f, "[")?;
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", item)?;
        }
        write!(f, "]")
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Bool(b) => write!(f, "{}", b),
            Value::List(items) => Value::fmt_list(f, items),
            Value::Ref(r) => write!(f, "{}", r),
            Value::Record(r) => write!(f, "{}", r),
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n.into())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<FixtureRecord> for Value {
    fn from(r: FixtureRecord) -> Self {
        Value::Record(r)
    }
}

impl From<&FixtureRecord> for Value {
    fn from(r: &FixtureRecord) -> Self {
        Value::Record(r.clone())
    }
}

impl From<RecordRef> for Value {
    fn from(r: RecordRef) -> Self {
        Value::Ref(r)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Nil, Into::into)
    }
}

/// Builds an [`Attributes`] map, converting each value with `Value::from`.
///
/// ```rust
/// use fixture_preload::{attrs, Value};
/// let a = attrs! { "name" => "John Doe", "invitations" => 0 };
/// assert_eq!(a.get("name"), Some(&Value::from("John Doe")));
/// assert!(attrs! {}.is_empty());
/// ```
#[macro_export]
macro_rules! attrs {
    () => {
        $crate::Attributes::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = $crate::Attributes::new();
        $(
            map.insert(::std::string::String::from($key), $crate::Value::from($value));
        )+
        map
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_stored_detaches_nested_refs() {
        let key = RecordRef {
            table: "users".to_string(),
            id: RecordId::new(7),
        };
        let list = Value::List(vec![Value::Ref(key.clone()), Value::from(1)]);
        assert_eq!(list.to_stored(), list);
        assert_eq!(Value::Ref(key.clone()).as_ref_key(), Some(key));
    }

    #[test]
    fn display_quotes_strings_only() {
        assert_eq!(Value::from("a").to_string(), "\"a\"");
        assert_eq!(Value::from(vec![1, 2]).to_string(), "[1, 2]");
        assert_eq!(Value::from(None::<i64>).to_string(), "nil");
    }

    #[test]
    fn serializes_to_json() {
        let json = serde_json::to_string(&Value::from(true)).unwrap();
        assert_eq!(json, r#"{"Bool":true}"#);
    }
}
