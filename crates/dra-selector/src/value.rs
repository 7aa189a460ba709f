//! Runtime values of the selector language.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use dra_api::{AttributeValue, Quantity};

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    String(String),
    Version(semver::Version),
    Quantity(Quantity),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null_type",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::String(_) => "string",
            Value::Version(_) => "semver",
            Value::Quantity(_) => "quantity",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    /// Equality. Values of different types are unequal.
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.equals(y))
            }
            (Value::Map(a), Value::Map(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b)
                        .all(|((ka, va), (kb, vb))| ka == kb && va.equals(vb))
            }
            _ => self == other,
        }
    }

    /// Ordering for `<`, `<=`, `>`, `>=` and `isSorted`. `None` when the
    /// pair has no ordering overload.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Version(a), Value::Version(b)) => Some(a.cmp(b)),
            (Value::Quantity(a), Value::Quantity(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl From<&AttributeValue> for Value {
    fn from(value: &AttributeValue) -> Self {
        match value {
            AttributeValue::String(s) => Value::String(s.clone()),
            AttributeValue::Int(v) => Value::Int(*v),
            AttributeValue::Bool(v) => Value::Bool(*v),
            AttributeValue::Version(v) => Value::Version(v.clone()),
            AttributeValue::Quantity(q) => Value::Quantity(q.clone()),
            AttributeValue::StringSlice(items) => {
                Value::List(items.iter().cloned().map(Value::String).collect())
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Version(v) => write!(f, "semver('{v}')"),
            Value::Quantity(q) => write!(f, "quantity('{q}')"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Map(entries) => write!(f, "map of {} entries", entries.len()),
        }
    }
}
