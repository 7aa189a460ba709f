//! Typed device attributes.
//!
//! Every attribute a driver advertises has one of six types. Lookups through
//! the typed accessors never fail: an absent attribute (or one of a different
//! type) reads as the type's zero value, so a selector written for one vendor
//! evaluates safely against another vendor's devices.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::FieldErrorKind;
use crate::quantity::Quantity;

/// Maximum length of a fully-qualified name (DNS subdomain).
pub const QUALIFIED_NAME_MAX_LEN: usize = 253;

// ---------------------------------------------------------------------------
// Types and values
// ---------------------------------------------------------------------------

/// Declared type of an attribute value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AttributeType {
    String,
    Int,
    Bool,
    Version,
    Quantity,
    StringSlice,
}

impl AttributeType {
    pub const ALL: [AttributeType; 6] = [
        AttributeType::String,
        AttributeType::Int,
        AttributeType::Bool,
        AttributeType::Version,
        AttributeType::Quantity,
        AttributeType::StringSlice,
    ];

    /// The value an absent attribute of this type reads as.
    pub fn zero_value(self) -> AttributeValue {
        match self {
            AttributeType::String => AttributeValue::String(String::new()),
            AttributeType::Int => AttributeValue::Int(0),
            AttributeType::Bool => AttributeValue::Bool(false),
            AttributeType::Version => AttributeValue::Version(semver::Version::new(0, 0, 0)),
            AttributeType::Quantity => AttributeValue::Quantity(Quantity::zero()),
            AttributeType::StringSlice => AttributeValue::StringSlice(Vec::new()),
        }
    }

    /// Wire name of the type (`stringSlice`, `quantity`, ...).
    pub fn as_str(self) -> &'static str {
        match self {
            AttributeType::String => "string",
            AttributeType::Int => "int",
            AttributeType::Bool => "bool",
            AttributeType::Version => "version",
            AttributeType::Quantity => "quantity",
            AttributeType::StringSlice => "stringSlice",
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AttributeValue {
    String(String),
    Int(i64),
    Bool(bool),
    Version(semver::Version),
    Quantity(Quantity),
    StringSlice(Vec<String>),
}

impl AttributeValue {
    pub fn attribute_type(&self) -> AttributeType {
        match self {
            AttributeValue::String(_) => AttributeType::String,
            AttributeValue::Int(_) => AttributeType::Int,
            AttributeValue::Bool(_) => AttributeType::Bool,
            AttributeValue::Version(_) => AttributeType::Version,
            AttributeValue::Quantity(_) => AttributeType::Quantity,
            AttributeValue::StringSlice(_) => AttributeType::StringSlice,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttributeValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttributeValue::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::String(s) => write!(f, "{s:?}"),
            AttributeValue::Int(v) => write!(f, "{v}"),
            AttributeValue::Bool(v) => write!(f, "{v}"),
            AttributeValue::Version(v) => write!(f, "{v}"),
            AttributeValue::Quantity(q) => write!(f, "{q}"),
            AttributeValue::StringSlice(items) => write!(f, "{items:?}"),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        AttributeValue::String(v.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(v: String) -> Self {
        AttributeValue::String(v)
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        AttributeValue::Int(v)
    }
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        AttributeValue::Bool(v)
    }
}

impl From<semver::Version> for AttributeValue {
    fn from(v: semver::Version) -> Self {
        AttributeValue::Version(v)
    }
}

impl From<Quantity> for AttributeValue {
    fn from(v: Quantity) -> Self {
        AttributeValue::Quantity(v)
    }
}

impl From<Vec<String>> for AttributeValue {
    fn from(v: Vec<String>) -> Self {
        AttributeValue::StringSlice(v)
    }
}

// ---------------------------------------------------------------------------
// Qualified names
// ---------------------------------------------------------------------------

fn qualified_name_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)+$").ok())
        .as_ref()
}

/// Whether `name` is a DNS subdomain with at least one `.` separator.
pub fn is_qualified_name(name: &str) -> bool {
    name.len() <= QUALIFIED_NAME_MAX_LEN && qualified_name_pattern().is_some_and(|re| re.is_match(name))
}

/// A fully-qualified attribute name such as `numa.dra.example.com`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QualifiedName(String);

impl QualifiedName {
    pub fn parse(name: &str) -> Result<Self, FieldErrorKind> {
        if is_qualified_name(name) {
            Ok(Self(name.to_string()))
        } else {
            Err(FieldErrorKind::NotQualified {
                name: name.to_string(),
            })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for QualifiedName {
    type Error = FieldErrorKind;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if is_qualified_name(&value) {
            Ok(Self(value))
        } else {
            Err(FieldErrorKind::NotQualified { name: value })
        }
    }
}

impl From<QualifiedName> for String {
    fn from(value: QualifiedName) -> Self {
        value.0
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
