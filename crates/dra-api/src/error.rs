//! Error taxonomy for the DRA data model.
//!
//! Structural problems are reported as [`FieldError`]s carrying the path of
//! the offending field (`spec.requests[0].oneOf[1].count`). They are
//! collected into [`ValidationErrors`] so a single pass reports everything
//! wrong with an entity.

use std::fmt;

/// Dotted/indexed path to a field inside a decoded entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct FieldPath(String);

impl FieldPath {
    /// The empty path (the entity itself).
    pub fn root() -> Self {
        Self(String::new())
    }

    /// A path starting at a named top-level field.
    pub fn new(name: &str) -> Self {
        Self(name.to_string())
    }

    /// Descend into a named field.
    pub fn child(&self, name: &str) -> Self {
        if self.0.is_empty() {
            Self(name.to_string())
        } else {
            Self(format!("{}.{}", self.0, name))
        }
    }

    /// Descend into a list element.
    pub fn index(&self, index: usize) -> Self {
        Self(format!("{}[{}]", self.0, index))
    }

    /// Descend into a map entry.
    pub fn key(&self, key: &str) -> Self {
        Self(format!("{}[{:?}]", self.0, key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            write!(f, "<root>")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// What is wrong with a single field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldErrorKind {
    #[error("required value")]
    Required,

    #[error("exactly one of {candidates:?} must be set, found none")]
    OneOfNone { candidates: Vec<String> },

    #[error("exactly one of {candidates:?} must be set, found {set:?}")]
    OneOfMany {
        candidates: Vec<String>,
        set: Vec<String>,
    },

    #[error("invalid value {value:?}: {reason}")]
    Invalid { value: String, reason: String },

    #[error("{name:?} must be fully qualified (a DNS domain containing at least one dot)")]
    NotQualified { name: String },

    #[error("must have at most {max} entries, found {actual}")]
    TooMany { max: usize, actual: usize },

    #[error("must be at most {max} bytes, found {actual}")]
    TooLong { max: usize, actual: usize },

    #[error("selector does not compile: {message}")]
    Selector { message: String },

    #[error("device class {name:?} not found")]
    UnknownClass { name: String },
}

/// A field-qualified validation failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{path}: {kind}")]
pub struct FieldError {
    pub path: FieldPath,
    pub kind: FieldErrorKind,
}

/// All structural errors found in one entity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, path: FieldPath, kind: FieldErrorKind) {
        self.0.push(FieldError { path, kind });
    }

    pub fn extend(&mut self, other: ValidationErrors) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldError> {
        self.0.iter()
    }

    /// Whether any error was reported at exactly `path`.
    pub fn has_path(&self, path: &str) -> bool {
        self.0.iter().any(|e| e.path.as_str() == path)
    }

    /// `Ok(value)` when no error was collected.
    pub fn into_result<T>(self, value: T) -> Result<T, ValidationErrors> {
        if self.0.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|e| e.to_string()).collect();
        write!(f, "{}", parts.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

impl IntoIterator for ValidationErrors {
    type Item = FieldError;
    type IntoIter = std::vec::IntoIter<FieldError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Errors produced by the DRA data model layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationErrors),

    #[error("document {index} ({kind}) is invalid: {errors}")]
    InvalidDocument {
        index: usize,
        kind: String,
        errors: ValidationErrors,
    },

    #[error("document {index} is missing apiVersion or kind")]
    MissingTypeMeta { index: usize },

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid quantity {value:?}: {reason}")]
    InvalidQuantity { value: String, reason: String },

    #[error("claim is already allocated")]
    AlreadyAllocated,

    #[error("claim is not allocated")]
    NotAllocated,

    #[error("claim deallocation is pending; no new consumers may be added")]
    DeallocationPending,

    #[error("claim is not shareable and is already reserved for {holder}")]
    NotShareable { holder: String },

    #[error("claim cannot be reserved for more than {max} consumers")]
    TooManyConsumers { max: usize },

    #[error("claim is still reserved for {consumers} consumer(s)")]
    StillReserved { consumers: usize },
}

/// Result type for data model operations.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
