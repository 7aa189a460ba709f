//! Error types for claim resolution.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use dra_api::ValidationErrors;
use dra_pool::PoolError;

/// How a caller should react to a failed resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// The claim (or a class it references) is malformed; fix the input.
    Validation,
    /// Not enough matching devices; terminal until the pool changes.
    NoMatch,
    /// Devices were found but disagree on a match constraint.
    ConstraintViolation,
    /// Lost reservation races; retrying later may succeed.
    Transient,
    /// Allocated by someone else (an external controller).
    Unsupported,
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureClass::Validation => "validation",
            FailureClass::NoMatch => "no_match",
            FailureClass::ConstraintViolation => "constraint_violation",
            FailureClass::Transient => "transient",
            FailureClass::Unsupported => "unsupported",
        };
        f.write_str(s)
    }
}

/// Errors that can occur while resolving a claim
#[derive(Error, Debug)]
pub enum AllocationError {
    /// Structural errors, unknown classes and selectors that do not compile
    #[error("invalid claim: {0}")]
    Validation(ValidationErrors),

    /// A referenced class is allocated by an external controller
    #[error("device class {class:?} is allocated by controller {controller:?}")]
    Unsupported { class: String, controller: String },

    /// No alternative of a request could be satisfied
    #[error("request {request} cannot be satisfied: {}", .reasons.join("; "))]
    NoMatch { request: String, reasons: Vec<String> },

    /// Allocated devices disagree on a match attribute
    #[error("devices disagree on {attribute}: [{}]", .values.join(", "))]
    ConstraintViolation { attribute: String, values: Vec<String> },

    /// Every attempt lost a reservation race
    #[error("reservation race lost after {attempts} attempt(s)")]
    RaceLost { attempts: u32 },

    /// Device pool failure
    #[error("device pool error: {0}")]
    Pool(#[from] PoolError),
}

impl AllocationError {
    pub fn classify(&self) -> FailureClass {
        match self {
            AllocationError::Validation(_) => FailureClass::Validation,
            AllocationError::Unsupported { .. } => FailureClass::Unsupported,
            AllocationError::NoMatch { .. } => FailureClass::NoMatch,
            AllocationError::ConstraintViolation { .. } => FailureClass::ConstraintViolation,
            AllocationError::RaceLost { .. } | AllocationError::Pool(_) => FailureClass::Transient,
        }
    }

    /// Only transient failures are worth retrying unchanged.
    pub fn is_retryable(&self) -> bool {
        self.classify() == FailureClass::Transient
    }
}

impl From<ValidationErrors> for AllocationError {
    fn from(errors: ValidationErrors) -> Self {
        AllocationError::Validation(errors)
    }
}

/// Result type for claim resolution
pub type AllocResult<T> = std::result::Result<T, AllocationError>;
