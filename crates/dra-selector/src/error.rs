//! Selector error types.
//!
//! [`SelectorError`] is a compile-time failure and makes the selector (and
//! the entity carrying it) invalid. [`EvalError`] is a runtime failure for
//! one device; callers treat it as "device does not match".

/// Errors raised while compiling a selector expression.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectorError {
    #[error("syntax error at line {line}, column {col}: {message}")]
    Syntax {
        line: usize,
        col: usize,
        message: String,
    },

    #[error("unexpected token at line {line}, column {col}: expected {expected}, found '{found}'")]
    UnexpectedToken {
        line: usize,
        col: usize,
        expected: String,
        found: String,
    },

    #[error("unexpected end of expression: expected {0}")]
    UnexpectedEof(String),

    #[error("undeclared reference to '{0}'")]
    UnknownIdentifier(String),

    #[error("device has no field '{0}'")]
    UnknownField(String),

    #[error("undeclared function or method '{0}'")]
    UnknownFunction(String),

    #[error("'{name}' takes {expected} argument(s), found {found}")]
    Arity {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("invalid argument {value:?} to '{function}': {reason}")]
    InvalidLiteral {
        function: String,
        value: String,
        reason: String,
    },

    #[error("type error: {0}")]
    TypeMismatch(String),

    #[error("expression nested deeper than {0} levels")]
    TooDeep(usize),

    #[error("selector is {len} bytes long, limit is {max}")]
    TooLong { len: usize, max: usize },
}

/// Result type for selector compilation.
pub type SelectorResult<T> = std::result::Result<T, SelectorError>;

/// Errors raised while evaluating a compiled selector against one device.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvalError {
    #[error("no such overload: {operator} applied to ({operands})")]
    NoSuchOverload { operator: String, operands: String },

    #[error("no such key: {0}")]
    NoSuchKey(String),

    #[error("index {index} out of range for list of size {size}")]
    IndexOutOfRange { index: i64, size: usize },

    #[error("division by zero")]
    DivisionByZero,

    #[error("integer overflow")]
    Overflow,

    #[error("invalid argument to '{function}': {reason}")]
    InvalidArgument { function: String, reason: String },

    #[error("selector evaluated to {0}, not bool")]
    NotBoolean(String),

    #[error("unbound variable '{0}'")]
    UnboundVariable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let e = SelectorError::Syntax {
            line: 1,
            col: 4,
            message: "unterminated string".to_string(),
        };
        assert_eq!(e.to_string(), "syntax error at line 1, column 4: unterminated string");

        let e = EvalError::NoSuchOverload {
            operator: "_<_".to_string(),
            operands: "string, int".to_string(),
        };
        assert_eq!(e.to_string(), "no such overload: _<_ applied to (string, int)");
    }
}
