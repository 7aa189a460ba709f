//! Compiled selector programs.

use std::fmt;

use dra_api::Device;
use tracing::trace;

use crate::ast::Expr;
use crate::check::check;
use crate::error::{EvalError, SelectorError, SelectorResult};
use crate::eval::{Bindings, Evaluator};
use crate::parser::Parser;
use crate::value::Value;

/// Longest selector source accepted, in bytes.
pub const MAX_SELECTOR_LEN: usize = 10 * 1024;

/// An immutable, reusable selector program.
///
/// Programs are side-effect free and can be shared across threads.
#[derive(Debug, Clone)]
pub struct Program {
    source: String,
    /// `None` for the empty selector, which matches every device.
    expr: Option<Expr>,
}

impl Program {
    /// Parse and type-check selector text.
    pub fn compile(source: &str) -> SelectorResult<Self> {
        if source.trim().is_empty() {
            return Ok(Self {
                source: source.to_string(),
                expr: None,
            });
        }
        if source.len() > MAX_SELECTOR_LEN {
            return Err(SelectorError::TooLong {
                len: source.len(),
                max: MAX_SELECTOR_LEN,
            });
        }
        let expr = Parser::parse(source)?;
        check(&expr)?;
        Ok(Self {
            source: source.to_string(),
            expr: Some(expr),
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// True for the empty selector.
    pub fn matches_all(&self) -> bool {
        self.expr.is_none()
    }

    /// Evaluate against one device's bindings.
    pub fn evaluate(&self, bindings: Bindings<'_>) -> Result<bool, EvalError> {
        let Some(expr) = &self.expr else {
            return Ok(true);
        };
        match Evaluator::new(bindings).eval(expr)? {
            Value::Bool(b) => Ok(b),
            other => Err(EvalError::NotBoolean(other.type_name().to_string())),
        }
    }

    /// Whether `device` satisfies the selector. Evaluation errors exclude the
    /// device.
    pub fn matches(&self, device: &Device) -> bool {
        match self.evaluate(Bindings::from(device)) {
            Ok(matched) => matched,
            Err(error) => {
                trace!(
                    selector = %self.source,
                    device = %device.id(),
                    error = %error,
                    "selector evaluation failed, device excluded"
                );
                false
            }
        }
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
