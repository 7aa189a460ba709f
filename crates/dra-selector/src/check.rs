//! Compile-time type checking.
//!
//! Infers a static type for every node. Untyped attribute lookups are
//! `Dyn` and unify with anything, so only combinations that can never
//! succeed at runtime are rejected.

use std::fmt;

use dra_api::AttributeType;

use crate::ast::{BinaryOp, DeviceField, Expr, Function, Method, UnaryOp};
use crate::error::{SelectorError, SelectorResult};
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaticType {
    Null,
    Bool,
    Int,
    String,
    Version,
    Quantity,
    List(Box<StaticType>),
    Map(Box<StaticType>),
    Dyn,
}

impl StaticType {
    fn of_attribute(ty: AttributeType) -> Self {
        match ty {
            AttributeType::String => StaticType::String,
            AttributeType::Int => StaticType::Int,
            AttributeType::Bool => StaticType::Bool,
            AttributeType::Version => StaticType::Version,
            AttributeType::Quantity => StaticType::Quantity,
            AttributeType::StringSlice => StaticType::List(Box::new(StaticType::String)),
        }
    }

    fn of_value(value: &Value) -> Self {
        match value {
            Value::Null => StaticType::Null,
            Value::Bool(_) => StaticType::Bool,
            Value::Int(_) => StaticType::Int,
            Value::String(_) => StaticType::String,
            Value::Version(_) => StaticType::Version,
            Value::Quantity(_) => StaticType::Quantity,
            Value::List(items) => StaticType::List(Box::new(common(items.iter().map(StaticType::of_value)))),
            Value::Map(entries) => StaticType::Map(Box::new(common(entries.values().map(StaticType::of_value)))),
        }
    }

    fn is(&self, other: &StaticType) -> bool {
        matches!(self, StaticType::Dyn) || self == other
    }

    fn is_dyn(&self) -> bool {
        matches!(self, StaticType::Dyn)
    }

    /// Whether two types may hold equal values at runtime.
    fn compatible(&self, other: &StaticType) -> bool {
        match (self, other) {
            (StaticType::Dyn, _) | (_, StaticType::Dyn) => true,
            (StaticType::Null, _) | (_, StaticType::Null) => true,
            (StaticType::List(a), StaticType::List(b)) | (StaticType::Map(a), StaticType::Map(b)) => a.compatible(b),
            _ => self == other,
        }
    }

    fn orderable(&self) -> bool {
        matches!(
            self,
            StaticType::Int
                | StaticType::String
                | StaticType::Bool
                | StaticType::Version
                | StaticType::Quantity
                | StaticType::Dyn
        )
    }
}

impl fmt::Display for StaticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StaticType::Null => write!(f, "null_type"),
            StaticType::Bool => write!(f, "bool"),
            StaticType::Int => write!(f, "int"),
            StaticType::String => write!(f, "string"),
            StaticType::Version => write!(f, "semver"),
            StaticType::Quantity => write!(f, "quantity"),
            StaticType::List(elem) => write!(f, "list({elem})"),
            StaticType::Map(elem) => write!(f, "map(string, {elem})"),
            StaticType::Dyn => write!(f, "dyn"),
        }
    }
}

/// Single element type of a list literal, or `Dyn` when mixed or empty.
fn common(mut types: impl Iterator<Item = StaticType>) -> StaticType {
    let Some(first) = types.next() else {
        return StaticType::Dyn;
    };
    if types.all(|t| t == first) {
        first
    } else {
        StaticType::Dyn
    }
}

/// Check a parsed selector. The expression must be boolean.
pub fn check(expr: &Expr) -> SelectorResult<()> {
    let mut checker = Checker { scope: Vec::new() };
    let ty = checker.infer(expr)?;
    if ty.is(&StaticType::Bool) {
        Ok(())
    } else {
        Err(mismatch(format!("selector must evaluate to bool, found {ty}")))
    }
}

fn mismatch(message: String) -> SelectorError {
    SelectorError::TypeMismatch(message)
}

struct Checker {
    scope: Vec<(String, StaticType)>,
}

impl Checker {
    fn infer(&mut self, expr: &Expr) -> SelectorResult<StaticType> {
        match expr {
            Expr::Literal(value) => Ok(StaticType::of_value(value)),
            Expr::List(items) => {
                let types = items.iter().map(|item| self.infer(item)).collect::<SelectorResult<Vec<_>>>()?;
                Ok(StaticType::List(Box::new(common(types.into_iter()))))
            }
            Expr::Variable(name) => Ok(self
                .scope
                .iter()
                .rev()
                .find(|(n, _)| n == name)
                .map(|(_, ty)| ty.clone())
                .unwrap_or(StaticType::Dyn)),
            Expr::Device(field) => Ok(match field {
                DeviceField::DriverName | DeviceField::Type => StaticType::String,
                DeviceField::Attributes => StaticType::Map(Box::new(StaticType::Dyn)),
                DeviceField::Typed(ty) => StaticType::Map(Box::new(StaticType::of_attribute(*ty))),
            }),
            Expr::Index { target, index } => {
                let target = self.infer(target)?;
                let index = self.infer(index)?;
                match target {
                    StaticType::Map(elem) if index.is(&StaticType::String) => Ok(*elem),
                    StaticType::List(elem) if index.is(&StaticType::Int) => Ok(*elem),
                    StaticType::Dyn => Ok(StaticType::Dyn),
                    other => Err(mismatch(format!("cannot index {other} with {index}"))),
                }
            }
            Expr::Unary { op, operand } => {
                let ty = self.infer(operand)?;
                let expected = match op {
                    UnaryOp::Not => StaticType::Bool,
                    UnaryOp::Neg => StaticType::Int,
                };
                if ty.is(&expected) {
                    Ok(expected)
                } else {
                    let symbol = if *op == UnaryOp::Not { "!" } else { "-" };
                    Err(mismatch(format!("'{symbol}' cannot be applied to {ty}")))
                }
            }
            Expr::Binary { op, left, right } => {
                let left = self.infer(left)?;
                let right = self.infer(right)?;
                self.binary(*op, left, right)
            }
            Expr::And(left, right) | Expr::Or(left, right) => {
                for side in [left, right] {
                    let ty = self.infer(side)?;
                    if !ty.is(&StaticType::Bool) {
                        return Err(mismatch(format!("logical operand must be bool, found {ty}")));
                    }
                }
                Ok(StaticType::Bool)
            }
            Expr::Conditional {
                condition,
                then,
                otherwise,
            } => {
                let cond = self.infer(condition)?;
                if !cond.is(&StaticType::Bool) {
                    return Err(mismatch(format!("condition must be bool, found {cond}")));
                }
                let then = self.infer(then)?;
                let otherwise = self.infer(otherwise)?;
                Ok(if then == otherwise { then } else { StaticType::Dyn })
            }
            Expr::Call { function, args } => {
                let arg = match args.first() {
                    Some(arg) => self.infer(arg)?,
                    None => StaticType::Dyn,
                };
                self.call(*function, arg)
            }
            Expr::MethodCall { target, method, args } => {
                let receiver = self.infer(target)?;
                let args = args.iter().map(|a| self.infer(a)).collect::<SelectorResult<Vec<_>>>()?;
                self.method(*method, receiver, args)
            }
            Expr::MatchesLiteral { target, .. } => {
                let receiver = self.infer(target)?;
                self.method(Method::Matches, receiver, vec![StaticType::String])
            }
            Expr::Comprehension {
                range,
                variable,
                predicate,
                ..
            } => {
                let range = self.infer(range)?;
                let elem = match range {
                    StaticType::List(elem) => *elem,
                    StaticType::Map(_) => StaticType::String,
                    StaticType::Dyn => StaticType::Dyn,
                    other => return Err(mismatch(format!("cannot iterate over {other}"))),
                };
                self.scope.push((variable.clone(), elem));
                let result = self.infer(predicate);
                self.scope.pop();
                let ty = result?;
                if ty.is(&StaticType::Bool) {
                    Ok(StaticType::Bool)
                } else {
                    Err(mismatch(format!("comprehension predicate must be bool, found {ty}")))
                }
            }
        }
    }

    fn binary(&self, op: BinaryOp, left: StaticType, right: StaticType) -> SelectorResult<StaticType> {
        let fail = || mismatch(format!("no overload {} for ({left}, {right})", op.name()));
        match op {
            BinaryOp::Eq | BinaryOp::Ne => {
                if left.compatible(&right) {
                    Ok(StaticType::Bool)
                } else {
                    Err(fail())
                }
            }
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                let same = left.is_dyn() || right.is_dyn() || left == right;
                if left.orderable() && right.orderable() && same {
                    Ok(StaticType::Bool)
                } else {
                    Err(fail())
                }
            }
            BinaryOp::In => match &right {
                StaticType::List(elem) if left.compatible(elem) => Ok(StaticType::Bool),
                StaticType::Map(_) | StaticType::String if left.is(&StaticType::String) => Ok(StaticType::Bool),
                StaticType::Dyn => Ok(StaticType::Bool),
                _ => Err(fail()),
            },
            BinaryOp::Add => match (&left, &right) {
                (StaticType::Dyn, _) | (_, StaticType::Dyn) => Ok(StaticType::Dyn),
                (StaticType::Int, StaticType::Int) => Ok(StaticType::Int),
                (StaticType::String, StaticType::String) => Ok(StaticType::String),
                (StaticType::List(a), StaticType::List(b)) => Ok(if a == b {
                    left.clone()
                } else {
                    StaticType::List(Box::new(StaticType::Dyn))
                }),
                _ => Err(fail()),
            },
            BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
                if left.is(&StaticType::Int) && right.is(&StaticType::Int) {
                    Ok(StaticType::Int)
                } else {
                    Err(fail())
                }
            }
        }
    }

    fn call(&self, function: Function, arg: StaticType) -> SelectorResult<StaticType> {
        let (ok, result) = match function {
            Function::Quantity => (arg.is(&StaticType::String), StaticType::Quantity),
            Function::Semver => (arg.is(&StaticType::String), StaticType::Version),
            Function::Size => (
                matches!(
                    arg,
                    StaticType::String | StaticType::List(_) | StaticType::Map(_) | StaticType::Dyn
                ),
                StaticType::Int,
            ),
            Function::Int => (
                matches!(arg, StaticType::Int | StaticType::String | StaticType::Dyn),
                StaticType::Int,
            ),
            Function::String => (true, StaticType::String),
        };
        if ok {
            Ok(result)
        } else {
            Err(mismatch(format!("no overload {}({arg})", function.name())))
        }
    }

    fn method(&self, method: Method, receiver: StaticType, args: Vec<StaticType>) -> SelectorResult<StaticType> {
        let arg = args.first().cloned().unwrap_or(StaticType::Dyn);
        let measurable = |t: &StaticType| t.is(&StaticType::Version) || t.is(&StaticType::Quantity);
        let (ok, result) = match method {
            Method::IsGreaterThan | Method::IsLessThan => (
                measurable(&receiver) && (receiver.is_dyn() || arg.is(&receiver)),
                StaticType::Bool,
            ),
            Method::CompareTo => (
                measurable(&receiver) && (receiver.is_dyn() || arg.is(&receiver)),
                StaticType::Int,
            ),
            Method::Major | Method::Minor | Method::Patch => (receiver.is(&StaticType::Version), StaticType::Int),
            Method::IsSorted => (
                matches!(receiver, StaticType::List(_) | StaticType::Dyn),
                StaticType::Bool,
            ),
            Method::StartsWith | Method::EndsWith | Method::Contains | Method::Matches => (
                receiver.is(&StaticType::String) && arg.is(&StaticType::String),
                StaticType::Bool,
            ),
            Method::Size => (
                matches!(
                    receiver,
                    StaticType::String | StaticType::List(_) | StaticType::Map(_) | StaticType::Dyn
                ),
                StaticType::Int,
            ),
        };
        if ok {
            Ok(result)
        } else {
            Err(mismatch(format!("no overload {receiver}.{}({arg})", method.name())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;

    fn check_text(text: &str) -> SelectorResult<()> {
        check(&Parser::parse(text)?)
    }

    #[test]
    fn test_well_typed_selectors() {
        for text in [
            "device.driverName == 'gpu.example.com'",
            "device.attributes['model.example.com'] == 'f100'",
            "device.attributes['cores.example.com'] > 4",
            "device.quantityAttributes['memory.example.com'].isGreaterThan(quantity('16Gi'))",
            "device.versionAttributes['fw.example.com'].major() >= 1",
            "device.stringsliceAttributes['tags.example.com'].exists(t, t.startsWith('fast'))",
            "'nvlink' in device.stringsliceAttributes['links.example.com']",
            "size(device.stringAttributes['model.example.com']) > 0 ? true : false",
            "device.attributes['x.example.com'] == null",
        ] {
            assert!(check_text(text).is_ok(), "{text}: {:?}", check_text(text));
        }
    }

    #[test]
    fn test_top_level_must_be_bool() {
        assert!(matches!(check_text("1 + 2"), Err(SelectorError::TypeMismatch(_))));
        assert!(matches!(check_text("'gpu'"), Err(SelectorError::TypeMismatch(_))));
        assert!(check_text("true").is_ok());
        // Untyped lookups are deferred to runtime.
        assert!(check_text("device.attributes['flag.example.com']").is_ok());
    }

    #[test]
    fn test_type_mismatches() {
        for text in [
            "device.driverName == 1",
            "device.intAttributes['cores.example.com'] < 'four'",
            "device.driverName.major() == 1",
            "!device.driverName",
            "device.intAttributes['cores.example.com'] + 'x' == 1",
            "quantity(1) == quantity('1')",
            "device.intAttributes['a.example.com'].all(x, true)",
            "[1, 2].exists(x, x.startsWith('a'))",
        ] {
            assert!(
                matches!(check_text(text), Err(SelectorError::TypeMismatch(_))),
                "{text}: {:?}",
                check_text(text)
            );
        }
    }
}
