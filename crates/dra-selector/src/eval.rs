//! Tree-walking evaluator.
//!
//! Evaluation is total: every failure is an [`EvalError`], never a panic.
//! `&&`, `||` and the comprehension macros absorb errors the way CEL does.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use dra_api::{AttributeType, AttributeValue, Device, Quantity};
use regex::Regex;

use crate::ast::{BinaryOp, DeviceField, Expr, Function, Method, Quantifier, UnaryOp};
use crate::error::EvalError;
use crate::value::Value;

/// Per-device variable bindings.
#[derive(Debug, Clone, Copy)]
pub struct Bindings<'a> {
    pub driver_name: &'a str,
    pub device_type: &'a str,
    pub attributes: &'a BTreeMap<String, AttributeValue>,
}

impl<'a> From<&'a Device> for Bindings<'a> {
    fn from(device: &'a Device) -> Self {
        Self {
            driver_name: &device.driver_name,
            device_type: &device.device_type,
            attributes: &device.attributes,
        }
    }
}

impl<'a> Bindings<'a> {
    fn untyped(&self, name: &str) -> Value {
        self.attributes.get(name).map(Value::from).unwrap_or(Value::Null)
    }

    fn typed(&self, name: &str, ty: AttributeType) -> Value {
        match self.attributes.get(name) {
            Some(value) if value.attribute_type() == ty => Value::from(value),
            _ => Value::from(&ty.zero_value()),
        }
    }

    fn field_map(&self, field: DeviceField) -> Value {
        let entries = self.attributes.iter().filter_map(|(name, value)| match field {
            DeviceField::Typed(ty) if value.attribute_type() != ty => None,
            _ => Some((name.clone(), Value::from(value))),
        });
        Value::Map(entries.collect())
    }
}

type EvalResult = Result<Value, EvalError>;

fn no_overload(operator: &str, operands: &[&Value]) -> EvalError {
    EvalError::NoSuchOverload {
        operator: operator.to_string(),
        operands: operands.iter().map(|v| v.type_name()).collect::<Vec<_>>().join(", "),
    }
}

pub(crate) struct Evaluator<'a> {
    bindings: Bindings<'a>,
    locals: Vec<(&'a str, Value)>,
}

impl<'a> Evaluator<'a> {
    pub(crate) fn new(bindings: Bindings<'a>) -> Self {
        Self {
            bindings,
            locals: Vec::new(),
        }
    }

    pub(crate) fn eval(&mut self, expr: &'a Expr) -> EvalResult {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::List(items) => items
                .iter()
                .map(|item| self.eval(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            Expr::Variable(name) => self
                .locals
                .iter()
                .rev()
                .find(|(n, _)| *n == name.as_str())
                .map(|(_, v)| v.clone())
                .ok_or_else(|| EvalError::UnboundVariable(name.clone())),
            Expr::Device(field) => Ok(match field {
                DeviceField::DriverName => Value::String(self.bindings.driver_name.to_string()),
                DeviceField::Type => Value::String(self.bindings.device_type.to_string()),
                DeviceField::Attributes | DeviceField::Typed(_) => self.bindings.field_map(*field),
            }),
            Expr::Index { target, index } => self.index(target, index),
            Expr::Unary { op, operand } => {
                let value = self.eval(operand)?;
                match (op, &value) {
                    (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
                    (UnaryOp::Neg, Value::Int(i)) => i.checked_neg().map(Value::Int).ok_or(EvalError::Overflow),
                    (UnaryOp::Not, _) => Err(no_overload("!_", &[&value])),
                    (UnaryOp::Neg, _) => Err(no_overload("-_", &[&value])),
                }
            }
            Expr::Binary { op, left, right } => {
                if *op == BinaryOp::In {
                    return self.membership(left, right);
                }
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                binary(*op, &left, &right)
            }
            Expr::And(left, right) => self.logical(left, right, false),
            Expr::Or(left, right) => self.logical(left, right, true),
            Expr::Conditional {
                condition,
                then,
                otherwise,
            } => match self.eval(condition)? {
                Value::Bool(true) => self.eval(then),
                Value::Bool(false) => self.eval(otherwise),
                other => Err(no_overload("_?_:_", &[&other])),
            },
            Expr::Call { function, args } => {
                let arg = match args.first() {
                    Some(arg) => self.eval(arg)?,
                    None => Value::Null,
                };
                call(*function, arg)
            }
            Expr::MethodCall { target, method, args } => {
                let receiver = self.eval(target)?;
                let args = args.iter().map(|a| self.eval(a)).collect::<Result<Vec<_>, _>>()?;
                call_method(*method, &receiver, &args)
            }
            Expr::MatchesLiteral { target, pattern } => match self.eval(target)? {
                Value::String(s) => Ok(Value::Bool(pattern.is_match(&s))),
                other => Err(no_overload("matches", &[&other])),
            },
            Expr::Comprehension {
                quantifier,
                range,
                variable,
                predicate,
            } => self.comprehension(*quantifier, range, variable, predicate),
        }
    }

    /// `device.<map>[key]` reads a single attribute without building the map.
    fn index(&mut self, target: &'a Expr, index: &'a Expr) -> EvalResult {
        if let Expr::Device(field) = target {
            let key = self.eval(index)?;
            return match (field, &key) {
                (DeviceField::Attributes, Value::String(name)) => Ok(self.bindings.untyped(name)),
                (DeviceField::Typed(ty), Value::String(name)) => Ok(self.bindings.typed(name, *ty)),
                (DeviceField::Attributes | DeviceField::Typed(_), _) => {
                    Err(no_overload("_[_]", &[&Value::Map(BTreeMap::new()), &key]))
                }
                (DeviceField::DriverName | DeviceField::Type, _) => {
                    Err(no_overload("_[_]", &[&Value::String(String::new()), &key]))
                }
            };
        }

        let target = self.eval(target)?;
        let index = self.eval(index)?;
        match (&target, &index) {
            (Value::Map(entries), Value::String(key)) => {
                entries.get(key).cloned().ok_or_else(|| EvalError::NoSuchKey(key.clone()))
            }
            (Value::List(items), Value::Int(i)) => usize::try_from(*i)
                .ok()
                .and_then(|idx| items.get(idx))
                .cloned()
                .ok_or(EvalError::IndexOutOfRange {
                    index: *i,
                    size: items.len(),
                }),
            _ => Err(no_overload("_[_]", &[&target, &index])),
        }
    }

    fn membership(&mut self, left: &'a Expr, right: &'a Expr) -> EvalResult {
        let needle = self.eval(left)?;
        if let Expr::Device(field @ (DeviceField::Attributes | DeviceField::Typed(_))) = right {
            let Value::String(key) = &needle else {
                return Err(no_overload("@in", &[&needle]));
            };
            let present = match (field, self.bindings.attributes.get(key)) {
                (_, None) => false,
                (DeviceField::Typed(ty), Some(value)) => value.attribute_type() == *ty,
                _ => true,
            };
            return Ok(Value::Bool(present));
        }

        let haystack = self.eval(right)?;
        match (&needle, &haystack) {
            (_, Value::List(items)) => Ok(Value::Bool(items.iter().any(|item| item.equals(&needle)))),
            (Value::String(key), Value::Map(entries)) => Ok(Value::Bool(entries.contains_key(key))),
            (Value::String(sub), Value::String(s)) => Ok(Value::Bool(s.contains(sub.as_str()))),
            _ => Err(no_overload("@in", &[&needle, &haystack])),
        }
    }

    /// `&&` when `short` is false, `||` when it is true. A decisive operand
    /// wins over an error on the other side.
    fn logical(&mut self, left: &'a Expr, right: &'a Expr, short: bool) -> EvalResult {
        let operator = if short { "_||_" } else { "_&&_" };
        let as_bool = |result: EvalResult| -> Result<bool, EvalError> {
            match result? {
                Value::Bool(b) => Ok(b),
                other => Err(no_overload(operator, &[&other])),
            }
        };

        let left = as_bool(self.eval(left));
        if matches!(left, Ok(b) if b == short) {
            return Ok(Value::Bool(short));
        }
        let right = as_bool(self.eval(right));
        match (left, right) {
            (_, Ok(b)) if b == short => Ok(Value::Bool(short)),
            (Ok(_), Ok(_)) => Ok(Value::Bool(!short)),
            (Err(e), _) | (_, Err(e)) => Err(e),
        }
    }

    fn comprehension(
        &mut self,
        quantifier: Quantifier,
        range: &'a Expr,
        variable: &'a str,
        predicate: &'a Expr,
    ) -> EvalResult {
        let items = match self.eval(range)? {
            Value::List(items) => items,
            Value::Map(entries) => entries.into_keys().map(Value::String).collect(),
            other => {
                let name = if quantifier == Quantifier::All { "all" } else { "exists" };
                return Err(no_overload(name, &[&other]));
            }
        };

        // `all` stops at the first false, `exists` at the first true.
        let decisive = quantifier == Quantifier::Exists;
        let mut error = None;
        for item in items {
            self.locals.push((variable, item));
            let result = self.eval(predicate);
            self.locals.pop();
            match result {
                Ok(Value::Bool(b)) if b == decisive => return Ok(Value::Bool(decisive)),
                Ok(Value::Bool(_)) => {}
                Ok(other) => {
                    error.get_or_insert(EvalError::NotBoolean(other.type_name().to_string()));
                }
                Err(e) => {
                    error.get_or_insert(e);
                }
            }
        }
        match error {
            Some(e) => Err(e),
            None => Ok(Value::Bool(!decisive)),
        }
    }
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> EvalResult {
    let fail = || no_overload(op.name(), &[left, right]);
    match op {
        BinaryOp::Eq => Ok(Value::Bool(left.equals(right))),
        BinaryOp::Ne => Ok(Value::Bool(!left.equals(right))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = left.compare(right).ok_or_else(fail)?;
            let result = match op {
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Le => ordering != Ordering::Greater,
                BinaryOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            };
            Ok(Value::Bool(result))
        }
        BinaryOp::Add => match (left, right) {
            (Value::Int(a), Value::Int(b)) => a.checked_add(*b).map(Value::Int).ok_or(EvalError::Overflow),
            (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{a}{b}"))),
            (Value::List(a), Value::List(b)) => Ok(Value::List(a.iter().chain(b).cloned().collect())),
            _ => Err(fail()),
        },
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
            let (Value::Int(a), Value::Int(b)) = (left, right) else {
                return Err(fail());
            };
            let result = match op {
                BinaryOp::Sub => a.checked_sub(*b),
                BinaryOp::Mul => a.checked_mul(*b),
                _ if *b == 0 => return Err(EvalError::DivisionByZero),
                BinaryOp::Div => a.checked_div(*b),
                _ => a.checked_rem(*b),
            };
            result.map(Value::Int).ok_or(EvalError::Overflow)
        }
        BinaryOp::In => Err(fail()),
    }
}

fn invalid_argument(function: &str, reason: impl ToString) -> EvalError {
    EvalError::InvalidArgument {
        function: function.to_string(),
        reason: reason.to_string(),
    }
}

fn size_of(function: &str, value: &Value) -> EvalResult {
    let size = match value {
        Value::String(s) => s.chars().count(),
        Value::List(items) => items.len(),
        Value::Map(entries) => entries.len(),
        other => return Err(no_overload(function, &[other])),
    };
    i64::try_from(size).map(Value::Int).map_err(|_| EvalError::Overflow)
}

fn call(function: Function, arg: Value) -> EvalResult {
    match (function, &arg) {
        (Function::Quantity, Value::String(s)) => Quantity::parse(s)
            .map(Value::Quantity)
            .map_err(|e| invalid_argument("quantity", e)),
        (Function::Semver, Value::String(s)) => semver::Version::parse(s)
            .map(Value::Version)
            .map_err(|e| invalid_argument("semver", e)),
        (Function::Size, _) => size_of("size", &arg),
        (Function::Int, Value::Int(_)) => Ok(arg),
        (Function::Int, Value::String(s)) => s.parse::<i64>().map(Value::Int).map_err(|e| invalid_argument("int", e)),
        (Function::String, Value::String(_)) => Ok(arg),
        (Function::String, Value::Int(i)) => Ok(Value::String(i.to_string())),
        (Function::String, Value::Bool(b)) => Ok(Value::String(b.to_string())),
        (Function::String, Value::Version(v)) => Ok(Value::String(v.to_string())),
        (Function::String, Value::Quantity(q)) => Ok(Value::String(q.to_string())),
        _ => Err(no_overload(function.name(), &[&arg])),
    }
}

fn call_method(method: Method, receiver: &Value, args: &[Value]) -> EvalResult {
    let name = method.name();
    let arg = args.first();
    let fail = || {
        let mut operands = vec![receiver];
        operands.extend(arg);
        no_overload(name, &operands)
    };

    match method {
        Method::IsGreaterThan | Method::IsLessThan | Method::CompareTo => {
            let ordering = match (receiver, arg) {
                (Value::Quantity(a), Some(Value::Quantity(b))) => a.cmp(b),
                (Value::Version(a), Some(Value::Version(b))) => a.cmp(b),
                _ => return Err(fail()),
            };
            Ok(match method {
                Method::IsGreaterThan => Value::Bool(ordering == Ordering::Greater),
                Method::IsLessThan => Value::Bool(ordering == Ordering::Less),
                _ => Value::Int(ordering as i64),
            })
        }
        Method::Major | Method::Minor | Method::Patch => {
            let Value::Version(v) = receiver else {
                return Err(fail());
            };
            let part = match method {
                Method::Major => v.major,
                Method::Minor => v.minor,
                _ => v.patch,
            };
            i64::try_from(part).map(Value::Int).map_err(|_| EvalError::Overflow)
        }
        Method::IsSorted => {
            let Value::List(items) = receiver else {
                return Err(fail());
            };
            let mut sorted = true;
            for pair in items.windows(2) {
                match pair[0].compare(&pair[1]) {
                    Some(Ordering::Greater) => sorted = false,
                    Some(_) => {}
                    None => return Err(no_overload(name, &[&pair[0], &pair[1]])),
                }
            }
            Ok(Value::Bool(sorted))
        }
        Method::StartsWith | Method::EndsWith | Method::Contains => {
            let (Value::String(s), Some(Value::String(other))) = (receiver, arg) else {
                return Err(fail());
            };
            Ok(Value::Bool(match method {
                Method::StartsWith => s.starts_with(other.as_str()),
                Method::EndsWith => s.ends_with(other.as_str()),
                _ => s.contains(other.as_str()),
            }))
        }
        Method::Matches => {
            let (Value::String(s), Some(Value::String(pattern))) = (receiver, arg) else {
                return Err(fail());
            };
            let re = Regex::new(pattern).map_err(|e| invalid_argument(name, e))?;
            Ok(Value::Bool(re.is_match(s)))
        }
        Method::Size => size_of(name, receiver),
    }
}
