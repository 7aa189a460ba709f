//! Resolved syntax tree of a selector.
//!
//! Identifiers, device fields, functions and methods are resolved while
//! parsing, so evaluation never looks anything up by name except
//! comprehension variables.

use dra_api::AttributeType;
use regex::Regex;

use crate::value::Value;

/// A field of the `device` variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceField {
    DriverName,
    Type,
    /// Untyped attribute map: missing keys read as `null`.
    Attributes,
    /// Typed attribute map: missing keys read as the type's zero value.
    Typed(AttributeType),
}

impl DeviceField {
    pub fn parse(name: &str) -> Option<Self> {
        let field = match name {
            "driverName" => DeviceField::DriverName,
            "type" => DeviceField::Type,
            "attributes" => DeviceField::Attributes,
            "stringAttributes" => DeviceField::Typed(AttributeType::String),
            "intAttributes" => DeviceField::Typed(AttributeType::Int),
            "boolAttributes" => DeviceField::Typed(AttributeType::Bool),
            "versionAttributes" => DeviceField::Typed(AttributeType::Version),
            "quantityAttributes" => DeviceField::Typed(AttributeType::Quantity),
            "stringsliceAttributes" => DeviceField::Typed(AttributeType::StringSlice),
            _ => return None,
        };
        Some(field)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
}

impl BinaryOp {
    /// Operator name as it appears in overload errors.
    pub fn name(self) -> &'static str {
        match self {
            BinaryOp::Add => "_+_",
            BinaryOp::Sub => "_-_",
            BinaryOp::Mul => "_*_",
            BinaryOp::Div => "_/_",
            BinaryOp::Rem => "_%_",
            BinaryOp::Eq => "_==_",
            BinaryOp::Ne => "_!=_",
            BinaryOp::Lt => "_<_",
            BinaryOp::Le => "_<=_",
            BinaryOp::Gt => "_>_",
            BinaryOp::Ge => "_>=_",
            BinaryOp::In => "@in",
        }
    }
}

/// Global functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Quantity,
    Semver,
    Size,
    Int,
    String,
}

impl Function {
    pub fn parse(name: &str) -> Option<Self> {
        let function = match name {
            "quantity" => Function::Quantity,
            "semver" => Function::Semver,
            "size" => Function::Size,
            "int" => Function::Int,
            "string" => Function::String,
            _ => return None,
        };
        Some(function)
    }

    pub fn name(self) -> &'static str {
        match self {
            Function::Quantity => "quantity",
            Function::Semver => "semver",
            Function::Size => "size",
            Function::Int => "int",
            Function::String => "string",
        }
    }
}

/// Receiver-style functions (`x.startsWith('a')`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    IsGreaterThan,
    IsLessThan,
    CompareTo,
    Major,
    Minor,
    Patch,
    IsSorted,
    StartsWith,
    EndsWith,
    Contains,
    Matches,
    Size,
}

impl Method {
    pub fn parse(name: &str) -> Option<Self> {
        let method = match name {
            "isGreaterThan" => Method::IsGreaterThan,
            "isLessThan" => Method::IsLessThan,
            "compareTo" => Method::CompareTo,
            "major" => Method::Major,
            "minor" => Method::Minor,
            "patch" => Method::Patch,
            "isSorted" => Method::IsSorted,
            "startsWith" => Method::StartsWith,
            "endsWith" => Method::EndsWith,
            "contains" => Method::Contains,
            "matches" => Method::Matches,
            "size" => Method::Size,
            _ => return None,
        };
        Some(method)
    }

    pub fn name(self) -> &'static str {
        match self {
            Method::IsGreaterThan => "isGreaterThan",
            Method::IsLessThan => "isLessThan",
            Method::CompareTo => "compareTo",
            Method::Major => "major",
            Method::Minor => "minor",
            Method::Patch => "patch",
            Method::IsSorted => "isSorted",
            Method::StartsWith => "startsWith",
            Method::EndsWith => "endsWith",
            Method::Contains => "contains",
            Method::Matches => "matches",
            Method::Size => "size",
        }
    }

    /// Number of arguments besides the receiver.
    pub fn arity(self) -> usize {
        match self {
            Method::Major | Method::Minor | Method::Patch | Method::IsSorted | Method::Size => 0,
            _ => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantifier {
    All,
    Exists,
}

#[derive(Debug, Clone)]
pub enum Expr {
    Literal(Value),
    List(Vec<Expr>),
    /// A comprehension variable.
    Variable(String),
    Device(DeviceField),
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Conditional {
        condition: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Call {
        function: Function,
        args: Vec<Expr>,
    },
    MethodCall {
        target: Box<Expr>,
        method: Method,
        args: Vec<Expr>,
    },
    /// `matches` with a literal pattern, compiled once.
    MatchesLiteral {
        target: Box<Expr>,
        pattern: Regex,
    },
    Comprehension {
        quantifier: Quantifier,
        range: Box<Expr>,
        variable: String,
        predicate: Box<Expr>,
    },
}

impl Expr {
    /// Length of the longest path from this node to a leaf, the node included.
    pub fn height(&self) -> usize {
        let children = match self {
            Expr::Literal(_) | Expr::Variable(_) | Expr::Device(_) => 0,
            Expr::List(items) => max_height(items),
            Expr::Index { target, index } => target.height().max(index.height()),
            Expr::Unary { operand, .. } => operand.height(),
            Expr::Binary { left, right, .. } | Expr::And(left, right) | Expr::Or(left, right) => {
                left.height().max(right.height())
            }
            Expr::Conditional {
                condition,
                then,
                otherwise,
            } => condition.height().max(then.height()).max(otherwise.height()),
            Expr::Call { args, .. } => max_height(args),
            Expr::MethodCall { target, args, .. } => target.height().max(max_height(args)),
            Expr::MatchesLiteral { target, .. } => target.height(),
            Expr::Comprehension { range, predicate, .. } => range.height().max(predicate.height()),
        };
        children + 1
    }
}

fn max_height(exprs: &[Expr]) -> usize {
    exprs.iter().map(Expr::height).max().unwrap_or(0)
}
