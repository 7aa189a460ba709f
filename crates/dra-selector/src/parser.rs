//! Parser: recursive descent parser for selector expressions
//!
//! Consumes tokens from the lexer and produces a resolved [`Expr`]. Names
//! are resolved here: `device` fields, global functions, methods and
//! comprehension variables. Calls to `quantity`, `semver` and `matches`
//! with literal arguments are validated and folded at parse time.
//!
//! Precedence, lowest first: `?:`, `||`, `&&`, relations (`== != < <= > >=
//! in`), `+ -`, `* / %`, unary `! -`, member access / index / call.

use regex::Regex;

use dra_api::Quantity;

use crate::ast::{BinaryOp, DeviceField, Expr, Function, Method, Quantifier, UnaryOp};
use crate::error::{SelectorError, SelectorResult};
use crate::lexer::{Lexer, Token, TokenKind};
use crate::value::Value;

/// Root variable of every selector.
pub const DEVICE_VARIABLE: &str = "device";

/// Limit on parser recursion and on the height of the resulting tree.
pub const MAX_DEPTH: usize = 64;

/// Parser for selector expressions
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    scope: Vec<String>,
    depth: usize,
}

impl Parser {
    /// Parse expression text into a resolved tree
    pub fn parse(input: &str) -> SelectorResult<Expr> {
        let mut lexer = Lexer::new(input);
        let tokens = lexer.tokenize()?;
        let mut parser = Self {
            tokens,
            pos: 0,
            scope: Vec::new(),
            depth: 0,
        };
        let expr = parser.parse_expr()?;
        parser.expect(TokenKind::Eof)?;
        Ok(expr)
    }

    fn parse_expr(&mut self) -> SelectorResult<Expr> {
        self.nested(Self::parse_conditional)
    }

    /// Run `parse` one recursion level deeper.
    fn nested(&mut self, parse: fn(&mut Self) -> SelectorResult<Expr>) -> SelectorResult<Expr> {
        if self.depth >= MAX_DEPTH {
            return Err(SelectorError::TooDeep(MAX_DEPTH));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    /// Reject a node whose tree is taller than the limit.
    fn bounded(&self, expr: Expr) -> SelectorResult<Expr> {
        if expr.height() > MAX_DEPTH {
            return Err(SelectorError::TooDeep(MAX_DEPTH));
        }
        Ok(expr)
    }

    fn parse_conditional(&mut self) -> SelectorResult<Expr> {
        let condition = self.parse_or()?;
        if !self.check(TokenKind::Question) {
            return Ok(condition);
        }
        self.advance();
        let then = self.parse_or()?;
        self.expect(TokenKind::Colon)?;
        let otherwise = self.parse_expr()?;
        self.bounded(Expr::Conditional {
            condition: Box::new(condition),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        })
    }

    fn parse_or(&mut self) -> SelectorResult<Expr> {
        let mut left = self.parse_and()?;
        while self.check(TokenKind::OrOr) {
            self.advance();
            let right = self.parse_and()?;
            left = self.bounded(Expr::Or(Box::new(left), Box::new(right)))?;
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> SelectorResult<Expr> {
        let mut left = self.parse_relation()?;
        while self.check(TokenKind::AndAnd) {
            self.advance();
            let right = self.parse_relation()?;
            left = self.bounded(Expr::And(Box::new(left), Box::new(right)))?;
        }
        Ok(left)
    }

    fn parse_relation(&mut self) -> SelectorResult<Expr> {
        let mut left = self.parse_addition()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::EqEq => BinaryOp::Eq,
                TokenKind::NotEq => BinaryOp::Ne,
                TokenKind::Less => BinaryOp::Lt,
                TokenKind::LessEq => BinaryOp::Le,
                TokenKind::Greater => BinaryOp::Gt,
                TokenKind::GreaterEq => BinaryOp::Ge,
                TokenKind::In => BinaryOp::In,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_addition()?;
            left = self.bounded(binary(op, left, right))?;
        }
    }

    fn parse_addition(&mut self) -> SelectorResult<Expr> {
        let mut left = self.parse_multiplication()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_multiplication()?;
            left = self.bounded(binary(op, left, right))?;
        }
    }

    fn parse_multiplication(&mut self) -> SelectorResult<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Rem,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_unary()?;
            left = self.bounded(binary(op, left, right))?;
        }
    }

    fn parse_unary(&mut self) -> SelectorResult<Expr> {
        match self.peek_kind() {
            TokenKind::Not => {
                self.advance();
                let operand = self.nested(Self::parse_unary)?;
                self.bounded(Expr::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                })
            }
            TokenKind::Minus => {
                self.advance();
                // Fold negative literals so i64::MIN is representable.
                if self.check(TokenKind::IntLiteral) {
                    let tok = self.advance().clone();
                    let value = format!("-{}", tok.text).parse::<i64>().map_err(|_| SelectorError::Syntax {
                        line: tok.line,
                        col: tok.col,
                        message: format!("integer literal -{} out of range", tok.text),
                    })?;
                    return self.parse_postfix(Expr::Literal(Value::Int(value)));
                }
                let operand = self.nested(Self::parse_unary)?;
                self.bounded(Expr::Unary {
                    op: UnaryOp::Neg,
                    operand: Box::new(operand),
                })
            }
            _ => {
                let primary = self.parse_primary()?;
                let primary = self.bounded(primary)?;
                self.parse_postfix(primary)
            }
        }
    }

    fn parse_postfix(&mut self, mut expr: Expr) -> SelectorResult<Expr> {
        loop {
            match self.peek_kind() {
                TokenKind::Dot => {
                    self.advance();
                    let name_tok = self.expect(TokenKind::Identifier)?.clone();
                    if !self.check(TokenKind::OpenParen) {
                        return Err(SelectorError::UnknownField(name_tok.text));
                    }
                    let call = self.parse_method(expr, &name_tok)?;
                    expr = self.bounded(call)?;
                }
                TokenKind::OpenBracket => {
                    self.advance();
                    let index = self.parse_expr()?;
                    self.expect(TokenKind::CloseBracket)?;
                    expr = self.bounded(Expr::Index {
                        target: Box::new(expr),
                        index: Box::new(index),
                    })?;
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_method(&mut self, target: Expr, name_tok: &Token) -> SelectorResult<Expr> {
        let name = name_tok.text.as_str();
        if name == "all" || name == "exists" {
            let quantifier = if name == "all" {
                Quantifier::All
            } else {
                Quantifier::Exists
            };
            return self.parse_comprehension(target, quantifier, name);
        }

        let method = Method::parse(name).ok_or_else(|| SelectorError::UnknownFunction(name.to_string()))?;
        let args = self.parse_args()?;
        if args.len() != method.arity() {
            return Err(SelectorError::Arity {
                name: name.to_string(),
                expected: method.arity(),
                found: args.len(),
            });
        }

        if method == Method::Matches {
            if let Expr::Literal(Value::String(pattern)) = &args[0] {
                let pattern = Regex::new(pattern).map_err(|e| SelectorError::InvalidLiteral {
                    function: "matches".to_string(),
                    value: pattern.clone(),
                    reason: e.to_string(),
                })?;
                return Ok(Expr::MatchesLiteral {
                    target: Box::new(target),
                    pattern,
                });
            }
        }

        Ok(Expr::MethodCall {
            target: Box::new(target),
            method,
            args,
        })
    }

    fn parse_comprehension(&mut self, range: Expr, quantifier: Quantifier, name: &str) -> SelectorResult<Expr> {
        self.expect(TokenKind::OpenParen)?;
        let var_tok = self.expect(TokenKind::Identifier)?.clone();
        if var_tok.text == DEVICE_VARIABLE || self.scope.contains(&var_tok.text) {
            return Err(SelectorError::Syntax {
                line: var_tok.line,
                col: var_tok.col,
                message: format!("'{}' cannot be redeclared", var_tok.text),
            });
        }
        if !self.check(TokenKind::Comma) {
            return Err(SelectorError::Arity {
                name: name.to_string(),
                expected: 2,
                found: 1,
            });
        }
        self.advance();

        self.scope.push(var_tok.text.clone());
        let predicate = self.parse_expr();
        self.scope.pop();
        let predicate = predicate?;

        self.expect(TokenKind::CloseParen)?;
        Ok(Expr::Comprehension {
            quantifier,
            range: Box::new(range),
            variable: var_tok.text,
            predicate: Box::new(predicate),
        })
    }

    fn parse_primary(&mut self) -> SelectorResult<Expr> {
        let tok = self.advance().clone();
        match tok.kind {
            TokenKind::True => Ok(Expr::Literal(Value::Bool(true))),
            TokenKind::False => Ok(Expr::Literal(Value::Bool(false))),
            TokenKind::Null => Ok(Expr::Literal(Value::Null)),
            TokenKind::StringLiteral => Ok(Expr::Literal(Value::String(tok.text))),
            TokenKind::IntLiteral => tok
                .text
                .parse::<i64>()
                .map(|v| Expr::Literal(Value::Int(v)))
                .map_err(|_| SelectorError::Syntax {
                    line: tok.line,
                    col: tok.col,
                    message: format!("integer literal {} out of range", tok.text),
                }),
            TokenKind::OpenParen => {
                let expr = self.parse_expr()?;
                self.expect(TokenKind::CloseParen)?;
                Ok(expr)
            }
            TokenKind::OpenBracket => {
                let mut items = Vec::new();
                if !self.check(TokenKind::CloseBracket) {
                    loop {
                        items.push(self.parse_expr()?);
                        if !self.check(TokenKind::Comma) {
                            break;
                        }
                        self.advance();
                        // Trailing comma.
                        if self.check(TokenKind::CloseBracket) {
                            break;
                        }
                    }
                }
                self.expect(TokenKind::CloseBracket)?;
                Ok(Expr::List(items))
            }
            TokenKind::Identifier => self.parse_identifier(tok),
            TokenKind::Eof => Err(SelectorError::UnexpectedEof("expression".to_string())),
            _ => Err(SelectorError::UnexpectedToken {
                line: tok.line,
                col: tok.col,
                expected: "expression".to_string(),
                found: tok.text,
            }),
        }
    }

    fn parse_identifier(&mut self, tok: Token) -> SelectorResult<Expr> {
        if self.scope.contains(&tok.text) {
            return Ok(Expr::Variable(tok.text));
        }

        if tok.text == DEVICE_VARIABLE {
            if !self.check(TokenKind::Dot) {
                return Err(SelectorError::Syntax {
                    line: tok.line,
                    col: tok.col,
                    message: "'device' must be followed by a field".to_string(),
                });
            }
            self.advance();
            let field_tok = self.expect(TokenKind::Identifier)?.clone();
            let field = DeviceField::parse(&field_tok.text)
                .ok_or_else(|| SelectorError::UnknownField(field_tok.text.clone()))?;
            return Ok(Expr::Device(field));
        }

        if !self.check(TokenKind::OpenParen) {
            return Err(SelectorError::UnknownIdentifier(tok.text));
        }
        let function = Function::parse(&tok.text).ok_or_else(|| SelectorError::UnknownFunction(tok.text.clone()))?;
        let args = self.parse_args()?;
        if args.len() != 1 {
            return Err(SelectorError::Arity {
                name: tok.text,
                expected: 1,
                found: args.len(),
            });
        }
        fold_call(function, args)
    }

    fn parse_args(&mut self) -> SelectorResult<Vec<Expr>> {
        self.expect(TokenKind::OpenParen)?;
        let mut args = Vec::new();
        if !self.check(TokenKind::CloseParen) {
            loop {
                args.push(self.parse_expr()?);
                if !self.check(TokenKind::Comma) {
                    break;
                }
                self.advance();
            }
        }
        self.expect(TokenKind::CloseParen)?;
        Ok(args)
    }

    // -- Helpers --

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> TokenKind {
        self.peek().kind
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn advance(&mut self) -> &Token {
        let idx = self.pos.min(self.tokens.len() - 1);
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        &self.tokens[idx]
    }

    fn expect(&mut self, kind: TokenKind) -> SelectorResult<&Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else if self.check(TokenKind::Eof) {
            Err(SelectorError::UnexpectedEof(kind.to_string()))
        } else {
            let tok = self.peek();
            Err(SelectorError::UnexpectedToken {
                line: tok.line,
                col: tok.col,
                expected: kind.to_string(),
                found: tok.text.clone(),
            })
        }
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

/// Validate and fold literal arguments of `quantity` and `semver`.
fn fold_call(function: Function, args: Vec<Expr>) -> SelectorResult<Expr> {
    let invalid = |value: &str, reason: String| SelectorError::InvalidLiteral {
        function: function.name().to_string(),
        value: value.to_string(),
        reason,
    };
    match (function, args.first()) {
        (Function::Quantity, Some(Expr::Literal(Value::String(text)))) => Quantity::parse(text)
            .map(|q| Expr::Literal(Value::Quantity(q)))
            .map_err(|e| invalid(text, e.to_string())),
        (Function::Semver, Some(Expr::Literal(Value::String(text)))) => semver::Version::parse(text)
            .map(|v| Expr::Literal(Value::Version(v)))
            .map_err(|e| invalid(text, e.to_string())),
        _ => Ok(Expr::Call { function, args }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_device_fields() {
        let expr = Parser::parse("device.driverName").unwrap();
        assert!(matches!(expr, Expr::Device(DeviceField::DriverName)));

        let expr = Parser::parse("device.intAttributes['cores.example.com']").unwrap();
        assert!(matches!(expr, Expr::Index { .. }));

        assert_eq!(
            Parser::parse("device.colour").unwrap_err(),
            SelectorError::UnknownField("colour".to_string())
        );
        assert!(Parser::parse("device").is_err());
    }

    #[test]
    fn test_precedence() {
        // && binds tighter than ||
        let expr = Parser::parse("true || false && false").unwrap();
        assert!(matches!(expr, Expr::Or(_, _)));

        // * binds tighter than +
        let expr = Parser::parse("1 + 2 * 3 == 7").unwrap();
        let Expr::Binary { op: BinaryOp::Eq, left, .. } = expr else {
            panic!("expected ==");
        };
        assert!(matches!(*left, Expr::Binary { op: BinaryOp::Add, .. }));

        let expr = Parser::parse("true ? 1 : 2").unwrap();
        assert!(matches!(expr, Expr::Conditional { .. }));
    }

    #[test]
    fn test_literal_folding() {
        assert!(matches!(
            Parser::parse("quantity('16Gi')").unwrap(),
            Expr::Literal(Value::Quantity(_))
        ));
        assert!(matches!(
            Parser::parse("semver('1.2.3')").unwrap(),
            Expr::Literal(Value::Version(_))
        ));
        assert!(matches!(
            Parser::parse("quantity('lots')").unwrap_err(),
            SelectorError::InvalidLiteral { .. }
        ));
        assert!(matches!(
            Parser::parse("quantity('1e-2147483648')").unwrap_err(),
            SelectorError::InvalidLiteral { .. }
        ));
        assert!(matches!(
            Parser::parse("semver('1.2')").unwrap_err(),
            SelectorError::InvalidLiteral { .. }
        ));
        assert!(matches!(
            Parser::parse("device.driverName.matches('[')").unwrap_err(),
            SelectorError::InvalidLiteral { .. }
        ));
        assert!(matches!(
            Parser::parse("device.driverName.matches('^gpu')").unwrap(),
            Expr::MatchesLiteral { .. }
        ));
        assert!(matches!(Parser::parse("-5").unwrap(), Expr::Literal(Value::Int(-5))));
        assert!(Parser::parse("-9223372036854775808").is_ok());
        assert!(Parser::parse("9223372036854775808").is_err());
    }

    #[test]
    fn test_comprehension_scoping() {
        let expr = Parser::parse("[1, 2].all(x, x > 0)").unwrap();
        assert!(matches!(expr, Expr::Comprehension { quantifier: Quantifier::All, .. }));

        // The variable is not visible outside its predicate.
        assert_eq!(
            Parser::parse("[1].exists(x, true) && x > 0").unwrap_err(),
            SelectorError::UnknownIdentifier("x".to_string())
        );
        assert!(Parser::parse("[1].all(device, true)").is_err());
        assert!(Parser::parse("[1].all(x)").is_err());
    }

    #[test]
    fn test_resolution_errors() {
        assert_eq!(
            Parser::parse("foo == 1").unwrap_err(),
            SelectorError::UnknownIdentifier("foo".to_string())
        );
        assert_eq!(
            Parser::parse("bogus('x')").unwrap_err(),
            SelectorError::UnknownFunction("bogus".to_string())
        );
        assert_eq!(
            Parser::parse("'a'.shout()").unwrap_err(),
            SelectorError::UnknownFunction("shout".to_string())
        );
        assert!(matches!(
            Parser::parse("'a'.startsWith()").unwrap_err(),
            SelectorError::Arity { expected: 1, found: 0, .. }
        ));
        assert!(matches!(
            Parser::parse("size('a', 'b')").unwrap_err(),
            SelectorError::Arity { expected: 1, found: 2, .. }
        ));
    }

    #[test]
    fn test_syntax_errors() {
        assert!(matches!(Parser::parse("").unwrap_err(), SelectorError::UnexpectedEof(_)));
        assert!(matches!(Parser::parse("(1 == 1").unwrap_err(), SelectorError::UnexpectedEof(_)));
        assert!(matches!(
            Parser::parse("1 == 1 )").unwrap_err(),
            SelectorError::UnexpectedToken { .. }
        ));
        let deep = format!("{}true{}", "(".repeat(100), ")".repeat(100));
        assert_eq!(Parser::parse(&deep).unwrap_err(), SelectorError::TooDeep(MAX_DEPTH));
    }

    #[test]
    fn test_long_chains_are_bounded() {
        let and_chain = format!("true{}", " && true".repeat(3000));
        assert_eq!(Parser::parse(&and_chain).unwrap_err(), SelectorError::TooDeep(MAX_DEPTH));

        let nots = format!("{}true", "!".repeat(20_000));
        assert_eq!(Parser::parse(&nots).unwrap_err(), SelectorError::TooDeep(MAX_DEPTH));

        let negs = format!("{}device.intAttributes['a.example.com'] > 0", "- ".repeat(5_000));
        assert_eq!(Parser::parse(&negs).unwrap_err(), SelectorError::TooDeep(MAX_DEPTH));

        for op in [" + 1", " * 1", " == 1", " || false"] {
            let chain = format!("1{}", op.repeat(2_000));
            assert_eq!(Parser::parse(&chain).unwrap_err(), SelectorError::TooDeep(MAX_DEPTH), "{op}");
        }

        let indexes = format!("[1]{}", "[0]".repeat(2_000));
        assert_eq!(Parser::parse(&indexes).unwrap_err(), SelectorError::TooDeep(MAX_DEPTH));

        // Chains within the limit still parse.
        let short = format!("true{}", " && true".repeat(MAX_DEPTH - 1));
        assert_eq!(Parser::parse(&short).unwrap().height(), MAX_DEPTH);
    }
}
