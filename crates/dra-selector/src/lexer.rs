//! Lexer: tokenizes selector expressions.
//!
//! Handles identifiers and keywords, single- and double-quoted strings with
//! escapes, decimal and hexadecimal integers, and the operator set of the
//! selector language.

use crate::error::{SelectorError, SelectorResult};

/// A token produced by the lexer
#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// The raw text of the token (unescaped content for strings)
    pub text: String,
    /// Line number (1-based)
    pub line: usize,
    /// Column number (1-based)
    pub col: usize,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>, line: usize, col: usize) -> Self {
        Self {
            kind,
            text: text.into(),
            line,
            col,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    // Keywords
    True,
    False,
    Null,
    In,

    // Identifiers and literals
    Identifier,
    StringLiteral,
    IntLiteral,

    // Structural
    OpenParen,
    CloseParen,
    OpenBracket,
    CloseBracket,
    Dot,
    Comma,
    Question,
    Colon,

    // Operators
    Not,
    Minus,
    Plus,
    Star,
    Slash,
    Percent,
    EqEq,
    NotEq,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    AndAnd,
    OrOr,

    // End of input
    Eof,
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::True => "true",
            Self::False => "false",
            Self::Null => "null",
            Self::In => "in",
            Self::Identifier => "identifier",
            Self::StringLiteral => "string literal",
            Self::IntLiteral => "integer",
            Self::OpenParen => "(",
            Self::CloseParen => ")",
            Self::OpenBracket => "[",
            Self::CloseBracket => "]",
            Self::Dot => ".",
            Self::Comma => ",",
            Self::Question => "?",
            Self::Colon => ":",
            Self::Not => "!",
            Self::Minus => "-",
            Self::Plus => "+",
            Self::Star => "*",
            Self::Slash => "/",
            Self::Percent => "%",
            Self::EqEq => "==",
            Self::NotEq => "!=",
            Self::Less => "<",
            Self::LessEq => "<=",
            Self::Greater => ">",
            Self::GreaterEq => ">=",
            Self::AndAnd => "&&",
            Self::OrOr => "||",
            Self::Eof => "end of expression",
        };
        f.write_str(text)
    }
}

/// Lexer for selector expressions
pub struct Lexer {
    input: Vec<char>,
    pos: usize,
    line: usize,
    col: usize,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    /// Tokenize the entire input
    pub fn tokenize(&mut self) -> SelectorResult<Vec<Token>> {
        let mut tokens = Vec::new();

        loop {
            self.skip_whitespace_and_comments();

            if self.pos >= self.input.len() {
                tokens.push(Token::new(TokenKind::Eof, "", self.line, self.col));
                break;
            }

            let token = self.next_token()?;
            tokens.push(token);
        }

        Ok(tokens)
    }

    fn next_token(&mut self) -> SelectorResult<Token> {
        let ch = self.input[self.pos];
        let line = self.line;
        let col = self.col;

        let two = |lexer: &mut Self, kind: TokenKind, text: &str| -> SelectorResult<Token> {
            lexer.advance();
            lexer.advance();
            Ok(Token::new(kind, text, line, col))
        };
        let one = |lexer: &mut Self, kind: TokenKind| -> SelectorResult<Token> {
            lexer.advance();
            Ok(Token::new(kind, ch.to_string(), line, col))
        };

        match ch {
            '(' => one(self, TokenKind::OpenParen),
            ')' => one(self, TokenKind::CloseParen),
            '[' => one(self, TokenKind::OpenBracket),
            ']' => one(self, TokenKind::CloseBracket),
            '.' => one(self, TokenKind::Dot),
            ',' => one(self, TokenKind::Comma),
            '?' => one(self, TokenKind::Question),
            ':' => one(self, TokenKind::Colon),
            '+' => one(self, TokenKind::Plus),
            '-' => one(self, TokenKind::Minus),
            '*' => one(self, TokenKind::Star),
            '/' => one(self, TokenKind::Slash),
            '%' => one(self, TokenKind::Percent),
            '=' if self.peek_at(1) == Some('=') => two(self, TokenKind::EqEq, "=="),
            '!' if self.peek_at(1) == Some('=') => two(self, TokenKind::NotEq, "!="),
            '!' => one(self, TokenKind::Not),
            '<' if self.peek_at(1) == Some('=') => two(self, TokenKind::LessEq, "<="),
            '<' => one(self, TokenKind::Less),
            '>' if self.peek_at(1) == Some('=') => two(self, TokenKind::GreaterEq, ">="),
            '>' => one(self, TokenKind::Greater),
            '&' if self.peek_at(1) == Some('&') => two(self, TokenKind::AndAnd, "&&"),
            '|' if self.peek_at(1) == Some('|') => two(self, TokenKind::OrOr, "||"),
            '"' | '\'' => self.read_string_literal(ch),
            c if c.is_ascii_digit() => self.read_number(),
            c if c.is_ascii_alphabetic() || c == '_' => Ok(self.read_identifier_or_keyword()),
            _ => Err(SelectorError::Syntax {
                line,
                col,
                message: format!("unexpected character '{}'", ch),
            }),
        }
    }

    fn read_string_literal(&mut self, quote: char) -> SelectorResult<Token> {
        let line = self.line;
        let col = self.col;
        self.advance(); // opening quote

        let mut text = String::new();
        loop {
            let Some(c) = self.current() else {
                return Err(SelectorError::Syntax {
                    line,
                    col,
                    message: "unterminated string literal".into(),
                });
            };
            if c == quote {
                self.advance();
                break;
            }
            if c == '\n' {
                return Err(SelectorError::Syntax {
                    line,
                    col,
                    message: "newline in string literal".into(),
                });
            }
            if c == '\\' {
                let escaped = match self.peek_at(1) {
                    Some('\\') => '\\',
                    Some('\'') => '\'',
                    Some('"') => '"',
                    Some('n') => '\n',
                    Some('t') => '\t',
                    Some('r') => '\r',
                    other => {
                        return Err(SelectorError::Syntax {
                            line: self.line,
                            col: self.col,
                            message: format!("invalid escape sequence '\\{}'", other.unwrap_or(' ')),
                        })
                    }
                };
                text.push(escaped);
                self.advance();
                self.advance();
                continue;
            }
            text.push(c);
            self.advance();
        }

        Ok(Token::new(TokenKind::StringLiteral, text, line, col))
    }

    fn read_number(&mut self) -> SelectorResult<Token> {
        let line = self.line;
        let col = self.col;
        let mut text = String::new();

        let hex = self.current() == Some('0') && matches!(self.peek_at(1), Some('x') | Some('X'));
        if hex {
            self.advance();
            self.advance();
            while let Some(c) = self.current().filter(|c| c.is_ascii_hexdigit()) {
                text.push(c);
                self.advance();
            }
            let value = i64::from_str_radix(&text, 16).map_err(|_| SelectorError::Syntax {
                line,
                col,
                message: format!("invalid hexadecimal literal '0x{}'", text),
            })?;
            return Ok(Token::new(TokenKind::IntLiteral, value.to_string(), line, col));
        }

        while let Some(c) = self.current().filter(|c| c.is_ascii_digit()) {
            text.push(c);
            self.advance();
        }
        if self.current().is_some_and(|c| c.is_ascii_alphabetic() || c == '_') {
            return Err(SelectorError::Syntax {
                line,
                col,
                message: format!("invalid number literal starting with '{}'", text),
            });
        }
        Ok(Token::new(TokenKind::IntLiteral, text, line, col))
    }

    fn read_identifier_or_keyword(&mut self) -> Token {
        let line = self.line;
        let col = self.col;
        let mut text = String::new();

        while let Some(c) = self.current().filter(|c| c.is_ascii_alphanumeric() || *c == '_') {
            text.push(c);
            self.advance();
        }

        let kind = match text.as_str() {
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            "null" => TokenKind::Null,
            "in" => TokenKind::In,
            _ => TokenKind::Identifier,
        };
        Token::new(kind, text, line, col)
    }

    fn skip_whitespace_and_comments(&mut self) {
        while let Some(c) = self.current() {
            if c.is_whitespace() {
                self.advance();
            } else if c == '/' && self.peek_at(1) == Some('/') {
                while self.current().is_some_and(|c| c != '\n') {
                    self.advance();
                }
            } else {
                break;
            }
        }
    }

    fn current(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.input.get(self.pos + offset).copied()
    }

    fn advance(&mut self) {
        if let Some(c) = self.current() {
            self.pos += 1;
            if c == '\n' {
                self.line += 1;
                self.col = 1;
            } else {
                self.col += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        Lexer::new(input)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            kinds("a == b != c <= d >= e < f > g && h || !i"),
            vec![
                TokenKind::Identifier,
                TokenKind::EqEq,
                TokenKind::Identifier,
                TokenKind::NotEq,
                TokenKind::Identifier,
                TokenKind::LessEq,
                TokenKind::Identifier,
                TokenKind::GreaterEq,
                TokenKind::Identifier,
                TokenKind::Less,
                TokenKind::Identifier,
                TokenKind::Greater,
                TokenKind::Identifier,
                TokenKind::AndAnd,
                TokenKind::Identifier,
                TokenKind::OrOr,
                TokenKind::Not,
                TokenKind::Identifier,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_strings_and_escapes() {
        let tokens = Lexer::new(r#"'a.example.com' "say \"hi\"\n""#).tokenize().unwrap();
        assert_eq!(tokens[0].kind, TokenKind::StringLiteral);
        assert_eq!(tokens[0].text, "a.example.com");
        assert_eq!(tokens[1].text, "say \"hi\"\n");
    }

    #[test]
    fn test_numbers_and_keywords() {
        let tokens = Lexer::new("42 0x1F true false null in").tokenize().unwrap();
        assert_eq!(tokens[0].text, "42");
        assert_eq!(tokens[1].text, "31");
        assert_eq!(
            tokens.iter().skip(2).map(|t| t.kind).collect::<Vec<_>>(),
            vec![TokenKind::True, TokenKind::False, TokenKind::Null, TokenKind::In, TokenKind::Eof]
        );
    }

    #[test]
    fn test_positions_and_comments() {
        let tokens = Lexer::new("a // comment\n  && b").tokenize().unwrap();
        assert_eq!((tokens[1].line, tokens[1].col), (2, 3));
        assert_eq!(tokens[1].kind, TokenKind::AndAnd);
    }

    #[test]
    fn test_errors() {
        assert!(matches!(
            Lexer::new("'open").tokenize(),
            Err(SelectorError::Syntax { line: 1, col: 1, .. })
        ));
        assert!(Lexer::new("a & b").tokenize().is_err());
        assert!(Lexer::new("12abc").tokenize().is_err());
        assert!(Lexer::new(r"'\q'").tokenize().is_err());
        assert!(Lexer::new("0xFFFFFFFFFFFFFFFFFF").tokenize().is_err());
    }
}
