//! Tokenizer for filter strings.

use std::fmt;

use super::ast::ComparisonOperator;
use super::grammar::{HINT_DOUBLE_EQUALS, HINT_QUOTES, ParseError};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Bare identifier or keyword; keywords are resolved by the parser.
    Ident(String),
    /// Backtick-delimited identifier with escapes resolved.
    EscapedIdent(String),
    Str(String),
    Int(i64),
    Float(f64),
    Op(ComparisonOperator),
    LParen,
    RParen,
    Comma,
    Dot,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ident(s) => write!(f, "'{s}'"),
            Self::EscapedIdent(s) => write!(f, "`{s}`"),
            Self::Str(s) => write!(f, "\"{s}\""),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Op(op) => write!(f, "'{op}'"),
            Self::LParen => f.write_str("'('"),
            Self::RParen => f.write_str("')'"),
            Self::Comma => f.write_str("','"),
            Self::Dot => f.write_str("'.'"),
        }
    }
}

/// A token and the byte offset it starts at.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub pos: usize,
}

pub struct Lexer<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    pub fn tokenize(mut self) -> Result<Vec<Spanned>, ParseError> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token()? {
            tokens.push(token);
        }
        Ok(tokens)
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        let mut chars = self.src[self.pos..].chars();
        chars.next();
        chars.next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    /// Skip whitespace and `--` line comments.
    fn skip_trivia(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('-') if self.peek_second() == Some('-') => {
                    while let Some(c) = self.bump() {
                        if c == '\n' {
                            break;
                        }
                    }
                }
                _ => break,
            }
        }
    }

    fn next_token(&mut self) -> Result<Option<Spanned>, ParseError> {
        self.skip_trivia();
        let pos = self.pos;
        let Some(c) = self.peek() else {
            return Ok(None);
        };

        let token = match c {
            '(' | ')' | ',' | '.' => {
                self.bump();
                match c {
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    ',' => Token::Comma,
                    _ => Token::Dot,
                }
            }
            '=' => {
                self.bump();
                if self.peek() == Some('=') {
                    return Err(
                        ParseError::new("unexpected '=='", pos).with_hint(HINT_DOUBLE_EQUALS)
                    );
                }
                Token::Op(ComparisonOperator::Eq)
            }
            '!' => {
                self.bump();
                if !self.eat('=') {
                    return Err(ParseError::new("expected '=' after '!'", pos));
                }
                Token::Op(ComparisonOperator::Ne)
            }
            '<' => {
                self.bump();
                if self.eat('=') {
                    Token::Op(ComparisonOperator::Le)
                } else if self.eat('>') {
                    Token::Op(ComparisonOperator::Ne)
                } else {
                    Token::Op(ComparisonOperator::Lt)
                }
            }
            '>' => {
                self.bump();
                if self.eat('=') {
                    Token::Op(ComparisonOperator::Ge)
                } else {
                    Token::Op(ComparisonOperator::Gt)
                }
            }
            '`' => self.escaped_ident(pos)?,
            '"' | '\'' => self.string(pos, c)?,
            '-' if self.peek_second().is_some_and(|d| d.is_ascii_digit()) => self.number(pos)?,
            c if c.is_ascii_digit() => self.number(pos)?,
            c if c.is_ascii_alphabetic() || c == '_' => self.ident(),
            other => {
                return Err(ParseError::new(format!("unexpected character '{other}'"), pos));
            }
        };

        Ok(Some(Spanned { token, pos }))
    }

    fn ident(&mut self) -> Token {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            self.bump();
        }
        Token::Ident(self.src[start..self.pos].to_string())
    }

    fn escaped_ident(&mut self, start: usize) -> Result<Token, ParseError> {
        self.bump();
        let mut name = String::new();
        loop {
            match self.bump() {
                None => {
                    return Err(ParseError::new("unterminated escaped identifier", start)
                        .with_hint("close backtick-escaped property names with a matching '`'"));
                }
                Some('`') => break,
                Some('\\') => match self.bump() {
                    Some(escaped @ ('.' | '\\' | '`')) => name.push(escaped),
                    Some(other) => {
                        name.push('\\');
                        name.push(other);
                    }
                    None => {
                        return Err(ParseError::new("unterminated escaped identifier", start));
                    }
                },
                Some(c) => name.push(c),
            }
        }
        if name.is_empty() {
            return Err(ParseError::new("empty escaped identifier", start));
        }
        Ok(Token::EscapedIdent(name))
    }

    fn string(&mut self, start: usize, quote: char) -> Result<Token, ParseError> {
        self.bump();
        let mut value = String::new();
        loop {
            match self.bump() {
                None => {
                    return Err(
                        ParseError::new("unterminated string literal", start).with_hint(HINT_QUOTES)
                    );
                }
                Some(c) if c == quote => break,
                Some('\\') => match self.bump() {
                    Some(escaped @ ('"' | '\'' | '\\')) => value.push(escaped),
                    Some(other) => {
                        value.push('\\');
                        value.push(other);
                    }
                    None => {
                        return Err(ParseError::new("unterminated string literal", start)
                            .with_hint(HINT_QUOTES));
                    }
                },
                Some(c) => value.push(c),
            }
        }
        Ok(Token::Str(value))
    }

    fn number(&mut self, start: usize) -> Result<Token, ParseError> {
        self.eat('-');
        self.digits();

        let mut is_float = false;
        if self.peek() == Some('.') && self.peek_second().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
            self.digits();
            is_float = true;
        }

        if matches!(self.peek(), Some('e' | 'E')) {
            let rest = &self.src[self.pos + 1..];
            let mut chars = rest.chars();
            let exponent_follows = match chars.next() {
                Some('+' | '-') => chars.next().is_some_and(|c| c.is_ascii_digit()),
                Some(c) => c.is_ascii_digit(),
                None => false,
            };
            if exponent_follows {
                self.bump();
                if matches!(self.peek(), Some('+' | '-')) {
                    self.bump();
                }
                self.digits();
                is_float = true;
            }
        }

        let text = &self.src[start..self.pos];
        if is_float {
            text.parse::<f64>()
                .map(Token::Float)
                .map_err(|_| ParseError::new(format!("invalid number '{text}'"), start))
        } else {
            text.parse::<i64>()
                .map(Token::Int)
                .map_err(|_| {
                    ParseError::new(format!("integer literal '{text}' out of range"), start)
                })
        }
    }

    fn digits(&mut self) {
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
    }
}
