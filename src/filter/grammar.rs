//! Recursive-descent parser for the filter language.
//!
//! ```text
//! WhereClause := OrExpr
//! OrExpr      := AndExpr ("OR" AndExpr)*
//! AndExpr     := Term ("AND" Term)*
//! Term        := "(" OrExpr ")" | Comparison
//! Comparison  := PropertyRef Operator Value
//! PropertyRef := EscapedIdent | Ident ("." ValueTypeSuffix)?
//! Operator    := "=" | "!=" | "<>" | ">=" | "<=" | ">" | "<" | LIKE | ILIKE | IN
//! Value       := String | Int | Float | Bool | "(" [Value ("," Value)*] ")"
//! ```
//!
//! The parenthesized list form is only accepted after `IN`.

use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;

use super::ast::{ComparisonOperator, ValueType};
use super::lexer::{Lexer, Spanned, Token};

pub(crate) const HINT_QUOTES: &str =
    "string values must be wrapped in matching single or double quotes";
pub(crate) const HINT_DOUBLE_EQUALS: &str = "use a single '=' for equality";
const HINT_UNQUOTED_VALUE: &str = "quote string values, e.g. name = \"my-model\"";
const HINT_DOTTED_NAME: &str = "escape property names containing dots with backticks, \
     e.g. `mlflow.source.type` = \"notebook\"";
const HINT_LIST_WITHOUT_IN: &str = "parenthesized value lists are only valid after IN";
const HINT_TOO_COMPLEX: &str = "split the filter or drop redundant parentheses";

/// Deepest parenthesized group accepted.
pub const MAX_NESTING_DEPTH: usize = 64;
/// Most comparisons accepted in one filter. Reduced chains are left-deep, so
/// this also bounds the depth of the compiled expression tree.
pub const MAX_COMPARISONS: usize = 512;

/// A malformed filter string.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    /// Byte offset into the filter string.
    pub position: usize,
    pub hint: Option<&'static str>,
}

impl ParseError {
    pub(crate) fn new(message: impl Into<String>, position: usize) -> Self {
        Self {
            message: message.into(),
            position,
            hint: None,
        }
    }

    pub(crate) fn with_hint(mut self, hint: &'static str) -> Self {
        self.hint = Some(hint);
        self
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at position {}", self.message, self.position)?;
        if let Some(hint) = self.hint {
            write!(f, " (hint: {hint})")?;
        }
        Ok(())
    }
}

impl std::error::Error for ParseError {}

#[derive(Debug, Clone, PartialEq)]
pub struct WhereClause {
    pub expression: OrExpr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrExpr {
    pub first: AndExpr,
    pub rest: Vec<AndExpr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AndExpr {
    pub first: Term,
    pub rest: Vec<Term>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    Group(Box<OrExpr>),
    Comparison(Comparison),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub property: PropertyRef,
    pub operator: ComparisonOperator,
    pub value: Literal,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyRef {
    Escaped(String),
    Plain {
        name: String,
        suffix: Option<ValueType>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    List(Vec<Literal>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Keyword {
    And,
    Or,
    Like,
    ILike,
    In,
    True,
    False,
}

static PARSER: Lazy<FilterParser> = Lazy::new(FilterParser::build);

/// Immutable parser tables, built once per process and shared by every call.
#[derive(Debug)]
pub struct FilterParser {
    keywords: HashMap<&'static str, Keyword>,
}

impl FilterParser {
    pub fn global() -> &'static FilterParser {
        &PARSER
    }

    fn build() -> Self {
        let keywords = HashMap::from([
            ("AND", Keyword::And),
            ("OR", Keyword::Or),
            ("LIKE", Keyword::Like),
            ("ILIKE", Keyword::ILike),
            ("IN", Keyword::In),
            ("TRUE", Keyword::True),
            ("FALSE", Keyword::False),
        ]);
        Self { keywords }
    }

    fn keyword(&self, ident: &str) -> Option<Keyword> {
        self.keywords.get(ident.to_ascii_uppercase().as_str()).copied()
    }

    /// Parse a filter string. Blank input (or only comments) yields `None`.
    pub fn parse(&self, input: &str) -> Result<Option<WhereClause>, ParseError> {
        let tokens = Lexer::new(input).tokenize()?;
        if tokens.is_empty() {
            return Ok(None);
        }

        let mut stream = TokenStream {
            parser: self,
            tokens,
            index: 0,
            end: input.len(),
            depth: 0,
            comparisons: 0,
        };
        let expression = stream.or_expr()?;
        if let Some(extra) = stream.peek() {
            return Err(ParseError::new(
                format!("unexpected {}, expected AND, OR or end of filter", extra.token),
                extra.pos,
            ));
        }
        Ok(Some(WhereClause { expression }))
    }
}

struct TokenStream<'p> {
    parser: &'p FilterParser,
    tokens: Vec<Spanned>,
    index: usize,
    end: usize,
    depth: usize,
    comparisons: usize,
}

impl TokenStream<'_> {
    fn peek(&self) -> Option<&Spanned> {
        self.tokens.get(self.index)
    }

    fn next(&mut self) -> Option<Spanned> {
        let token = self.tokens.get(self.index).cloned();
        if token.is_some() {
            self.index += 1;
        }
        token
    }

    fn peek_keyword(&self) -> Option<Keyword> {
        match self.peek() {
            Some(Spanned {
                token: Token::Ident(ident),
                ..
            }) => self.parser.keyword(ident),
            _ => None,
        }
    }

    fn eat_keyword(&mut self, keyword: Keyword) -> bool {
        if self.peek_keyword() == Some(keyword) {
            self.index += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token, what: &str) -> Result<(), ParseError> {
        match self.next() {
            Some(spanned) if spanned.token == expected => Ok(()),
            Some(spanned) => Err(ParseError::new(
                format!("expected {what}, found {}", spanned.token),
                spanned.pos,
            )),
            None => Err(ParseError::new(format!("expected {what}, found end of filter"), self.end)),
        }
    }

    fn or_expr(&mut self) -> Result<OrExpr, ParseError> {
        let first = self.and_expr()?;
        let mut rest = Vec::new();
        while self.eat_keyword(Keyword::Or) {
            rest.push(self.and_expr()?);
        }
        Ok(OrExpr { first, rest })
    }

    fn and_expr(&mut self) -> Result<AndExpr, ParseError> {
        let first = self.term()?;
        let mut rest = Vec::new();
        while self.eat_keyword(Keyword::And) {
            rest.push(self.term()?);
        }
        Ok(AndExpr { first, rest })
    }

    fn term(&mut self) -> Result<Term, ParseError> {
        if let Some(Spanned { token: Token::LParen, pos }) = self.peek() {
            let pos = *pos;
            if self.depth >= MAX_NESTING_DEPTH {
                return Err(ParseError::new(
                    format!("filter nested too deeply (limit {MAX_NESTING_DEPTH})"),
                    pos,
                )
                .with_hint(HINT_TOO_COMPLEX));
            }
            self.next();
            self.depth += 1;
            let inner = self.or_expr()?;
            self.expect(Token::RParen, "')'")?;
            self.depth -= 1;
            return Ok(Term::Group(Box::new(inner)));
        }

        self.comparisons += 1;
        if self.comparisons > MAX_COMPARISONS {
            let pos = self.peek().map_or(self.end, |spanned| spanned.pos);
            return Err(ParseError::new(
                format!("filter has too many comparisons (limit {MAX_COMPARISONS})"),
                pos,
            )
            .with_hint(HINT_TOO_COMPLEX));
        }
        self.comparison().map(Term::Comparison)
    }

    fn comparison(&mut self) -> Result<Comparison, ParseError> {
        let property = self.property_ref()?;
        let operator = self.operator()?;
        let value = if operator == ComparisonOperator::In {
            self.value_list()?
        } else {
            self.scalar_value()?
        };
        Ok(Comparison {
            property,
            operator,
            value,
        })
    }

    fn property_ref(&mut self) -> Result<PropertyRef, ParseError> {
        let Some(spanned) = self.next() else {
            return Err(ParseError::new("expected property name, found end of filter", self.end));
        };
        match spanned.token {
            Token::EscapedIdent(name) => Ok(PropertyRef::Escaped(name)),
            Token::Ident(name) => {
                if self.parser.keyword(&name).is_some() {
                    return Err(ParseError::new(
                        format!(
                            "expected property name, found keyword {}",
                            name.to_ascii_uppercase()
                        ),
                        spanned.pos,
                    ));
                }
                let suffix = if matches!(self.peek(), Some(Spanned { token: Token::Dot, .. })) {
                    self.next();
                    Some(self.type_suffix(&name)?)
                } else {
                    None
                };
                Ok(PropertyRef::Plain { name, suffix })
            }
            other => Err(ParseError::new(
                format!("expected property name, found {other}"),
                spanned.pos,
            )),
        }
    }

    fn type_suffix(&mut self, name: &str) -> Result<ValueType, ParseError> {
        match self.next() {
            Some(Spanned {
                token: Token::Ident(suffix),
                pos,
            }) => ValueType::from_suffix(&suffix).ok_or_else(|| {
                ParseError::new(
                    format!("unknown value type suffix '{suffix}' on property '{name}'"),
                    pos,
                )
                .with_hint(HINT_DOTTED_NAME)
            }),
            Some(spanned) => Err(ParseError::new(
                format!("expected value type suffix, found {}", spanned.token),
                spanned.pos,
            )),
            None => Err(ParseError::new(
                "expected value type suffix, found end of filter",
                self.end,
            )),
        }
    }

    fn operator(&mut self) -> Result<ComparisonOperator, ParseError> {
        let Some(spanned) = self.next() else {
            return Err(ParseError::new(
                "expected comparison operator, found end of filter",
                self.end,
            ));
        };
        match &spanned.token {
            Token::Op(op) => Ok(*op),
            Token::Ident(ident) => match self.parser.keyword(ident) {
                Some(Keyword::Like) => Ok(ComparisonOperator::Like),
                Some(Keyword::ILike) => Ok(ComparisonOperator::ILike),
                Some(Keyword::In) => Ok(ComparisonOperator::In),
                _ => Err(ParseError::new(
                    format!("expected comparison operator, found {}", spanned.token),
                    spanned.pos,
                )),
            },
            Token::Dot => Err(ParseError::new("unexpected '.' after property name", spanned.pos)
                .with_hint(HINT_DOTTED_NAME)),
            other => Err(ParseError::new(
                format!("expected comparison operator, found {other}"),
                spanned.pos,
            )),
        }
    }

    fn scalar_value(&mut self) -> Result<Literal, ParseError> {
        let Some(spanned) = self.next() else {
            return Err(ParseError::new("expected value, found end of filter", self.end));
        };
        match spanned.token {
            Token::Str(s) => Ok(Literal::Str(s)),
            Token::Int(i) => Ok(Literal::Int(i)),
            Token::Float(x) => Ok(Literal::Float(x)),
            Token::Ident(ident) => match self.parser.keyword(&ident) {
                Some(Keyword::True) => Ok(Literal::Bool(true)),
                Some(Keyword::False) => Ok(Literal::Bool(false)),
                _ => Err(ParseError::new(
                    format!("unexpected identifier '{ident}' as value"),
                    spanned.pos,
                )
                .with_hint(HINT_UNQUOTED_VALUE)),
            },
            Token::LParen => Err(ParseError::new("unexpected '(' as value", spanned.pos)
                .with_hint(HINT_LIST_WITHOUT_IN)),
            other => Err(ParseError::new(format!("expected value, found {other}"), spanned.pos)),
        }
    }

    fn value_list(&mut self) -> Result<Literal, ParseError> {
        self.expect(Token::LParen, "'(' after IN")?;
        let mut items = Vec::new();
        if matches!(self.peek(), Some(Spanned { token: Token::RParen, .. })) {
            self.next();
            return Ok(Literal::List(items));
        }
        loop {
            items.push(self.scalar_value()?);
            match self.next() {
                Some(Spanned { token: Token::Comma, .. }) => continue,
                Some(Spanned { token: Token::RParen, .. }) => break,
                Some(spanned) => {
                    return Err(ParseError::new(
                        format!("expected ',' or ')' in value list, found {}", spanned.token),
                        spanned.pos,
                    ));
                }
                None => {
                    return Err(ParseError::new("unterminated value list", self.end));
                }
            }
        }
        Ok(Literal::List(items))
    }
}
