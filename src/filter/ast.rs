//! Reduced filter tree consumed by the query compiler.
//!
//! The grammar's repetition lists (`a OR b OR c`) are folded into a left-deep
//! binary tree so the compiler only ever sees two-child logical nodes.

use std::fmt;

use super::grammar::{AndExpr, Comparison, Literal, OrExpr, PropertyRef, Term, WhereClause};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComparisonOperator {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Like,
    ILike,
    In,
}

impl ComparisonOperator {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Like => "LIKE",
            Self::ILike => "ILIKE",
            Self::In => "IN",
        }
    }
}

impl fmt::Display for ComparisonOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalOperator {
    And,
    Or,
}

impl fmt::Display for LogicalOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::And => "AND",
            Self::Or => "OR",
        })
    }
}

/// EAV value column a comparison is evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    String,
    Double,
    Int,
    Bool,
}

impl ValueType {
    /// Property-table column holding values of this type; also the suffix
    /// accepted in `name.<suffix>` overrides.
    pub const fn column(self) -> &'static str {
        match self {
            Self::String => "string_value",
            Self::Double => "double_value",
            Self::Int => "int_value",
            Self::Bool => "bool_value",
        }
    }

    pub fn from_suffix(suffix: &str) -> Option<Self> {
        [Self::String, Self::Double, Self::Int, Self::Bool]
            .into_iter()
            .find(|t| suffix.eq_ignore_ascii_case(t.column()))
    }

    /// Type implied by a literal when the property is not in the catalog.
    pub fn infer(value: &FilterValue) -> Self {
        match value {
            FilterValue::String(_) => Self::String,
            FilterValue::Int(_) => Self::Int,
            FilterValue::Float(_) => Self::Double,
            FilterValue::Bool(_) => Self::Bool,
            FilterValue::List(items) => items.first().map_or(Self::String, Self::infer),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    List(Vec<FilterValue>),
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::List(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str(")")
            }
        }
    }
}

/// Leaf comparison.
///
/// `property` has backticks and escapes resolved. An explicit type override is
/// re-appended as `name.<value_column>`; `escaped` marks names that came from a
/// backtick identifier, whose dots are never a type suffix.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonExpr {
    pub property: String,
    pub escaped: bool,
    pub operator: ComparisonOperator,
    pub value: FilterValue,
}

impl fmt::Display for ComparisonExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.property, self.operator, self.value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpression {
    Logical {
        operator: LogicalOperator,
        left: Box<FilterExpression>,
        right: Box<FilterExpression>,
    },
    Comparison(ComparisonExpr),
}

impl FilterExpression {
    pub fn and(left: FilterExpression, right: FilterExpression) -> Self {
        Self::Logical {
            operator: LogicalOperator::And,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn or(left: FilterExpression, right: FilterExpression) -> Self {
        Self::Logical {
            operator: LogicalOperator::Or,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Visit every leaf comparison, left to right.
    pub fn comparisons(&self) -> Vec<&ComparisonExpr> {
        let mut out = Vec::new();
        self.collect_comparisons(&mut out);
        out
    }

    fn collect_comparisons<'a>(&'a self, out: &mut Vec<&'a ComparisonExpr>) {
        match self {
            Self::Logical { left, right, .. } => {
                left.collect_comparisons(out);
                right.collect_comparisons(out);
            }
            Self::Comparison(leaf) => out.push(leaf),
        }
    }
}

impl fmt::Display for FilterExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Logical {
                operator,
                left,
                right,
            } => write!(f, "({left} {operator} {right})"),
            Self::Comparison(leaf) => write!(f, "{leaf}"),
        }
    }
}

impl From<WhereClause> for FilterExpression {
    fn from(clause: WhereClause) -> Self {
        reduce_or(clause.expression)
    }
}

fn reduce_or(expr: OrExpr) -> FilterExpression {
    expr.rest
        .into_iter()
        .fold(reduce_and(expr.first), |acc, next| {
            FilterExpression::or(acc, reduce_and(next))
        })
}

fn reduce_and(expr: AndExpr) -> FilterExpression {
    expr.rest
        .into_iter()
        .fold(reduce_term(expr.first), |acc, next| {
            FilterExpression::and(acc, reduce_term(next))
        })
}

fn reduce_term(term: Term) -> FilterExpression {
    match term {
        Term::Group(inner) => reduce_or(*inner),
        Term::Comparison(comparison) => FilterExpression::Comparison(reduce_comparison(comparison)),
    }
}

fn reduce_comparison(comparison: Comparison) -> ComparisonExpr {
    let (property, escaped) = match comparison.property {
        PropertyRef::Escaped(name) => (name, true),
        PropertyRef::Plain { name, suffix: None } => (name, false),
        PropertyRef::Plain {
            name,
            suffix: Some(value_type),
        } => (format!("{name}.{}", value_type.column()), false),
    };
    ComparisonExpr {
        property,
        escaped,
        operator: comparison.operator,
        value: reduce_literal(comparison.value),
    }
}

fn reduce_literal(literal: Literal) -> FilterValue {
    match literal {
        Literal::Str(s) => FilterValue::String(s),
        Literal::Int(i) => FilterValue::Int(i),
        Literal::Float(x) => FilterValue::Float(x),
        Literal::Bool(b) => FilterValue::Bool(b),
        Literal::List(items) => FilterValue::List(items.into_iter().map(reduce_literal).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::parse;

    fn reduced(input: &str) -> String {
        parse(input).unwrap().unwrap().to_string()
    }

    #[test]
    fn or_chains_fold_left() {
        assert_eq!(
            reduced(r#"status = "a" OR status = "b" OR status = "c""#),
            "((status = a OR status = b) OR status = c)"
        );
    }

    #[test]
    fn and_binds_tighter_than_or() {
        assert_eq!(
            reduced("a = 1 OR b = 2 AND c = 3"),
            "(a = 1 OR (b = 2 AND c = 3))"
        );
        assert_eq!(
            reduced("a = 1 AND b = 2 OR c = 3"),
            "((a = 1 AND b = 2) OR c = 3)"
        );
    }

    #[test]
    fn groups_become_subtrees() {
        assert_eq!(
            reduced(r#"a = "x" AND (b > 1 OR b < 0.5)"#),
            "(a = x AND (b > 1 OR b < 0.5))"
        );
        assert_eq!(reduced("((a = 1))"), "a = 1");
    }

    #[test]
    fn type_suffix_is_reappended() {
        let expr = parse("budget.DOUBLE_VALUE > 12000").unwrap().unwrap();
        let leaves = expr.comparisons();
        assert_eq!(leaves[0].property, "budget.double_value");
        assert!(!leaves[0].escaped);
    }

    #[test]
    fn escaped_names_keep_their_dots() {
        let expr = parse(r#"`mlflow.source.type` = "notebook""#).unwrap().unwrap();
        let leaves = expr.comparisons();
        assert_eq!(leaves[0].property, "mlflow.source.type");
        assert!(leaves[0].escaped);
        assert_eq!(leaves[0].value, FilterValue::String("notebook".into()));
    }

    #[test]
    fn inference_follows_literal_kind() {
        assert_eq!(ValueType::infer(&FilterValue::Float(1.5)), ValueType::Double);
        assert_eq!(ValueType::infer(&FilterValue::List(vec![])), ValueType::String);
        assert_eq!(
            ValueType::infer(&FilterValue::List(vec![FilterValue::Int(1)])),
            ValueType::Int
        );
        assert_eq!(ValueType::from_suffix("Int_Value"), Some(ValueType::Int));
        assert_eq!(ValueType::from_suffix("value"), None);
    }
}
