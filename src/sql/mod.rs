//! Parameterized SQL plumbing shared by the filter compiler and repositories.

pub mod dialect;
pub mod query;

use sqlx::Any;
use sqlx::any::AnyArguments;

pub use dialect::Dialect;
pub use query::SelectQuery;

use crate::filter::{FilterValue, ValueType};

pub type AnyQuery<'q> = sqlx::query::Query<'q, Any, AnyArguments<'q>>;

/// Column type carried by a NULL so drivers that type their parameters
/// (Postgres) accept it in non-text columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Text,
    Int,
    Float,
    Bool,
    Bytes,
}

/// A SQL value that can be bound to a query.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Bytes(Vec<u8>),
    Null(SqlType),
}

impl SqlValue {
    /// Bind this value to a sqlx query builder.
    pub fn bind_to_query<'q>(&'q self, query: AnyQuery<'q>) -> AnyQuery<'q> {
        match self {
            SqlValue::String(s) => query.bind(s.as_str()),
            SqlValue::Int(i) => query.bind(*i),
            SqlValue::Float(f) => query.bind(*f),
            SqlValue::Bool(b) => query.bind(*b),
            SqlValue::Bytes(b) => query.bind(b.clone()),
            SqlValue::Null(SqlType::Text) => query.bind(None::<String>),
            SqlValue::Null(SqlType::Int) => query.bind(None::<i64>),
            SqlValue::Null(SqlType::Float) => query.bind(None::<f64>),
            SqlValue::Null(SqlType::Bool) => query.bind(None::<bool>),
            SqlValue::Null(SqlType::Bytes) => query.bind(None::<Vec<u8>>),
        }
    }

    pub fn opt_string(value: Option<&str>) -> Self {
        value.map_or(Self::Null(SqlType::Text), |s| Self::String(s.to_string()))
    }

    pub fn opt_int(value: Option<i64>) -> Self {
        value.map_or(Self::Null(SqlType::Int), Self::Int)
    }

    /// Convert a filter literal into a value comparable with `value_type`'s
    /// column. Literals that cannot be converted are bound as-is and left to
    /// the database's comparison rules.
    pub fn coerce(value: &FilterValue, value_type: ValueType) -> Self {
        match (value_type, value) {
            (ValueType::String, FilterValue::String(s)) => Self::String(s.clone()),
            (ValueType::String, other) => Self::String(other.to_string()),

            (ValueType::Int, FilterValue::Int(i)) => Self::Int(*i),
            (ValueType::Int, FilterValue::Float(x)) if x.fract() == 0.0 => Self::Int(*x as i64),
            (ValueType::Int, FilterValue::Bool(b)) => Self::Int(i64::from(*b)),
            (ValueType::Int, FilterValue::String(s)) => s
                .trim()
                .parse::<i64>()
                .map_or_else(|_| Self::String(s.clone()), Self::Int),

            (ValueType::Double, FilterValue::Int(i)) => Self::Float(*i as f64),
            (ValueType::Double, FilterValue::Float(x)) => Self::Float(*x),
            (ValueType::Double, FilterValue::String(s)) => s
                .trim()
                .parse::<f64>()
                .map_or_else(|_| Self::String(s.clone()), Self::Float),

            (ValueType::Bool, FilterValue::Bool(b)) => Self::Bool(*b),
            (ValueType::Bool, FilterValue::Int(i)) => Self::Bool(*i != 0),
            (ValueType::Bool, FilterValue::String(s)) if s.eq_ignore_ascii_case("true") => {
                Self::Bool(true)
            }
            (ValueType::Bool, FilterValue::String(s)) if s.eq_ignore_ascii_case("false") => {
                Self::Bool(false)
            }

            (_, FilterValue::Float(x)) => Self::Float(*x),
            (_, FilterValue::Bool(b)) => Self::Bool(*b),
            (_, FilterValue::String(s)) => Self::String(s.clone()),
            // Lists are expanded element-wise by the compiler before reaching here.
            (_, list @ FilterValue::List(_)) => Self::String(list.to_string()),
        }
    }
}
