//! Filter query language: parsing, property resolution and SQL compilation.
//!
//! ```text
//! parse("framework = \"pytorch\" AND epochs > 25")
//!     -> FilterExpression -> QueryCompiler -> CompiledFilter { joins, conditions, args }
//! ```

pub mod ast;
pub mod catalog;
pub mod compiler;
pub mod grammar;
pub mod lexer;
pub mod property;

pub use ast::{
    ComparisonExpr, ComparisonOperator, FilterExpression, FilterValue, LogicalOperator, ValueType,
};
pub use catalog::{PropertyCatalog, PropertyDefinition, PropertyLocation, build_catalog};
pub use compiler::{CompiledFilter, QueryCompiler};
pub use grammar::{FilterParser, ParseError};
pub use property::{PropertyReference, resolve_property};

use crate::models::{RestEntityType, SchemaFamily};
use crate::sql::Dialect;

/// Parse a filter string. Empty or whitespace-only input yields `Ok(None)`.
pub fn parse(input: &str) -> Result<Option<FilterExpression>, ParseError> {
    Ok(FilterParser::global()
        .parse(input)?
        .map(FilterExpression::from))
}

/// Parse and compile in one step; `Ok(None)` when there is no filter.
pub fn build_query(
    input: &str,
    family: SchemaFamily,
    rest_type: Option<RestEntityType>,
    dialect: Dialect,
) -> Result<Option<CompiledFilter>, ParseError> {
    Ok(parse(input)?
        .map(|expr| QueryCompiler::new(family, rest_type, dialect).build_query(&expr)))
}
