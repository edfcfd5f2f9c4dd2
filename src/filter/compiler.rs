//! Compile a [`FilterExpression`] into SQL joins, conditions and arguments.
//!
//! Property-table comparisons reached through AND chains become a
//! `JOIN <PropertyTable> prop_N`; beneath an OR they become a correlated
//! `EXISTS` subquery so that each branch stays self-contained.

use super::ast::{
    ComparisonExpr, ComparisonOperator, FilterExpression, FilterValue, LogicalOperator,
};
use super::catalog::{PropertyCatalog, PropertyLocation};
use super::property::{PropertyReference, resolve_property};
use crate::models::{RestEntityType, SchemaFamily, state_code};
use crate::sql::{Dialect, SqlValue};

/// SQL fragments produced for one filter, ready to merge into a SELECT.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledFilter {
    pub joins: Vec<String>,
    /// Conditions to be ANDed together.
    pub conditions: Vec<String>,
    /// Positional arguments for every `?` in `joins` then `conditions`.
    pub args: Vec<SqlValue>,
}

impl CompiledFilter {
    pub fn is_empty(&self) -> bool {
        self.joins.is_empty() && self.conditions.is_empty()
    }
}

pub struct QueryCompiler<'c> {
    catalog: &'c PropertyCatalog,
    family: SchemaFamily,
    rest_type: Option<RestEntityType>,
    dialect: Dialect,
    join_counter: usize,
    compiled: CompiledFilter,
}

impl QueryCompiler<'static> {
    pub fn new(family: SchemaFamily, rest_type: Option<RestEntityType>, dialect: Dialect) -> Self {
        Self::with_catalog(PropertyCatalog::global(), family, rest_type, dialect)
    }
}

impl<'c> QueryCompiler<'c> {
    pub fn with_catalog(
        catalog: &'c PropertyCatalog,
        family: SchemaFamily,
        rest_type: Option<RestEntityType>,
        dialect: Dialect,
    ) -> Self {
        Self {
            catalog,
            family,
            rest_type,
            dialect,
            join_counter: 0,
            compiled: CompiledFilter::default(),
        }
    }

    pub fn build_query(mut self, expr: &FilterExpression) -> CompiledFilter {
        self.fold(expr);
        tracing::debug!(
            family = ?self.family,
            rest_type = ?self.rest_type,
            joins = self.compiled.joins.len(),
            conditions = self.compiled.conditions.len(),
            "Compiled filter"
        );
        self.compiled
    }

    fn table(&self) -> String {
        self.dialect.quote(self.family.table())
    }

    fn property_table(&self) -> String {
        self.dialect.quote(self.family.property_table())
    }

    /// Compile onto the running query. AND children share its joins.
    fn fold(&mut self, expr: &FilterExpression) {
        match expr {
            FilterExpression::Logical {
                operator: LogicalOperator::And,
                left,
                right,
            } => {
                self.fold(left);
                self.fold(right);
            }
            FilterExpression::Logical { .. } => {
                let (condition, args) = self.render(expr);
                self.push(condition, args);
            }
            FilterExpression::Comparison(leaf) => {
                let prop = self.resolve(leaf);
                let (condition, args) = match prop.location {
                    PropertyLocation::EntityColumn => self.column_condition(&prop, leaf),
                    PropertyLocation::PropertyTable | PropertyLocation::Custom => {
                        self.join_condition(&prop, leaf)
                    }
                };
                self.push(condition, args);
            }
        }
    }

    fn push(&mut self, condition: String, args: Vec<SqlValue>) {
        self.compiled.conditions.push(condition);
        self.compiled.args.extend(args);
    }

    /// Render a self-contained condition that adds no joins.
    fn render(&mut self, expr: &FilterExpression) -> (String, Vec<SqlValue>) {
        match expr {
            FilterExpression::Logical {
                operator,
                left,
                right,
            } => {
                let (left_sql, mut args) = self.render(left);
                let (right_sql, right_args) = self.render(right);
                args.extend(right_args);
                (format!("({left_sql} {operator} {right_sql})"), args)
            }
            FilterExpression::Comparison(leaf) => {
                let prop = self.resolve(leaf);
                match prop.location {
                    PropertyLocation::EntityColumn => self.column_condition(&prop, leaf),
                    PropertyLocation::PropertyTable | PropertyLocation::Custom => {
                        self.exists_condition(&prop, leaf)
                    }
                }
            }
        }
    }

    fn resolve(&self, leaf: &ComparisonExpr) -> PropertyReference {
        resolve_property(self.catalog, self.family, self.rest_type, leaf)
    }

    fn column_condition(
        &self,
        prop: &PropertyReference,
        leaf: &ComparisonExpr,
    ) -> (String, Vec<SqlValue>) {
        let column = format!("{}.{}", self.table(), prop.column);
        let mut operator = leaf.operator;
        let mut value = leaf.value.clone();

        if prop.column == "name"
            && self.rest_type.is_some_and(RestEntityType::stores_prefixed_names)
        {
            (operator, value) = prefixed_name_match(operator, value);
        }

        if self.family.state_column() == Some(prop.column.as_str()) {
            value = translate_states(&prop.column, value);
        }

        self.predicate(&column, operator, &value, prop)
    }

    fn join_condition(
        &mut self,
        prop: &PropertyReference,
        leaf: &ComparisonExpr,
    ) -> (String, Vec<SqlValue>) {
        self.join_counter += 1;
        let alias = format!("prop_{}", self.join_counter);
        self.compiled.joins.push(format!(
            "JOIN {} {alias} ON {alias}.{} = {}.id",
            self.property_table(),
            self.family.owner_column(),
            self.table(),
        ));

        let value_column = format!("{alias}.{}", prop.value_type.column());
        let (predicate, values) = self.predicate(&value_column, leaf.operator, &leaf.value, prop);
        (
            format!("{alias}.name = ? AND {alias}.is_custom_property = ? AND {predicate}"),
            property_row_args(prop, values),
        )
    }

    fn exists_condition(
        &self,
        prop: &PropertyReference,
        leaf: &ComparisonExpr,
    ) -> (String, Vec<SqlValue>) {
        let property_table = self.property_table();
        let value_column = format!("{property_table}.{}", prop.value_type.column());
        let (predicate, values) = self.predicate(&value_column, leaf.operator, &leaf.value, prop);
        (
            format!(
                "EXISTS (SELECT 1 FROM {property_table} WHERE {property_table}.{} = {}.id \
                 AND {property_table}.name = ? AND {property_table}.is_custom_property = ? \
                 AND {predicate})",
                self.family.owner_column(),
                self.table(),
            ),
            property_row_args(prop, values),
        )
    }

    fn predicate(
        &self,
        column: &str,
        operator: ComparisonOperator,
        value: &FilterValue,
        prop: &PropertyReference,
    ) -> (String, Vec<SqlValue>) {
        let coerce = |v: &FilterValue| SqlValue::coerce(v, prop.value_type);

        match (operator, value) {
            (ComparisonOperator::In | ComparisonOperator::Eq, FilterValue::List(items)) => {
                membership(column, "IN", items, coerce)
            }
            (ComparisonOperator::In, single) => (format!("{column} IN (?)"), vec![coerce(single)]),
            (ComparisonOperator::Ne, FilterValue::List(items)) => {
                membership(column, "NOT IN", items, coerce)
            }
            (_, FilterValue::List(_)) => {
                tracing::warn!(
                    property = %prop.name,
                    %operator,
                    "List value with non-membership operator"
                );
                ("1 = 0".to_string(), Vec::new())
            }
            (ComparisonOperator::ILike, v) => (self.dialect.ilike(column), vec![coerce(v)]),
            (op, v) => (format!("{column} {op} ?"), vec![coerce(v)]),
        }
    }
}

/// Leading binds of a property-row match: the row name, then whether the
/// row is custom, so a name stored both ways matches one row per entity.
fn property_row_args(prop: &PropertyReference, values: Vec<SqlValue>) -> Vec<SqlValue> {
    let mut args = vec![SqlValue::String(prop.name.clone()), SqlValue::Bool(prop.is_custom)];
    args.extend(values);
    args
}

fn membership(
    column: &str,
    keyword: &str,
    items: &[FilterValue],
    coerce: impl Fn(&FilterValue) -> SqlValue,
) -> (String, Vec<SqlValue>) {
    if items.is_empty() {
        let always = if keyword == "IN" { "1 = 0" } else { "1 = 1" };
        return (always.to_string(), Vec::new());
    }
    let placeholders = vec!["?"; items.len()].join(", ");
    (
        format!("{column} {keyword} ({placeholders})"),
        items.iter().map(coerce).collect(),
    )
}

/// Child kinds store `"<parentId>:<name>"`; match on the unprefixed part.
fn prefixed_name_match(
    operator: ComparisonOperator,
    value: FilterValue,
) -> (ComparisonOperator, FilterValue) {
    match (operator, value) {
        (ComparisonOperator::Eq, FilterValue::String(name)) => {
            (ComparisonOperator::Like, FilterValue::String(format!("%:{name}")))
        }
        (op @ (ComparisonOperator::Like | ComparisonOperator::ILike), FilterValue::String(pattern))
            if !pattern.starts_with('%') =>
        {
            (op, FilterValue::String(format!("%:{pattern}")))
        }
        (op, value) => (op, value),
    }
}

fn translate_states(column: &str, value: FilterValue) -> FilterValue {
    match value {
        FilterValue::String(label) => FilterValue::Int(state_code(column, &label)),
        FilterValue::List(items) => FilterValue::List(
            items
                .into_iter()
                .map(|item| translate_states(column, item))
                .collect(),
        ),
        other => other,
    }
}
