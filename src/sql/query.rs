//! SELECT builder for entity tables.
//!
//! Collects joins, WHERE fragments and their bind values, then renders a
//! single parameterized statement for the target dialect.

use sqlx::AnyConnection;
use sqlx::any::AnyRow;

use super::{Dialect, SqlValue};
use crate::filter::CompiledFilter;
use crate::pagination::SortOrder;

#[derive(Debug, Clone)]
pub struct SelectQuery {
    dialect: Dialect,
    table: String,
    columns: Vec<String>,
    joins: Vec<String>,
    where_clauses: Vec<String>,
    values: Vec<SqlValue>,
    order_by: Vec<String>,
    limit: Option<i64>,
}

impl SelectQuery {
    /// Select `columns` of `table`; each column is qualified with the quoted table name.
    pub fn new(dialect: Dialect, table: &str, columns: &[&str]) -> Self {
        let quoted = dialect.quote(table);
        Self {
            dialect,
            columns: columns.iter().map(|c| format!("{quoted}.{c}")).collect(),
            table: quoted,
            joins: Vec::new(),
            where_clauses: Vec::new(),
            values: Vec::new(),
            order_by: Vec::new(),
            limit: None,
        }
    }

    /// Quoted name of the base table, for callers composing conditions.
    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn join(mut self, join: impl Into<String>) -> Self {
        self.joins.push(join.into());
        self
    }

    /// Add a WHERE condition with `?` placeholders and their values, in order.
    pub fn where_clause(
        mut self,
        condition: impl Into<String>,
        values: impl IntoIterator<Item = SqlValue>,
    ) -> Self {
        self.where_clauses.push(condition.into());
        self.values.extend(values);
        self
    }

    /// Merge a compiled filter's joins, conditions and arguments.
    pub fn filter(mut self, compiled: CompiledFilter) -> Self {
        self.joins.extend(compiled.joins);
        self.where_clauses.extend(compiled.conditions);
        self.values.extend(compiled.args);
        self
    }

    /// Append an ORDER BY term on a base-table column.
    pub fn order_by(mut self, column: &str, order: SortOrder) -> Self {
        self.order_by
            .push(format!("{}.{column} {}", self.table, order.to_sql()));
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    /// Build the SQL query string, placeholders already in dialect form.
    pub fn build_sql(&self) -> String {
        let mut sql = format!("SELECT {} FROM {}", self.columns.join(", "), self.table);

        for join in &self.joins {
            sql.push(' ');
            sql.push_str(join);
        }

        if !self.where_clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.where_clauses.join(" AND "));
        }

        if !self.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(&self.order_by.join(", "));
        }

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        self.dialect.rebind(&sql)
    }

    /// Execute the query and return all matching rows.
    pub async fn fetch_all(&self, conn: &mut AnyConnection) -> Result<Vec<AnyRow>, sqlx::Error> {
        let sql = self.build_sql();
        tracing::debug!(sql = %sql, args = self.values.len(), "Executing entity query");

        let mut query = sqlx::query(&sql);
        for value in &self.values {
            query = value.bind_to_query(query);
        }
        query.fetch_all(conn).await
    }

    /// Execute the query and return at most one row.
    pub async fn fetch_optional(
        &self,
        conn: &mut AnyConnection,
    ) -> Result<Option<AnyRow>, sqlx::Error> {
        let sql = self.build_sql();
        tracing::debug!(sql = %sql, args = self.values.len(), "Executing entity query (one)");

        let mut query = sqlx::query(&sql);
        for value in &self.values {
            query = value.bind_to_query(query);
        }
        query.fetch_optional(conn).await
    }
}

/// Execute an INSERT/UPDATE/DELETE with `?` placeholders and bound values.
pub async fn execute_with_binds(
    conn: &mut AnyConnection,
    dialect: Dialect,
    sql: &str,
    values: &[SqlValue],
) -> Result<sqlx::any::AnyQueryResult, sqlx::Error> {
    let sql = dialect.rebind(sql);
    tracing::debug!(sql = %sql, args = values.len(), "Executing statement");

    let mut query = sqlx::query(&sql);
    for value in values {
        query = value.bind_to_query(query);
    }
    query.execute(conn).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn renders_joins_conditions_order_and_limit() {
        let query = SelectQuery::new(Dialect::Sqlite, "Context", &["id", "name"])
            .join("JOIN ContextProperty prop_1 ON prop_1.context_id = Context.id")
            .where_clause("Context.type_id = ?", [SqlValue::Int(3)])
            .where_clause("prop_1.name = ?", [SqlValue::String("owner".into())])
            .order_by("id", SortOrder::Desc)
            .limit(11);

        assert_eq!(
            query.build_sql(),
            "SELECT Context.id, Context.name FROM Context \
             JOIN ContextProperty prop_1 ON prop_1.context_id = Context.id \
             WHERE Context.type_id = ? AND prop_1.name = ? ORDER BY Context.id DESC LIMIT 11"
        );
        assert_eq!(query.values().len(), 2);
    }

    #[test]
    fn postgres_output_is_quoted_and_numbered() {
        let query = SelectQuery::new(Dialect::Postgres, "Artifact", &["id"])
            .where_clause("\"Artifact\".type_id = ?", [SqlValue::Int(1)])
            .where_clause("\"Artifact\".uri = ?", [SqlValue::String("s3://x".into())]);

        assert_eq!(
            query.build_sql(),
            "SELECT \"Artifact\".id FROM \"Artifact\" \
             WHERE \"Artifact\".type_id = $1 AND \"Artifact\".uri = $2"
        );
    }
}
