//! SQL dialect differences the compiler and repositories care about.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    MySql,
    Postgres,
    Sqlite,
    /// Anything else; renders portable SQL only.
    Generic,
}

impl Dialect {
    /// Resolve from a driver's reported backend name (`"PostgreSQL"`,
    /// `"MySQL"`, `"SQLite"`) or a URL scheme.
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "mysql" | "mariadb" => Self::MySql,
            "postgres" | "postgresql" | "pgx" => Self::Postgres,
            "sqlite" | "sqlite3" => Self::Sqlite,
            _ => Self::Generic,
        }
    }

    /// Resolve from a connection URL's scheme.
    pub fn from_url(url: &str) -> Self {
        url.split_once(':')
            .map_or(Self::Generic, |(scheme, _)| Self::from_name(scheme))
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::MySql => "mysql",
            Self::Postgres => "postgres",
            Self::Sqlite => "sqlite",
            Self::Generic => "generic",
        }
    }

    pub fn quote(self, ident: &str) -> String {
        match self {
            Self::MySql => format!("`{ident}`"),
            Self::Postgres => format!("\"{ident}\""),
            Self::Sqlite | Self::Generic => ident.to_string(),
        }
    }

    /// Case-insensitive pattern match of `column` against one placeholder.
    pub fn ilike(self, column: &str) -> String {
        match self {
            Self::Postgres => format!("{column} ILIKE ?"),
            Self::MySql => format!("{column} LIKE ? COLLATE utf8mb4_unicode_ci"),
            Self::Sqlite => format!("{column} LIKE ?"),
            Self::Generic => format!("UPPER({column}) LIKE UPPER(?)"),
        }
    }

    /// Rewrite `?` placeholders into the dialect's native form. Placeholders
    /// inside quoted text are left alone.
    pub fn rebind(self, sql: &str) -> String {
        if self != Self::Postgres {
            return sql.to_string();
        }

        let mut out = String::with_capacity(sql.len() + 8);
        let mut index = 0;
        let mut quote: Option<char> = None;
        for c in sql.chars() {
            match quote {
                Some(q) if c == q => quote = None,
                Some(_) => {}
                None if c == '\'' || c == '"' => quote = Some(c),
                None if c == '?' => {
                    index += 1;
                    out.push('$');
                    out.push_str(&index.to_string());
                    continue;
                }
                None => {}
            }
            out.push(c);
        }
        out
    }

    /// Whether an `INSERT` can hand back the new row's id through
    /// `RETURNING`. MySQL reports it as the last insert id instead.
    pub const fn returns_inserted_id(self) -> bool {
        matches!(self, Self::Postgres | Self::Sqlite)
    }

    /// Insert that silently skips rows violating a unique key.
    pub fn insert_ignore(self, table: &str, columns: &[&str]) -> String {
        let placeholders = vec!["?"; columns.len()].join(", ");
        let table = self.quote(table);
        let columns = columns.join(", ");
        match self {
            Self::MySql => {
                format!("INSERT IGNORE INTO {table} ({columns}) VALUES ({placeholders})")
            }
            _ => format!(
                "INSERT INTO {table} ({columns}) VALUES ({placeholders}) ON CONFLICT DO NOTHING"
            ),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_resolve_case_insensitively() {
        assert_eq!(Dialect::from_name("PostgreSQL"), Dialect::Postgres);
        assert_eq!(Dialect::from_name("MySQL"), Dialect::MySql);
        assert_eq!(Dialect::from_name("SQLite"), Dialect::Sqlite);
        assert_eq!(Dialect::from_name("oracle"), Dialect::Generic);
        assert_eq!(Dialect::from_url("sqlite://registry.db?mode=rwc"), Dialect::Sqlite);
        assert_eq!(Dialect::from_url("postgres://localhost/db"), Dialect::Postgres);
    }

    #[test]
    fn quoting_per_dialect() {
        assert_eq!(Dialect::MySql.quote("Context"), "`Context`");
        assert_eq!(Dialect::Postgres.quote("Context"), "\"Context\"");
        assert_eq!(Dialect::Sqlite.quote("Context"), "Context");
    }

    #[test]
    fn ilike_per_dialect() {
        assert_eq!(Dialect::Postgres.ilike("c.name"), "c.name ILIKE ?");
        assert_eq!(
            Dialect::MySql.ilike("c.name"),
            "c.name LIKE ? COLLATE utf8mb4_unicode_ci"
        );
        assert_eq!(Dialect::Sqlite.ilike("c.name"), "c.name LIKE ?");
        assert_eq!(Dialect::Generic.ilike("c.name"), "UPPER(c.name) LIKE UPPER(?)");
    }

    #[test]
    fn rebind_numbers_postgres_placeholders() {
        assert_eq!(
            Dialect::Postgres
                .rebind("SELECT 1 FROM \"T?\" WHERE a = ? AND b = '?' AND c IN (?, ?)"),
            "SELECT 1 FROM \"T?\" WHERE a = $1 AND b = '?' AND c IN ($2, $3)"
        );
        assert_eq!(Dialect::MySql.rebind("a = ?"), "a = ?");
    }

    #[test]
    fn inserted_ids_come_back_through_returning_except_on_mysql() {
        assert!(Dialect::Postgres.returns_inserted_id());
        assert!(Dialect::Sqlite.returns_inserted_id());
        assert!(!Dialect::MySql.returns_inserted_id());
        assert!(!Dialect::Generic.returns_inserted_id());
    }

    #[test]
    fn conflict_ignoring_inserts() {
        assert_eq!(
            Dialect::MySql.insert_ignore("Attribution", &["context_id", "artifact_id"]),
            "INSERT IGNORE INTO `Attribution` (context_id, artifact_id) VALUES (?, ?)"
        );
        assert_eq!(
            Dialect::Sqlite.insert_ignore("ParentContext", &["context_id", "parent_context_id"]),
            "INSERT INTO ParentContext (context_id, parent_context_id) VALUES (?, ?) \
             ON CONFLICT DO NOTHING"
        );
    }
}
