//! Bootstrap DDL for the metadata tables.
//!
//! Creates missing tables with `CREATE TABLE IF NOT EXISTS`; existing tables are
//! left untouched. Column types are rendered per dialect.

use anyhow::{Context as _, Result};
use sqlx::AnyPool;
use tracing::{debug, info};

use crate::models::SchemaFamily;
use crate::sql::Dialect;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnType {
    /// Auto-increment integer primary key.
    Id,
    Int,
    BigInt,
    Double,
    /// Short string that may take part in a key.
    Name,
    Text,
    Bool,
    Bytes,
}

impl ColumnType {
    fn to_sql(self, dialect: Dialect) -> &'static str {
        use ColumnType::*;
        match (dialect, self) {
            (Dialect::MySql, Id) => "INT NOT NULL AUTO_INCREMENT PRIMARY KEY",
            (Dialect::Postgres, Id) => "SERIAL PRIMARY KEY",
            (_, Id) => "INTEGER PRIMARY KEY AUTOINCREMENT",

            (Dialect::MySql, Int) => "INT",
            (_, Int) => "INTEGER",

            (Dialect::Sqlite, BigInt) => "INTEGER",
            (_, BigInt) => "BIGINT",

            (Dialect::Postgres, Double) => "DOUBLE PRECISION",
            (Dialect::MySql, Double) => "DOUBLE",
            (_, Double) => "REAL",

            (Dialect::MySql | Dialect::Postgres, Name) => "VARCHAR(255)",
            (_, Name) => "TEXT",

            (Dialect::MySql, Text) => "MEDIUMTEXT",
            (_, Text) => "TEXT",

            // The `Any` driver cannot decode SQLite's declared BOOLEAN affinity.
            (Dialect::Sqlite, Bool) => "INTEGER",
            (_, Bool) => "BOOLEAN",

            (Dialect::Postgres, Bytes) => "BYTEA",
            (Dialect::MySql, Bytes) => "LONGBLOB",
            (_, Bytes) => "BLOB",
        }
    }
}

/// Column definition for schema generation.
#[derive(Debug, Clone, Copy)]
struct ColumnDef {
    name: &'static str,
    column_type: ColumnType,
    nullable: bool,
}

const fn col(name: &'static str, column_type: ColumnType) -> ColumnDef {
    ColumnDef {
        name,
        column_type,
        nullable: false,
    }
}

const fn opt(name: &'static str, column_type: ColumnType) -> ColumnDef {
    ColumnDef {
        name,
        column_type,
        nullable: true,
    }
}

impl ColumnDef {
    fn to_sql(self, dialect: Dialect) -> String {
        let mut sql = format!("{} {}", self.name, self.column_type.to_sql(dialect));
        if !self.nullable && self.column_type != ColumnType::Id {
            sql.push_str(" NOT NULL");
        }
        sql
    }
}

#[derive(Debug, Clone)]
struct TableDef {
    name: &'static str,
    columns: Vec<ColumnDef>,
    /// Key column lists for table-level constraints.
    primary_key: Option<&'static [&'static str]>,
    unique: Vec<&'static [&'static str]>,
}

impl TableDef {
    fn create_table_sql(&self, dialect: Dialect) -> String {
        let mut defs: Vec<String> = self.columns.iter().map(|c| c.to_sql(dialect)).collect();
        if let Some(key) = self.primary_key {
            defs.push(format!("PRIMARY KEY ({})", key.join(", ")));
        }
        for key in &self.unique {
            defs.push(format!("UNIQUE ({})", key.join(", ")));
        }
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n  {}\n)",
            dialect.quote(self.name),
            defs.join(",\n  ")
        )
    }
}

fn entity_table(family: SchemaFamily) -> TableDef {
    use ColumnType::*;
    let mut columns = vec![col("id", Id), col("type_id", Int)];
    match family {
        SchemaFamily::Context => columns.push(col("name", Name)),
        SchemaFamily::Artifact => {
            columns.push(opt("uri", Text));
            columns.push(opt("state", Int));
            columns.push(opt("name", Name));
        }
        SchemaFamily::Execution => {
            columns.push(opt("last_known_state", Int));
            columns.push(opt("name", Name));
        }
    }
    columns.extend([
        opt("external_id", Name),
        opt("create_time_since_epoch", BigInt),
        opt("last_update_time_since_epoch", BigInt),
    ]);

    let mut unique: Vec<&'static [&'static str]> = vec![&["external_id"][..]];
    if family == SchemaFamily::Context {
        unique.push(&["type_id", "name"]);
    }

    TableDef {
        name: family.table(),
        columns,
        primary_key: None,
        unique,
    }
}

fn property_table(family: SchemaFamily) -> TableDef {
    use ColumnType::*;
    let primary_key: &'static [&'static str] = match family {
        SchemaFamily::Context => &["context_id", "name", "is_custom_property"],
        SchemaFamily::Artifact => &["artifact_id", "name", "is_custom_property"],
        SchemaFamily::Execution => &["execution_id", "name", "is_custom_property"],
    };
    TableDef {
        name: family.property_table(),
        columns: vec![
            col(family.owner_column(), Int),
            col("name", Name),
            col("is_custom_property", Bool),
            opt("int_value", BigInt),
            opt("double_value", Double),
            opt("string_value", Text),
            opt("bool_value", Bool),
            opt("byte_value", Bytes),
            opt("proto_value", Bytes),
        ],
        primary_key: Some(primary_key),
        unique: Vec::new(),
    }
}

fn link_table(family: SchemaFamily) -> TableDef {
    use ColumnType::*;
    match family {
        SchemaFamily::Context => TableDef {
            name: family.link_table(),
            columns: vec![col("context_id", Int), col("parent_context_id", Int)],
            primary_key: Some(&["context_id", "parent_context_id"][..]),
            unique: Vec::new(),
        },
        SchemaFamily::Artifact => TableDef {
            name: family.link_table(),
            columns: vec![col("id", Id), col("context_id", Int), col("artifact_id", Int)],
            primary_key: None,
            unique: vec![&["context_id", "artifact_id"][..]],
        },
        SchemaFamily::Execution => TableDef {
            name: family.link_table(),
            columns: vec![col("id", Id), col("context_id", Int), col("execution_id", Int)],
            primary_key: None,
            unique: vec![&["context_id", "execution_id"][..]],
        },
    }
}

fn tables() -> Vec<TableDef> {
    use ColumnType::*;
    let mut tables = vec![
        TableDef {
            name: "Type",
            columns: vec![
                col("id", Id),
                col("name", Name),
                opt("version", Name),
                col("type_kind", Int),
                opt("description", Text),
            ],
            primary_key: None,
            unique: vec![&["name"][..]],
        },
        TableDef {
            name: "TypeProperty",
            columns: vec![col("type_id", Int), col("name", Name), opt("data_type", Int)],
            primary_key: Some(&["type_id", "name"][..]),
            unique: Vec::new(),
        },
    ];
    for family in SchemaFamily::ALL {
        tables.push(entity_table(family));
        tables.push(property_table(family));
        tables.push(link_table(family));
    }
    tables
}

/// Create every missing metadata table.
pub async fn ensure_schema(pool: &AnyPool) -> Result<()> {
    let mut conn = pool
        .acquire()
        .await
        .context("Failed to acquire connection for schema bootstrap")?;
    let dialect = Dialect::from_name(conn.backend_name());

    for table in tables() {
        let sql = table.create_table_sql(dialect);
        debug!(table = table.name, %dialect, "Ensuring table");
        sqlx::query(&sql)
            .execute(&mut *conn)
            .await
            .with_context(|| format!("Failed to create table {}", table.name))?;
    }

    info!(%dialect, "Metadata schema ready");
    Ok(())
}
