//! Type registry: the `Type` rows entity kinds are scoped to, and the data
//! types declared for their properties.

use sqlx::{Acquire, AnyPool, Row};

use super::family::{get_i32, get_opt_i64};
use crate::error::{RegistryError, Result, db_error};
use crate::models::SchemaFamily;
use crate::sql::query::execute_with_binds;
use crate::sql::{Dialect, SqlValue};

/// Declared data type of a type property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyDataType {
    Unknown,
    Int,
    Double,
    String,
    Struct,
    Proto,
    Boolean,
}

impl PropertyDataType {
    pub const fn code(self) -> i64 {
        match self {
            Self::Unknown => 0,
            Self::Int => 1,
            Self::Double => 2,
            Self::String => 3,
            Self::Struct => 4,
            Self::Proto => 5,
            Self::Boolean => 6,
        }
    }

    pub fn from_code(code: i64) -> Self {
        match code {
            1 => Self::Int,
            2 => Self::Double,
            3 => Self::String,
            4 => Self::Struct,
            5 => Self::Proto,
            6 => Self::Boolean,
            _ => Self::Unknown,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::Int => "INT",
            Self::Double => "DOUBLE",
            Self::String => "STRING",
            Self::Struct => "STRUCT",
            Self::Proto => "PROTO",
            Self::Boolean => "BOOLEAN",
        }
    }
}

const ENTITY: &str = "Type";

#[derive(Clone)]
pub struct TypeRepository {
    pool: AnyPool,
}

impl TypeRepository {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }

    /// Id of the type called `name`, if registered.
    pub async fn find_by_name(&self, name: &str) -> Result<Option<i32>> {
        let mut conn = self.pool.acquire().await.map_err(db_error(ENTITY, "find_by_name"))?;
        let dialect = Dialect::from_name(conn.backend_name());

        let sql =
            dialect.rebind(&format!("SELECT id FROM {} WHERE name = ?", dialect.quote("Type")));
        let row = sqlx::query(&sql)
            .bind(name)
            .fetch_optional(&mut *conn)
            .await
            .map_err(db_error(ENTITY, "find_by_name"))?;

        row.map(|row| get_i32(&row, "id"))
            .transpose()
            .map_err(db_error(ENTITY, "find_by_name"))
    }

    /// Id of the type called `name`, registering it for `family` if missing.
    pub async fn get_or_create(&self, name: &str, family: SchemaFamily) -> Result<i32> {
        if let Some(id) = self.find_by_name(name).await? {
            return Ok(id);
        }

        let mut conn = self.pool.acquire().await.map_err(db_error(ENTITY, "get_or_create"))?;
        let dialect = Dialect::from_name(conn.backend_name());
        let sql = dialect.insert_ignore("Type", &["name", "type_kind"]);
        execute_with_binds(
            &mut conn,
            dialect,
            &sql,
            &[
                SqlValue::String(name.to_string()),
                SqlValue::Int(i64::from(family.type_kind())),
            ],
        )
        .await
        .map_err(db_error(ENTITY, "get_or_create"))?;
        drop(conn);

        tracing::info!(type_name = name, family = ?family, "Registered entity type");
        self.find_by_name(name)
            .await?
            .ok_or_else(|| RegistryError::not_found(ENTITY, name))
    }

    /// Declare `name` on `type_id` with `data_type`.
    ///
    /// Re-declaring with the same data type is a no-op; a different data type
    /// fails with [`RegistryError::TypeConflict`].
    pub async fn save_property(
        &self,
        type_id: i32,
        name: &str,
        data_type: PropertyDataType,
    ) -> Result<()> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(db_error("TypeProperty", "save_property"))?;
        let dialect = Dialect::from_name(conn.backend_name());
        let mut tx = conn.begin().await.map_err(db_error("TypeProperty", "save_property"))?;

        let sql = dialect.rebind(&format!(
            "SELECT data_type FROM {} WHERE type_id = ? AND name = ?",
            dialect.quote("TypeProperty")
        ));
        let existing = sqlx::query(&sql)
            .bind(i64::from(type_id))
            .bind(name)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_error("TypeProperty", "save_property"))?;

        match existing {
            Some(row) => {
                let existing = get_opt_i64(&row, "data_type")
                    .map_err(db_error("TypeProperty", "save_property"))?
                    .map_or(PropertyDataType::Unknown, PropertyDataType::from_code);
                if existing != data_type {
                    return Err(RegistryError::TypeConflict {
                        type_id,
                        name: name.to_string(),
                        existing: existing.name().to_string(),
                        requested: data_type.name().to_string(),
                    });
                }
            }
            None => {
                let sql = format!(
                    "INSERT INTO {} (type_id, name, data_type) VALUES (?, ?, ?)",
                    dialect.quote("TypeProperty")
                );
                execute_with_binds(
                    &mut tx,
                    dialect,
                    &sql,
                    &[
                        SqlValue::Int(i64::from(type_id)),
                        SqlValue::String(name.to_string()),
                        SqlValue::Int(data_type.code()),
                    ],
                )
                .await
                .map_err(db_error("TypeProperty", "save_property"))?;
            }
        }

        tx.commit().await.map_err(db_error("TypeProperty", "save_property"))
    }

    /// Declared properties of `type_id`, ordered by name.
    pub async fn properties(&self, type_id: i32) -> Result<Vec<(String, PropertyDataType)>> {
        let mut conn = self.pool.acquire().await.map_err(db_error("TypeProperty", "properties"))?;
        let dialect = Dialect::from_name(conn.backend_name());
        let sql = dialect.rebind(&format!(
            "SELECT name, data_type FROM {} WHERE type_id = ? ORDER BY name",
            dialect.quote("TypeProperty")
        ));
        let rows = sqlx::query(&sql)
            .bind(i64::from(type_id))
            .fetch_all(&mut *conn)
            .await
            .map_err(db_error("TypeProperty", "properties"))?;

        rows.iter()
            .map(|row| -> std::result::Result<_, sqlx::Error> {
                let name: String = row.try_get("name")?;
                let data_type = get_opt_i64(row, "data_type")?
                    .map_or(PropertyDataType::Unknown, PropertyDataType::from_code);
                Ok((name, data_type))
            })
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(db_error("TypeProperty", "properties"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_type_codes_round_trip() {
        for data_type in [
            PropertyDataType::Int,
            PropertyDataType::Double,
            PropertyDataType::String,
            PropertyDataType::Struct,
            PropertyDataType::Proto,
            PropertyDataType::Boolean,
        ] {
            assert_eq!(PropertyDataType::from_code(data_type.code()), data_type);
        }
        assert_eq!(PropertyDataType::from_code(42), PropertyDataType::Unknown);
    }
}
