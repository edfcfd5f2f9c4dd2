//! Per-family row mapping for the generic repository.
//!
//! Each storage family implements [`FamilyAdapter`] once; the repository
//! algorithm is shared and never inspects concrete row types at runtime.

use sqlx::Row;
use sqlx::any::AnyRow;

use crate::models::{
    ArtifactAttributes, ArtifactState, ContextAttributes, EntityAttributes, ExecutionAttributes,
    ExecutionState, PropertyValue, SchemaFamily,
};
use crate::pagination::OrderBy;
use crate::sql::{SqlType, SqlValue};

/// Column-level mapping between a family's entity table and its attributes.
pub trait FamilyAdapter: Send + Sync + 'static {
    const SCHEMA: SchemaFamily;

    type Attributes: EntityAttributes;

    /// Decode `(id, type_id, attributes)` from a row selected with
    /// [`SchemaFamily::columns`].
    fn decode(row: &AnyRow) -> Result<(i32, i32, Self::Attributes), sqlx::Error>;

    /// Family-specific mutable columns, written on both insert and update.
    fn extra_columns(attributes: &Self::Attributes) -> Vec<(&'static str, SqlValue)>;

    /// Value of the active order column, encoded into the page token.
    fn sort_value(id: i32, attributes: &Self::Attributes, order_by: OrderBy) -> String {
        match order_by {
            OrderBy::Id => id.to_string(),
            OrderBy::CreateTime => attributes.create_time().unwrap_or_default().to_string(),
            OrderBy::LastUpdateTime => {
                attributes.last_update_time().unwrap_or_default().to_string()
            }
        }
    }
}

/// Columns written on insert, in order.
pub(crate) fn insert_columns<F: FamilyAdapter>(
    type_id: i32,
    attributes: &F::Attributes,
) -> Vec<(&'static str, SqlValue)> {
    let mut columns = vec![
        ("type_id", SqlValue::Int(i64::from(type_id))),
        ("name", SqlValue::opt_string(attributes.name())),
        ("external_id", SqlValue::opt_string(attributes.external_id())),
        ("create_time_since_epoch", SqlValue::opt_int(attributes.create_time())),
        ("last_update_time_since_epoch", SqlValue::opt_int(attributes.last_update_time())),
    ];
    columns.extend(F::extra_columns(attributes));
    columns
}

/// Columns written on update. `id`, `name`, `type_id` and the create time
/// are immutable once stored.
pub(crate) fn update_columns<F: FamilyAdapter>(
    attributes: &F::Attributes,
) -> Vec<(&'static str, SqlValue)> {
    let mut columns = vec![
        ("external_id", SqlValue::opt_string(attributes.external_id())),
        ("last_update_time_since_epoch", SqlValue::opt_int(attributes.last_update_time())),
    ];
    columns.extend(F::extra_columns(attributes));
    columns
}

pub struct ContextFamily;
pub struct ArtifactFamily;
pub struct ExecutionFamily;

impl FamilyAdapter for ContextFamily {
    const SCHEMA: SchemaFamily = SchemaFamily::Context;
    type Attributes = ContextAttributes;

    fn decode(row: &AnyRow) -> Result<(i32, i32, ContextAttributes), sqlx::Error> {
        let attributes = ContextAttributes {
            name: get_opt_string(row, "name")?.unwrap_or_default(),
            external_id: get_opt_string(row, "external_id")?,
            create_time_since_epoch: get_opt_i64(row, "create_time_since_epoch")?,
            last_update_time_since_epoch: get_opt_i64(row, "last_update_time_since_epoch")?,
        };
        Ok((get_i32(row, "id")?, get_i32(row, "type_id")?, attributes))
    }

    fn extra_columns(_: &ContextAttributes) -> Vec<(&'static str, SqlValue)> {
        Vec::new()
    }
}

impl FamilyAdapter for ArtifactFamily {
    const SCHEMA: SchemaFamily = SchemaFamily::Artifact;
    type Attributes = ArtifactAttributes;

    fn decode(row: &AnyRow) -> Result<(i32, i32, ArtifactAttributes), sqlx::Error> {
        let state = get_opt_i64(row, "state")?
            .and_then(|code| i32::try_from(code).ok())
            .and_then(ArtifactState::from_i32);
        let attributes = ArtifactAttributes {
            name: get_opt_string(row, "name")?,
            uri: get_opt_string(row, "uri")?,
            state,
            external_id: get_opt_string(row, "external_id")?,
            create_time_since_epoch: get_opt_i64(row, "create_time_since_epoch")?,
            last_update_time_since_epoch: get_opt_i64(row, "last_update_time_since_epoch")?,
        };
        Ok((get_i32(row, "id")?, get_i32(row, "type_id")?, attributes))
    }

    fn extra_columns(attributes: &ArtifactAttributes) -> Vec<(&'static str, SqlValue)> {
        vec![
            ("uri", SqlValue::opt_string(attributes.uri.as_deref())),
            (
                "state",
                SqlValue::opt_int(attributes.state.map(|s| i64::from(s.as_i32()))),
            ),
        ]
    }
}

impl FamilyAdapter for ExecutionFamily {
    const SCHEMA: SchemaFamily = SchemaFamily::Execution;
    type Attributes = ExecutionAttributes;

    fn decode(row: &AnyRow) -> Result<(i32, i32, ExecutionAttributes), sqlx::Error> {
        let last_known_state = get_opt_i64(row, "last_known_state")?
            .and_then(|code| i32::try_from(code).ok())
            .and_then(ExecutionState::from_i32);
        let attributes = ExecutionAttributes {
            name: get_opt_string(row, "name")?,
            last_known_state,
            external_id: get_opt_string(row, "external_id")?,
            create_time_since_epoch: get_opt_i64(row, "create_time_since_epoch")?,
            last_update_time_since_epoch: get_opt_i64(row, "last_update_time_since_epoch")?,
        };
        Ok((get_i32(row, "id")?, get_i32(row, "type_id")?, attributes))
    }

    fn extra_columns(attributes: &ExecutionAttributes) -> Vec<(&'static str, SqlValue)> {
        vec![(
            "last_known_state",
            SqlValue::opt_int(attributes.last_known_state.map(|s| i64::from(s.as_i32()))),
        )]
    }
}

/// Columns of every property table besides the owner column.
pub(crate) const PROPERTY_COLUMNS: &[&str] = &[
    "name",
    "is_custom_property",
    "int_value",
    "double_value",
    "string_value",
    "bool_value",
    "byte_value",
    "proto_value",
];

/// Typed value columns for a property, in [`PROPERTY_COLUMNS`] order after
/// `name` and `is_custom_property`. Exactly one is non-null.
pub(crate) fn property_value_columns(value: &PropertyValue) -> [(&'static str, SqlValue); 6] {
    let mut columns = [
        ("int_value", SqlValue::Null(SqlType::Int)),
        ("double_value", SqlValue::Null(SqlType::Float)),
        ("string_value", SqlValue::Null(SqlType::Text)),
        ("bool_value", SqlValue::Null(SqlType::Bool)),
        ("byte_value", SqlValue::Null(SqlType::Bytes)),
        ("proto_value", SqlValue::Null(SqlType::Bytes)),
    ];
    let (slot, bound) = match value {
        PropertyValue::Int(i) => (0, SqlValue::Int(*i)),
        PropertyValue::Double(x) => (1, SqlValue::Float(*x)),
        PropertyValue::String(s) => (2, SqlValue::String(s.clone())),
        PropertyValue::Bool(b) => (3, SqlValue::Bool(*b)),
        PropertyValue::Bytes(b) => (4, SqlValue::Bytes(b.clone())),
        PropertyValue::Proto(b) => (5, SqlValue::Bytes(b.clone())),
    };
    columns[slot].1 = bound;
    columns
}

/// Decode the populated value column of a property row.
pub(crate) fn decode_property_value(row: &AnyRow) -> Result<Option<PropertyValue>, sqlx::Error> {
    if let Some(s) = get_opt_string(row, "string_value")? {
        return Ok(Some(PropertyValue::String(s)));
    }
    if let Some(i) = get_opt_i64(row, "int_value")? {
        return Ok(Some(PropertyValue::Int(i)));
    }
    if let Some(x) = get_opt_f64(row, "double_value")? {
        return Ok(Some(PropertyValue::Double(x)));
    }
    if let Some(b) = get_opt_bool(row, "bool_value")? {
        return Ok(Some(PropertyValue::Bool(b)));
    }
    if let Some(b) = get_opt_bytes(row, "byte_value")? {
        return Ok(Some(PropertyValue::Bytes(b)));
    }
    if let Some(b) = get_opt_bytes(row, "proto_value")? {
        return Ok(Some(PropertyValue::Proto(b)));
    }
    Ok(None)
}

// Integer widths differ between backends behind the `Any` driver, so integer
// reads accept either i64 or i32 and booleans may come back as integers.

pub(crate) fn get_opt_i64(row: &AnyRow, column: &str) -> Result<Option<i64>, sqlx::Error> {
    match row.try_get::<Option<i64>, _>(column) {
        Ok(value) => Ok(value),
        Err(sqlx::Error::ColumnDecode { .. }) => Ok(row
            .try_get::<Option<i32>, _>(column)?
            .map(i64::from)),
        Err(e) => Err(e),
    }
}

pub(crate) fn get_i32(row: &AnyRow, column: &str) -> Result<i32, sqlx::Error> {
    let value = get_opt_i64(row, column)?.ok_or_else(|| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: "unexpected NULL".into(),
    })?;
    i32::try_from(value).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

pub(crate) fn get_opt_f64(row: &AnyRow, column: &str) -> Result<Option<f64>, sqlx::Error> {
    match row.try_get::<Option<f64>, _>(column) {
        Ok(value) => Ok(value),
        Err(sqlx::Error::ColumnDecode { .. }) => Ok(row
            .try_get::<Option<f32>, _>(column)?
            .map(f64::from)),
        Err(e) => Err(e),
    }
}

pub(crate) fn get_opt_bool(row: &AnyRow, column: &str) -> Result<Option<bool>, sqlx::Error> {
    match row.try_get::<Option<bool>, _>(column) {
        Ok(value) => Ok(value),
        Err(sqlx::Error::ColumnDecode { .. }) => Ok(get_opt_i64(row, column)?.map(|i| i != 0)),
        Err(e) => Err(e),
    }
}

pub(crate) fn get_opt_string(row: &AnyRow, column: &str) -> Result<Option<String>, sqlx::Error> {
    row.try_get::<Option<String>, _>(column)
}

pub(crate) fn get_opt_bytes(row: &AnyRow, column: &str) -> Result<Option<Vec<u8>>, sqlx::Error> {
    row.try_get::<Option<Vec<u8>>, _>(column)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ArtifactAttributes, ContextAttributes};

    #[test]
    fn update_columns_skip_immutable_fields() {
        let attributes = ArtifactAttributes {
            uri: Some("s3://bucket/model".into()),
            state: Some(ArtifactState::Live),
            ..ArtifactAttributes::named("m")
        };
        let names: Vec<_> = update_columns::<ArtifactFamily>(&attributes)
            .into_iter()
            .map(|(column, _)| column)
            .collect();
        assert_eq!(names, vec!["external_id", "last_update_time_since_epoch", "uri", "state"]);

        let names: Vec<_> = insert_columns::<ContextFamily>(1, &ContextAttributes::named("c"))
            .into_iter()
            .map(|(column, _)| column)
            .collect();
        assert!(names.contains(&"name") && names.contains(&"create_time_since_epoch"));
    }

    #[test]
    fn exactly_one_value_column_is_bound() {
        let columns = property_value_columns(&PropertyValue::Double(0.5));
        let bound: Vec<_> = columns
            .iter()
            .filter(|(_, v)| !matches!(v, SqlValue::Null(_)))
            .collect();
        assert_eq!(bound, vec![&("double_value", SqlValue::Float(0.5))]);
    }

    #[test]
    fn sort_values_follow_order_column() {
        let mut attributes = ContextAttributes::named("c");
        attributes.create_time_since_epoch = Some(1000);
        assert_eq!(ContextFamily::sort_value(4, &attributes, OrderBy::Id), "4");
        assert_eq!(ContextFamily::sort_value(4, &attributes, OrderBy::CreateTime), "1000");
        assert_eq!(ContextFamily::sort_value(4, &attributes, OrderBy::LastUpdateTime), "0");
    }
}
