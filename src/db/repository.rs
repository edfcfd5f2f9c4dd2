//! Generic EAV repository shared by every entity kind.
//!
//! One algorithm serves all kinds: the kind's [`FamilyAdapter`] supplies the
//! row mapping, its [`EntityKind`] the REST scope, and the repository instance
//! the `type_id` every query is restricted to.

use std::marker::PhantomData;

use serde::{Deserialize, Serialize};
use sqlx::any::AnyRow;
use sqlx::{Acquire, AnyConnection, AnyPool};

use super::family::{
    ContextFamily, FamilyAdapter, PROPERTY_COLUMNS, decode_property_value, get_i32, get_opt_bool,
    get_opt_string, insert_columns, property_value_columns, update_columns,
};
use super::kinds::EntityKind;
use crate::error::{RegistryError, Result, db_error};
use crate::filter::{self, QueryCompiler};
use crate::models::{Entity, EntityAttributes, Property, SchemaFamily};
use crate::pagination::{Cursor, ListOptions, ListResult, OrderBy};
use crate::sql::query::execute_with_binds;
use crate::sql::{Dialect, SelectQuery, SqlValue};

/// How `save` stamps creation and update times.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimestampPolicy {
    /// New entities get `create_time = now`; every save sets `last_update_time = now`.
    #[default]
    Refresh,
    /// Only fill timestamps that are unset, keeping imported history intact.
    PreserveHistorical,
}

impl TimestampPolicy {
    fn apply<A: EntityAttributes>(self, attributes: &mut A, is_new: bool, now: i64) {
        let unset = |t: Option<i64>| t.is_none_or(|t| t == 0);
        match self {
            Self::Refresh => {
                if is_new || unset(attributes.create_time()) {
                    attributes.set_create_time(now);
                }
                attributes.set_last_update_time(now);
            }
            Self::PreserveHistorical => {
                if unset(attributes.create_time()) {
                    attributes.set_create_time(now);
                }
                if unset(attributes.last_update_time()) {
                    attributes.set_last_update_time(now);
                }
            }
        }
    }
}

type Attributes<K> = <<K as EntityKind>::Family as FamilyAdapter>::Attributes;

/// Entity record type served by the repository for kind `K`.
pub type KindEntity<K> = Entity<Attributes<K>>;

pub struct GenericRepository<K: EntityKind> {
    pool: AnyPool,
    type_id: i32,
    timestamps: TimestampPolicy,
    default_page_size: i32,
    _kind: PhantomData<K>,
}

impl<K: EntityKind> Clone for GenericRepository<K> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            type_id: self.type_id,
            timestamps: self.timestamps,
            default_page_size: self.default_page_size,
            _kind: PhantomData,
        }
    }
}

impl<K: EntityKind> GenericRepository<K> {
    pub fn new(pool: AnyPool, type_id: i32) -> Self {
        Self {
            pool,
            type_id,
            timestamps: TimestampPolicy::default(),
            default_page_size: 20,
            _kind: PhantomData,
        }
    }

    pub fn with_timestamp_policy(mut self, policy: TimestampPolicy) -> Self {
        self.timestamps = policy;
        self
    }

    pub fn with_default_page_size(mut self, page_size: i32) -> Self {
        self.default_page_size = page_size.max(1);
        self
    }

    pub fn type_id(&self) -> i32 {
        self.type_id
    }

    fn entity_name() -> &'static str {
        K::REST_TYPE.name()
    }

    fn family() -> SchemaFamily {
        <K::Family as FamilyAdapter>::SCHEMA
    }

    /// Get an entity by id
    pub async fn get_by_id(&self, id: i32) -> Result<KindEntity<K>> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(db_error(Self::entity_name(), "get_by_id"))?;

        self.find_one(&mut conn, "id", SqlValue::Int(i64::from(id)))
            .await
            .map_err(db_error(Self::entity_name(), "get_by_id"))?
            .ok_or_else(|| RegistryError::not_found(Self::entity_name(), id))
    }

    /// List one page of entities.
    pub async fn list(&self, options: &ListOptions) -> Result<ListResult<KindEntity<K>>> {
        let entity = Self::entity_name();
        let family = Self::family();
        let page_size = options
            .page_size
            .filter(|size| *size > 0)
            .unwrap_or(self.default_page_size);

        // Parse before touching the database so bad filters fail fast.
        let expression = match options.filter_query.as_deref() {
            Some(input) => filter::parse(input).inspect_err(|e| {
                tracing::debug!(entity, filter = input, error = %e, "Rejected filter query");
            })?,
            None => None,
        };

        let mut conn = self.pool.acquire().await.map_err(db_error(entity, "list"))?;
        let dialect = Dialect::from_name(conn.backend_name());

        let mut query = SelectQuery::new(dialect, family.table(), family.columns());
        let table = query.table().to_string();
        query = query.where_clause(
            format!("{table}.type_id = ?"),
            [SqlValue::Int(i64::from(self.type_id))],
        );
        query = K::apply_list_filters(query, options);

        if let Some(expr) = &expression {
            let compiled =
                QueryCompiler::new(family, Some(K::REST_TYPE), dialect).build_query(expr);
            query = query.filter(compiled);
        }

        if let Some(cursor) = options.cursor() {
            match cursor.keyset_condition(&table, options.order_by, options.sort_order) {
                Some((condition, args)) => query = query.where_clause(condition, args),
                None => tracing::debug!(entity, "Page token does not match order column, ignoring"),
            }
        }

        query = query.order_by(options.order_by.column(), options.sort_order);
        if options.order_by != OrderBy::Id {
            query = query.order_by("id", options.sort_order);
        }
        query = query.limit(i64::from(page_size) + 1);

        let rows = query.fetch_all(&mut conn).await.map_err(db_error(entity, "list"))?;
        let has_more = rows.len() > page_size as usize;

        let mut items = Vec::with_capacity(rows.len().min(page_size as usize));
        for row in rows.iter().take(page_size as usize) {
            let item = self
                .hydrate(&mut conn, row)
                .await
                .map_err(db_error(entity, "list"))?;
            items.push(item);
        }

        let next_page_token = match items.last() {
            Some(last) if has_more => {
                let id = last.id.unwrap_or_default();
                let value = K::Family::sort_value(id, &last.attributes, options.order_by);
                Cursor::new(i64::from(id), value).encode()
            }
            _ => String::new(),
        };

        tracing::debug!(entity, size = items.len(), has_more, "Listed entities");
        Ok(ListResult {
            size: items.len() as i32,
            items,
            next_page_token,
            page_size,
        })
    }

    /// Insert or update an entity, link it under `parent_id`, reconcile its
    /// properties, and return it as stored.
    pub async fn save(
        &self,
        mut entity: KindEntity<K>,
        parent_id: Option<i32>,
    ) -> Result<KindEntity<K>> {
        let name = Self::entity_name();
        let family = Self::family();
        let is_new = entity.id.is_none();

        if is_new
            && family == SchemaFamily::Context
            && entity.attributes.name().is_none_or(str::is_empty)
        {
            return Err(RegistryError::invalid(format!("{name} name is required")));
        }

        let now = chrono::Utc::now().timestamp_millis();
        self.timestamps.apply(&mut entity.attributes, is_new, now);
        entity.type_id = self.type_id;

        let mut conn = self.pool.acquire().await.map_err(db_error(name, "save"))?;
        let dialect = Dialect::from_name(conn.backend_name());
        let mut tx = conn.begin().await.map_err(db_error(name, "save"))?;

        let id = match entity.id {
            Some(id) => {
                if !self.exists(&mut tx, dialect, id).await.map_err(db_error(name, "save"))? {
                    return Err(RegistryError::not_found(name, id));
                }
                self.update(&mut tx, dialect, id, &entity.attributes)
                    .await
                    .map_err(db_error(name, "save"))?;
                id
            }
            None => self
                .insert(&mut tx, dialect, &entity.attributes)
                .await
                .map_err(db_error(name, "save"))?,
        };

        if let Some(parent_id) = parent_id {
            ensure_parent_link(&mut tx, dialect, family, parent_id, id)
                .await
                .map_err(db_error(name, "save"))?;
        }

        reconcile_properties(&mut tx, dialect, family, id, &entity.properties, false, false)
            .await
            .map_err(db_error(name, "save"))?;
        if let Some(custom) = &entity.custom_properties {
            reconcile_properties(&mut tx, dialect, family, id, custom, true, true)
                .await
                .map_err(db_error(name, "save"))?;
        }

        tx.commit().await.map_err(db_error(name, "save"))?;
        tracing::debug!(entity = name, id, is_new, "Saved entity");

        self.find_one(&mut conn, "id", SqlValue::Int(i64::from(id)))
            .await
            .map_err(db_error(name, "save"))?
            .ok_or_else(|| RegistryError::not_found(name, id))
    }

    async fn find_one(
        &self,
        conn: &mut AnyConnection,
        column: &str,
        value: SqlValue,
    ) -> std::result::Result<Option<KindEntity<K>>, sqlx::Error> {
        let dialect = Dialect::from_name(conn.backend_name());
        let family = Self::family();
        let query = SelectQuery::new(dialect, family.table(), family.columns());
        let table = query.table().to_string();
        let query = query
            .where_clause(format!("{table}.{column} = ?"), [value])
            .where_clause(
                format!("{table}.type_id = ?"),
                [SqlValue::Int(i64::from(self.type_id))],
            );

        match query.fetch_optional(conn).await? {
            Some(row) => Ok(Some(self.hydrate(conn, &row).await?)),
            None => Ok(None),
        }
    }

    /// Decode an entity row and attach its properties.
    async fn hydrate(
        &self,
        conn: &mut AnyConnection,
        row: &AnyRow,
    ) -> std::result::Result<KindEntity<K>, sqlx::Error> {
        let (id, type_id, attributes) = K::Family::decode(row)?;
        let (properties, custom_properties) = load_properties(conn, Self::family(), id).await?;
        Ok(Entity {
            id: Some(id),
            type_id,
            attributes,
            properties,
            custom_properties: Some(custom_properties),
        })
    }

    async fn exists(
        &self,
        conn: &mut AnyConnection,
        dialect: Dialect,
        id: i32,
    ) -> std::result::Result<bool, sqlx::Error> {
        let sql = dialect.rebind(&format!(
            "SELECT id FROM {} WHERE id = ? AND type_id = ?",
            dialect.quote(Self::family().table())
        ));
        let row = sqlx::query(&sql)
            .bind(i64::from(id))
            .bind(i64::from(self.type_id))
            .fetch_optional(conn)
            .await?;
        Ok(row.is_some())
    }

    async fn insert(
        &self,
        conn: &mut AnyConnection,
        dialect: Dialect,
        attributes: &Attributes<K>,
    ) -> std::result::Result<i32, sqlx::Error> {
        let (columns, values): (Vec<_>, Vec<_>) =
            insert_columns::<K::Family>(self.type_id, attributes).into_iter().unzip();
        let mut sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            dialect.quote(Self::family().table()),
            columns.join(", "),
            vec!["?"; values.len()].join(", ")
        );

        if dialect.returns_inserted_id() {
            sql.push_str(" RETURNING id");
            let sql = dialect.rebind(&sql);
            tracing::debug!(sql = %sql, "Executing insert");
            let mut query = sqlx::query(&sql);
            for value in &values {
                query = value.bind_to_query(query);
            }
            let row = query.fetch_one(conn).await?;
            return get_i32(&row, "id");
        }

        let result = execute_with_binds(conn, dialect, &sql, &values).await?;
        let id = result.last_insert_id().ok_or_else(|| {
            sqlx::Error::Protocol("driver did not report the inserted id".to_string())
        })?;
        i32::try_from(id).map_err(|e| sqlx::Error::Decode(Box::new(e)))
    }

    async fn update(
        &self,
        conn: &mut AnyConnection,
        dialect: Dialect,
        id: i32,
        attributes: &Attributes<K>,
    ) -> std::result::Result<(), sqlx::Error> {
        let (columns, mut values): (Vec<_>, Vec<_>) =
            update_columns::<K::Family>(attributes).into_iter().unzip();
        let assignments: Vec<String> = columns.iter().map(|c| format!("{c} = ?")).collect();
        let sql = format!(
            "UPDATE {} SET {} WHERE id = ? AND type_id = ?",
            dialect.quote(Self::family().table()),
            assignments.join(", ")
        );
        values.push(SqlValue::Int(i64::from(id)));
        values.push(SqlValue::Int(i64::from(self.type_id)));
        execute_with_binds(conn, dialect, &sql, &values).await?;
        Ok(())
    }
}

impl<K> GenericRepository<K>
where
    K: EntityKind<Family = ContextFamily>,
{
    /// Get a context-family entity by its stored name.
    pub async fn get_by_name(&self, name: &str) -> Result<KindEntity<K>> {
        let entity = Self::entity_name();
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(db_error(entity, "get_by_name"))?;

        self.find_one(&mut conn, "name", SqlValue::String(name.to_string()))
            .await
            .map_err(db_error(entity, "get_by_name"))?
            .ok_or_else(|| RegistryError::not_found(entity, name))
    }
}

/// Load all property rows of `owner_id`, split into declared and custom.
async fn load_properties(
    conn: &mut AnyConnection,
    family: SchemaFamily,
    owner_id: i32,
) -> std::result::Result<(Vec<Property>, Vec<Property>), sqlx::Error> {
    let dialect = Dialect::from_name(conn.backend_name());
    let sql = dialect.rebind(&format!(
        "SELECT {} FROM {} WHERE {} = ? ORDER BY name",
        PROPERTY_COLUMNS.join(", "),
        dialect.quote(family.property_table()),
        family.owner_column()
    ));
    let rows = sqlx::query(&sql)
        .bind(i64::from(owner_id))
        .fetch_all(conn)
        .await?;

    let mut properties = Vec::new();
    let mut custom = Vec::new();
    for row in &rows {
        let name = get_opt_string(row, "name")?.unwrap_or_default();
        let Some(value) = decode_property_value(row)? else {
            tracing::warn!(owner_id, property = %name, "Property row has no value, skipping");
            continue;
        };
        let is_custom = get_opt_bool(row, "is_custom_property")?.unwrap_or(false);
        let property = Property { name, value };
        if is_custom {
            custom.push(property);
        } else {
            properties.push(property);
        }
    }
    Ok((properties, custom))
}

/// Make sure `child_id` is linked under `parent_id`.
///
/// The existence check keeps the common path to a read; the insert itself
/// ignores unique-key conflicts so concurrent saves of the same link both succeed.
async fn ensure_parent_link(
    conn: &mut AnyConnection,
    dialect: Dialect,
    family: SchemaFamily,
    parent_id: i32,
    child_id: i32,
) -> std::result::Result<(), sqlx::Error> {
    let table = family.link_table();
    let parent_column = family.link_parent_column();
    let child_column = family.link_child_column();

    let sql = dialect.rebind(&format!(
        "SELECT {child_column} FROM {} WHERE {parent_column} = ? AND {child_column} = ?",
        dialect.quote(table)
    ));
    let existing = sqlx::query(&sql)
        .bind(i64::from(parent_id))
        .bind(i64::from(child_id))
        .fetch_optional(&mut *conn)
        .await?;
    if existing.is_some() {
        return Ok(());
    }

    let sql = dialect.insert_ignore(table, &[child_column, parent_column]);
    execute_with_binds(
        conn,
        dialect,
        &sql,
        &[SqlValue::Int(i64::from(child_id)), SqlValue::Int(i64::from(parent_id))],
    )
    .await?;
    tracing::debug!(table, parent_id, child_id, "Linked entity to parent");
    Ok(())
}

/// Upsert `properties` keyed by `(owner, name, is_custom)`. With `prune`,
/// stored rows of the same kind missing from `properties` are deleted.
async fn reconcile_properties(
    conn: &mut AnyConnection,
    dialect: Dialect,
    family: SchemaFamily,
    owner_id: i32,
    properties: &[Property],
    is_custom: bool,
    prune: bool,
) -> std::result::Result<(), sqlx::Error> {
    let table = dialect.quote(family.property_table());
    let owner = family.owner_column();
    let key = [
        SqlValue::Int(i64::from(owner_id)),
        SqlValue::Bool(is_custom),
    ];

    if prune {
        let mut sql = format!("DELETE FROM {table} WHERE {owner} = ? AND is_custom_property = ?");
        let mut values = key.to_vec();
        if !properties.is_empty() {
            sql.push_str(&format!(
                " AND name NOT IN ({})",
                vec!["?"; properties.len()].join(", ")
            ));
            values.extend(properties.iter().map(|p| SqlValue::String(p.name.clone())));
        }
        let result = execute_with_binds(&mut *conn, dialect, &sql, &values).await?;
        if result.rows_affected() > 0 {
            tracing::debug!(
                owner_id,
                removed = result.rows_affected(),
                "Removed stale custom properties"
            );
        }
    }

    let select = dialect.rebind(&format!(
        "SELECT name FROM {table} WHERE {owner} = ? AND is_custom_property = ? AND name = ?"
    ));
    for property in properties {
        let existing = sqlx::query(&select)
            .bind(i64::from(owner_id))
            .bind(is_custom)
            .bind(property.name.as_str())
            .fetch_optional(&mut *conn)
            .await?;

        let value_columns = property_value_columns(&property.value);
        if existing.is_some() {
            let assignments: Vec<String> =
                value_columns.iter().map(|(c, _)| format!("{c} = ?")).collect();
            let sql = format!(
                "UPDATE {table} SET {} WHERE {owner} = ? AND is_custom_property = ? AND name = ?",
                assignments.join(", ")
            );
            let mut values: Vec<SqlValue> = value_columns.into_iter().map(|(_, v)| v).collect();
            values.extend(key.iter().cloned());
            values.push(SqlValue::String(property.name.clone()));
            execute_with_binds(&mut *conn, dialect, &sql, &values).await?;
        } else {
            let (columns, values): (Vec<_>, Vec<_>) = value_columns.into_iter().unzip();
            let sql = format!(
                "INSERT INTO {table} ({owner}, is_custom_property, name, {}) VALUES (?, ?, ?, {})",
                columns.join(", "),
                vec!["?"; columns.len()].join(", ")
            );
            let mut all = key.to_vec();
            all.push(SqlValue::String(property.name.clone()));
            all.extend(values);
            execute_with_binds(&mut *conn, dialect, &sql, &all).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContextAttributes;

    #[test]
    fn refresh_policy_stamps_new_entities() {
        let mut attributes = ContextAttributes {
            create_time_since_epoch: Some(5),
            ..ContextAttributes::named("m")
        };
        TimestampPolicy::Refresh.apply(&mut attributes, true, 1000);
        assert_eq!(attributes.create_time_since_epoch, Some(1000));
        assert_eq!(attributes.last_update_time_since_epoch, Some(1000));

        let mut existing = ContextAttributes {
            create_time_since_epoch: Some(5),
            last_update_time_since_epoch: Some(6),
            ..ContextAttributes::named("m")
        };
        TimestampPolicy::Refresh.apply(&mut existing, false, 2000);
        assert_eq!(existing.create_time_since_epoch, Some(5));
        assert_eq!(existing.last_update_time_since_epoch, Some(2000));
    }

    #[test]
    fn preserve_policy_only_fills_gaps() {
        let mut attributes = ContextAttributes {
            create_time_since_epoch: Some(5),
            last_update_time_since_epoch: Some(0),
            ..ContextAttributes::named("m")
        };
        TimestampPolicy::PreserveHistorical.apply(&mut attributes, true, 1000);
        assert_eq!(attributes.create_time_since_epoch, Some(5));
        assert_eq!(attributes.last_update_time_since_epoch, Some(1000));
    }
}
