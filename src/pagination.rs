//! Keyset pagination for entity listings.
//!
//! A page token encodes the last row's id and the value of the active order
//! column as `base64("<id>:<value>")`. The next page resumes strictly after
//! that pair, so rows inserted concurrently never shift page boundaries.

use std::fmt;
use std::str::FromStr;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};

use crate::error::RegistryError;
use crate::sql::SqlValue;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderBy {
    #[default]
    Id,
    CreateTime,
    LastUpdateTime,
}

impl OrderBy {
    /// Entity-table column this ordering sorts on.
    pub const fn column(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::CreateTime => "create_time_since_epoch",
            Self::LastUpdateTime => "last_update_time_since_epoch",
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Id => "ID",
            Self::CreateTime => "CREATE_TIME",
            Self::LastUpdateTime => "LAST_UPDATE_TIME",
        }
    }
}

impl FromStr for OrderBy {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "" | "ID" => Ok(Self::Id),
            "CREATE_TIME" => Ok(Self::CreateTime),
            "LAST_UPDATE_TIME" => Ok(Self::LastUpdateTime),
            other => Err(RegistryError::invalid(format!(
                "unsupported orderBy '{other}', expected ID, CREATE_TIME or LAST_UPDATE_TIME"
            ))),
        }
    }
}

impl fmt::Display for OrderBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sort direction for ORDER BY clauses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub const fn to_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }

    /// Comparison that moves past the cursor in this direction.
    const fn after(self) -> &'static str {
        match self {
            Self::Asc => ">",
            Self::Desc => "<",
        }
    }
}

impl FromStr for SortOrder {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "" | "ASC" => Ok(Self::Asc),
            "DESC" => Ok(Self::Desc),
            other => Err(RegistryError::invalid(format!(
                "unsupported sortOrder '{other}', expected ASC or DESC"
            ))),
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_sql())
    }
}

/// Decoded page token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    pub id: i64,
    pub value: String,
}

impl Cursor {
    pub fn new(id: i64, value: impl Into<String>) -> Self {
        Self {
            id,
            value: value.into(),
        }
    }

    /// Encode as an opaque page token.
    pub fn encode(&self) -> String {
        BASE64.encode(format!("{}:{}", self.id, self.value))
    }

    /// Decode a page token; `None` for anything malformed.
    pub fn decode(token: &str) -> Option<Self> {
        let decoded = BASE64.decode(token.trim()).ok()?;
        let s = String::from_utf8(decoded).ok()?;
        let (id, value) = s.split_once(':')?;
        Some(Self {
            id: id.parse().ok()?,
            value: value.to_string(),
        })
    }

    /// Keyset predicate selecting rows strictly after this cursor.
    ///
    /// Returns `None` when the sort value does not fit the order column, in
    /// which case the cursor is ignored.
    pub fn keyset_condition(
        &self,
        table: &str,
        order_by: OrderBy,
        sort_order: SortOrder,
    ) -> Option<(String, Vec<SqlValue>)> {
        let op = sort_order.after();
        if order_by == OrderBy::Id {
            return Some((format!("{table}.id {op} ?"), vec![SqlValue::Int(self.id)]));
        }

        let value: i64 = self.value.parse().ok()?;
        let column = format!("{table}.{}", order_by.column());
        Some((
            format!("({column} {op} ? OR ({column} = ? AND {table}.id {op} ?))"),
            vec![SqlValue::Int(value), SqlValue::Int(value), SqlValue::Int(self.id)],
        ))
    }
}

/// Options accepted by every `list` call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListOptions {
    /// Falls back to the repository default when unset or not positive.
    pub page_size: Option<i32>,
    pub order_by: OrderBy,
    pub sort_order: SortOrder,
    pub next_page_token: Option<String>,
    pub filter_query: Option<String>,
    pub name: Option<String>,
    pub external_id: Option<String>,
    pub parent_resource_id: Option<i32>,
}

impl ListOptions {
    pub fn with_page_size(mut self, page_size: i32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn with_order(mut self, order_by: OrderBy, sort_order: SortOrder) -> Self {
        self.order_by = order_by;
        self.sort_order = sort_order;
        self
    }

    pub fn with_filter(mut self, filter_query: impl Into<String>) -> Self {
        self.filter_query = Some(filter_query.into());
        self
    }

    pub fn with_page_token(mut self, token: impl Into<String>) -> Self {
        self.next_page_token = Some(token.into());
        self
    }

    pub fn with_parent(mut self, parent_resource_id: i32) -> Self {
        self.parent_resource_id = Some(parent_resource_id);
        self
    }

    /// Decoded cursor, if a well-formed token was supplied.
    pub fn cursor(&self) -> Option<Cursor> {
        let token = self.next_page_token.as_deref().filter(|t| !t.is_empty())?;
        let cursor = Cursor::decode(token);
        if cursor.is_none() {
            tracing::debug!(token, "Ignoring malformed page token");
        }
        cursor
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResult<T> {
    pub items: Vec<T>,
    /// Empty when this is the last page.
    pub next_page_token: String,
    pub page_size: i32,
    pub size: i32,
}

impl<T> ListResult<T> {
    pub fn has_more(&self) -> bool {
        !self.next_page_token.is_empty()
    }
}
