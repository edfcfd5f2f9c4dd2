//! Error types surfaced by the registry core.
//!
//! Database failures are sanitized: the `Display` text names only the entity
//! kind and operation, while the driver error is kept as the `source` and logged.

use thiserror::Error;

use crate::filter::ParseError;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("invalid filter query: {0}")]
    InvalidFilter(#[from] ParseError),

    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error(
        "cannot change type of property '{name}' on type {type_id}: \
         declared as {existing}, requested {requested}"
    )]
    TypeConflict {
        type_id: i32,
        name: String,
        existing: String,
        requested: String,
    },

    #[error("database error while running {operation} on {entity}")]
    Database {
        entity: &'static str,
        operation: &'static str,
        #[source]
        source: sqlx::Error,
    },
}

impl RegistryError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    /// True for lookups that matched no row; callers map this to a 404.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// True for errors caused by caller input rather than the datastore.
    pub fn is_bad_request(&self) -> bool {
        matches!(
            self,
            Self::InvalidFilter(_) | Self::InvalidArgument { .. } | Self::TypeConflict { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, RegistryError>;

/// Build a `map_err` adapter that logs the driver error with its operation
/// context and returns the sanitized [`RegistryError::Database`].
pub(crate) fn db_error(
    entity: &'static str,
    operation: &'static str,
) -> impl FnOnce(sqlx::Error) -> RegistryError {
    move |source| {
        tracing::error!(entity, operation, error = %source, "Database operation failed");
        RegistryError::Database {
            entity,
            operation,
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_errors_do_not_leak_driver_text() {
        let err = db_error("RegisteredModel", "list")(sqlx::Error::Protocol(
            "syntax error near \"ContextProperty\"".to_string(),
        ));
        let text = err.to_string();
        assert_eq!(text, "database error while running list on RegisteredModel");
        assert!(!text.contains("ContextProperty"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn classification_helpers() {
        assert!(RegistryError::not_found("ModelVersion", 7).is_not_found());
        assert!(RegistryError::invalid("bad orderBy").is_bad_request());
        let conflict = RegistryError::TypeConflict {
            type_id: 1,
            name: "owner".into(),
            existing: "STRING".into(),
            requested: "INT".into(),
        };
        assert!(conflict.is_bad_request());
        assert!(conflict.to_string().contains("cannot change type"));
        assert!(!RegistryError::not_found("Experiment", "x").is_bad_request());
    }
}
