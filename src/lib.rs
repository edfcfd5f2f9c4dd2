//! Persistence core of a metadata registry.
//!
//! Two halves: [`filter`] turns filter strings such as
//! `framework = "pytorch" AND epochs > 25` into parameterized SQL fragments,
//! and [`db`] stores registered models, versions, artifacts and their
//! properties in an entity-attribute-value schema behind one generic repository.

pub mod config;
pub mod db;
pub mod error;
pub mod filter;
pub mod models;
pub mod pagination;
pub mod sql;
pub mod telemetry;

pub use config::RegistryConfig;
pub use db::{Database, EntityKind, GenericRepository, TimestampPolicy, TypeRepository};
pub use error::{RegistryError, Result};
pub use pagination::{ListOptions, ListResult, OrderBy, SortOrder};
