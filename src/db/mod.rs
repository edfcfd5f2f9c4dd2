//! Database connection and repositories

pub mod family;
pub mod kinds;
pub mod repository;
pub mod schema;
pub mod types;

use std::time::Duration;

use anyhow::{Context as _, Result};
use sqlx::AnyPool;
use sqlx::any::AnyPoolOptions;

use crate::config::RegistryConfig;
use crate::sql::Dialect;

pub use family::{ArtifactFamily, ContextFamily, ExecutionFamily, FamilyAdapter};
pub use kinds::{
    DataSet, DocArtifact, EntityKind, Experiment, ExperimentRun, InferenceService, Metric,
    MetricHistory, ModelArtifact, ModelVersion, Parameter, RegisteredModel, ServeModel,
    ServingEnvironment,
};
pub use repository::{GenericRepository, KindEntity, TimestampPolicy};
pub use types::{PropertyDataType, TypeRepository};

/// Database wrapper providing connection pool access
#[derive(Clone)]
pub struct Database {
    pool: AnyPool,
    dialect: Dialect,
    timestamp_policy: TimestampPolicy,
    default_page_size: i32,
}

impl Database {
    /// Create a new database wrapper from an existing pool
    pub fn new(pool: AnyPool, dialect: Dialect) -> Self {
        Self {
            pool,
            dialect,
            timestamp_policy: TimestampPolicy::default(),
            default_page_size: 20,
        }
    }

    fn pool_options(config: &RegistryConfig) -> AnyPoolOptions {
        sqlx::any::install_default_drivers();
        AnyPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout)
    }

    fn from_pool(pool: AnyPool, config: &RegistryConfig) -> Self {
        Self {
            pool,
            dialect: Dialect::from_url(&config.database_url),
            timestamp_policy: config.timestamp_policy,
            default_page_size: config.default_page_size,
        }
    }

    /// Create a new database connection pool
    pub async fn connect(config: &RegistryConfig) -> Result<Self> {
        let pool = Self::pool_options(config)
            .connect(&config.database_url)
            .await
            .context("Failed to connect to database")?;

        let db = Self::from_pool(pool, config);
        tracing::info!(
            dialect = %db.dialect,
            max_connections = config.max_connections,
            "Connected to database"
        );
        Ok(db)
    }

    /// Create a new database connection pool with retry logic
    /// Retries every `retry_interval` until successful
    pub async fn connect_with_retry(config: &RegistryConfig, retry_interval: Duration) -> Self {
        loop {
            match Self::pool_options(config).connect(&config.database_url).await {
                Ok(pool) => {
                    return Self::from_pool(pool, config);
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        retry_secs = retry_interval.as_secs(),
                        "Database connection failed, retrying"
                    );
                    tokio::time::sleep(retry_interval).await;
                }
            }
        }
    }

    /// Get the connection pool
    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Create any missing metadata tables
    pub async fn ensure_schema(&self) -> Result<()> {
        schema::ensure_schema(&self.pool).await
    }

    /// Get the type registry
    pub fn types(&self) -> TypeRepository {
        TypeRepository::new(self.pool.clone())
    }

    /// Get a repository for entity kind `K`, registering its type if needed
    pub async fn repository<K: EntityKind>(&self) -> crate::error::Result<GenericRepository<K>> {
        let type_id = self
            .types()
            .get_or_create(K::REST_TYPE.type_name(), <K::Family as FamilyAdapter>::SCHEMA)
            .await?;

        Ok(GenericRepository::new(self.pool.clone(), type_id)
            .with_timestamp_policy(self.timestamp_policy)
            .with_default_page_size(self.default_page_size))
    }
}
