//! Registry configuration management

use std::env;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::db::TimestampPolicy;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://model-registry.db?mode=rwc";
pub const DEFAULT_LOG_FILTER: &str = "registry_core=info";

/// Registry configuration loaded from environment variables
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryConfig {
    /// Database URL; the scheme selects the driver (`sqlite:`, `postgres:`, `mysql:`)
    pub database_url: String,

    /// Maximum pooled connections
    pub max_connections: u32,

    /// How long to wait for a pooled connection
    pub connect_timeout: Duration,

    /// Timestamp handling for saves
    pub timestamp_policy: TimestampPolicy,

    /// Page size used when a list call does not set one
    pub default_page_size: i32,

    /// `tracing` filter directive
    pub log_filter: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: 10,
            connect_timeout: Duration::from_secs(10),
            timestamp_policy: TimestampPolicy::Refresh,
            default_page_size: 20,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl RegistryConfig {
    /// Load configuration from environment variables, reading `.env` first if present
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let max_connections = match lookup("DATABASE_MAX_CONNECTIONS") {
            Some(v) => v.trim().parse().context("Invalid DATABASE_MAX_CONNECTIONS")?,
            None => defaults.max_connections,
        };

        let connect_timeout = match lookup("DATABASE_CONNECT_TIMEOUT_SECS") {
            Some(v) => Duration::from_secs(
                v.trim()
                    .parse()
                    .context("Invalid DATABASE_CONNECT_TIMEOUT_SECS")?,
            ),
            None => defaults.connect_timeout,
        };

        let default_page_size = match lookup("REGISTRY_DEFAULT_PAGE_SIZE") {
            Some(v) => {
                let size: i32 = v.trim().parse().context("Invalid REGISTRY_DEFAULT_PAGE_SIZE")?;
                anyhow::ensure!(size > 0, "REGISTRY_DEFAULT_PAGE_SIZE must be positive");
                size
            }
            None => defaults.default_page_size,
        };

        let timestamp_policy = match lookup("REGISTRY_PRESERVE_TIMESTAMPS") {
            Some(v) if v == "true" || v == "1" => TimestampPolicy::PreserveHistorical,
            _ => TimestampPolicy::Refresh,
        };

        Ok(Self {
            database_url: lookup("DATABASE_URL").unwrap_or(defaults.database_url),
            max_connections,
            connect_timeout,
            timestamp_policy,
            default_page_size,
            log_filter: lookup("REGISTRY_LOG").unwrap_or(defaults.log_filter),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<RegistryConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RegistryConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config, RegistryConfig::default());
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.default_page_size, 20);
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("DATABASE_URL", "postgres://registry@localhost/registry"),
            ("DATABASE_MAX_CONNECTIONS", "4"),
            ("DATABASE_CONNECT_TIMEOUT_SECS", "3"),
            ("REGISTRY_PRESERVE_TIMESTAMPS", "true"),
            ("REGISTRY_DEFAULT_PAGE_SIZE", "50"),
            ("REGISTRY_LOG", "registry_core=debug"),
        ])
        .unwrap();
        assert_eq!(config.database_url, "postgres://registry@localhost/registry");
        assert_eq!(config.max_connections, 4);
        assert_eq!(config.connect_timeout, Duration::from_secs(3));
        assert_eq!(config.timestamp_policy, TimestampPolicy::PreserveHistorical);
        assert_eq!(config.default_page_size, 50);
        assert_eq!(config.log_filter, "registry_core=debug");
    }

    #[test]
    fn test_invalid_numbers_name_the_variable() {
        let err = load(&[("DATABASE_MAX_CONNECTIONS", "many")]).unwrap_err();
        assert!(err.to_string().contains("DATABASE_MAX_CONNECTIONS"));

        let err = load(&[("REGISTRY_DEFAULT_PAGE_SIZE", "0")]).unwrap_err();
        assert!(err.to_string().contains("REGISTRY_DEFAULT_PAGE_SIZE"));
    }
}
