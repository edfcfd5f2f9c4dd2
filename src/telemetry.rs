//! Tracing subscriber setup for binaries and tests embedding the registry core.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::RegistryConfig;

/// Install a JSON `fmt` subscriber filtered by `RUST_LOG`, falling back to
/// the configured filter. Does nothing if a global subscriber already exists.
pub fn init_tracing(config: &RegistryConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_filter.as_str()));

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().json())
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!(filter = %config.log_filter, "Tracing initialized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_initialization_is_a_no_op() {
        let config = RegistryConfig::default();
        init_tracing(&config);
        init_tracing(&config);
    }
}
