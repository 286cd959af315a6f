//! Process-wide configuration of the type pools.
//!
//! The configuration is read once, either from an explicit [`configure`] call
//! or, on first use, from the environment:
//!
//! - `FERRUM_TYPES_POOL_SWEEP_INTERVAL` - number of pool misses between sweeps
//!   of reclaimed entries

use once_cell::sync::OnceCell;
use serde::Deserialize;

use crate::error::{Error, Result};

const ENV_POOL_SWEEP_INTERVAL: &str = "FERRUM_TYPES_POOL_SWEEP_INTERVAL";

static CONFIG: OnceCell<TypesConfig> = OnceCell::new();

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TypesConfig {
    /// Number of weak pool misses after which dead entries are swept.
    #[serde(default = "default_pool_sweep_interval")]
    pub pool_sweep_interval: usize,
}

impl Default for TypesConfig {
    fn default() -> Self {
        Self {
            pool_sweep_interval: default_pool_sweep_interval(),
        }
    }
}

fn default_pool_sweep_interval() -> usize {
    1024
}

impl TypesConfig {
    /// Defaults overridden by environment variables where they parse.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(interval) = std::env::var(ENV_POOL_SWEEP_INTERVAL)
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|v| *v > 0)
        {
            config.pool_sweep_interval = interval;
        }
        config
    }
}

/// Installs the process-wide configuration.
///
/// Fails once a configuration is in place, including the implicit one a pool
/// reads on its first miss.
pub fn configure(config: TypesConfig) -> Result<()> {
    let interval = config.pool_sweep_interval;
    CONFIG.set(config).map_err(|_| Error::AlreadyConfigured)?;
    tracing::debug!(pool_sweep_interval = interval, "configured FHIR type pools");
    Ok(())
}

/// The active configuration.
pub fn config() -> &'static TypesConfig {
    CONFIG.get_or_init(TypesConfig::from_env)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_defaults() {
        let config: TypesConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, TypesConfig::default());
        assert_eq!(config.pool_sweep_interval, 1024);
    }

    #[test]
    fn test_deserialize_interval() {
        let config: TypesConfig = serde_json::from_str(r#"{"pool_sweep_interval": 16}"#).unwrap();
        assert_eq!(config.pool_sweep_interval, 16);
    }

    #[test]
    fn test_configure_only_once() {
        // reading installs the implicit configuration
        let _ = config();
        assert!(matches!(
            configure(TypesConfig::default()),
            Err(Error::AlreadyConfigured)
        ));
    }
}
