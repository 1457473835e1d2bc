//! Configuration loading from files and environment variables

use crate::error::{Error, Result};
use config::{Config as ConfigLib, ConfigBuilder as LibConfigBuilder, Environment, File};
use std::path::Path;

use super::defaults::*;
use super::{global_config_path, Config};

/// Helper to set a config default with consistent error mapping
fn set_config_default<T: Into<config::Value>>(
    builder: LibConfigBuilder<config::builder::DefaultState>,
    key: &str,
    value: T,
) -> Result<LibConfigBuilder<config::builder::DefaultState>> {
    builder
        .set_default(key, value)
        .map_err(|e| Error::config(format!("Failed to set {key} default: {e}")))
}

/// Helper to apply a plain environment variable as an override
fn set_env_override(
    builder: LibConfigBuilder<config::builder::DefaultState>,
    var: &str,
    key: &str,
) -> Result<LibConfigBuilder<config::builder::DefaultState>> {
    match std::env::var(var) {
        Ok(value) => builder
            .set_override(key, value)
            .map_err(|e| Error::config(format!("Failed to set {var}: {e}"))),
        Err(_) => Ok(builder),
    }
}

impl Config {
    /// Loads configuration from a TOML file with environment variable overrides
    ///
    /// Environment variables are prefixed with `AUTOINDEX_` and use double underscores
    /// for nested values. For example:
    /// - `AUTOINDEX_ENQUEUER__MAX_INDEX_JOBS_PER_INFERRED_CONFIGURATION=50`
    ///
    /// The conventional `POSTGRES_*` variables are honored as well.
    pub fn from_file(path: &Path) -> Result<Self> {
        let builder = ConfigLib::builder();

        // Section defaults must be explicit; the config crate only sees keys it was given
        let builder = set_config_default(
            builder,
            "enqueuer.max_index_jobs_per_inferred_configuration",
            default_max_index_jobs_per_inferred_configuration() as i64,
        )?;
        let builder = set_config_default(
            builder,
            "enqueuer.declared_configuration_path",
            default_declared_configuration_path(),
        )?;
        let mut builder = match default_max_repositories_inspected_per_second() {
            Some(rate) => set_config_default(
                builder,
                "enqueuer.max_repositories_inspected_per_second",
                rate,
            )?,
            None => builder,
        };

        // Add the config file if it exists
        if path.exists() {
            builder = builder.add_source(File::from(path));
        }

        // Add environment variables with AUTOINDEX_ prefix
        builder = builder.add_source(
            Environment::with_prefix("AUTOINDEX")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder = set_env_override(builder, "POSTGRES_HOST", "storage.postgres_host")?;
        builder = set_env_override(builder, "POSTGRES_DATABASE", "storage.postgres_database")?;
        builder = set_env_override(builder, "POSTGRES_USER", "storage.postgres_user")?;
        builder = set_env_override(builder, "POSTGRES_PASSWORD", "storage.postgres_password")?;
        if let Ok(port) = std::env::var("POSTGRES_PORT") {
            if let Ok(port_num) = port.parse::<u16>() {
                builder = builder
                    .set_override("storage.postgres_port", port_num)
                    .map_err(|e| Error::config(format!("Failed to set POSTGRES_PORT: {e}")))?;
            }
        }

        let config = builder
            .build()
            .map_err(|e| Error::config(format!("Failed to build config: {e}")))?;

        config
            .try_deserialize()
            .map_err(|e| Error::config(format!("Failed to deserialize config: {e}")))
    }

    /// Creates a config from a TOML string (useful for testing)
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::config(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from a single file
    ///
    /// Precedence (lowest to highest):
    /// 1. Hardcoded defaults
    /// 2. Config file (~/.autoindex/config.toml or custom --config path)
    /// 3. Environment variables (AUTOINDEX_*, POSTGRES_*)
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let path = match config_path {
            Some(p) => p.to_path_buf(),
            None => global_config_path()?,
        };
        Self::from_file(&path)
    }
}
