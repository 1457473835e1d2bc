//! Configuration module for the autoindex system
//!
//! This module provides configuration structures and loading mechanisms for the
//! enqueuer host process. Configuration can be loaded from TOML files and/or
//! environment variables.

mod defaults;
mod loading;
mod storage;

#[cfg(test)]
mod tests;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use defaults::*;

/// Returns the path to the global configuration file
///
/// The global config is stored at `~/.autoindex/config.toml`.
pub fn global_config_path() -> Result<PathBuf> {
    let home_dir = dirs::home_dir()
        .ok_or_else(|| Error::config("Unable to determine home directory".to_string()))?;
    Ok(home_dir.join(".autoindex").join("config.toml"))
}

/// Safety limits and lookup paths for the enqueuer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnqueuerConfig {
    /// Token-bucket rate for repositories inspected by inference.
    /// Defaults to 10 per second; `inf` disables the limit.
    #[serde(default = "default_max_repositories_inspected_per_second")]
    pub max_repositories_inspected_per_second: Option<f64>,

    /// Inferred plans with more jobs than this are discarded whole
    #[serde(default = "default_max_index_jobs_per_inferred_configuration")]
    pub max_index_jobs_per_inferred_configuration: usize,

    /// Path, relative to the repository root, of the declared configuration file
    #[serde(default = "default_declared_configuration_path")]
    pub declared_configuration_path: String,
}

impl Default for EnqueuerConfig {
    fn default() -> Self {
        Self {
            max_repositories_inspected_per_second: default_max_repositories_inspected_per_second(
            ),
            max_index_jobs_per_inferred_configuration:
                default_max_index_jobs_per_inferred_configuration(),
            declared_configuration_path: default_declared_configuration_path(),
        }
    }
}

/// Configuration for the Postgres store
#[derive(Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Postgres host address
    #[serde(default = "default_postgres_host")]
    pub postgres_host: String,

    /// Postgres port
    #[serde(default = "default_postgres_port")]
    pub postgres_port: u16,

    /// Postgres database name
    #[serde(default = "default_postgres_database")]
    pub postgres_database: String,

    /// Postgres username
    #[serde(default = "default_postgres_user")]
    pub postgres_user: String,

    /// Postgres password
    #[serde(default = "default_postgres_password")]
    pub postgres_password: String,

    /// Postgres connection pool size (max connections)
    #[serde(default = "default_postgres_pool_size")]
    pub postgres_pool_size: u32,
}

impl std::fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageConfig")
            .field("postgres_host", &self.postgres_host)
            .field("postgres_port", &self.postgres_port)
            .field("postgres_database", &self.postgres_database)
            .field("postgres_user", &self.postgres_user)
            .field("postgres_password", &"***REDACTED***")
            .field("postgres_pool_size", &self.postgres_pool_size)
            .finish()
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            postgres_host: default_postgres_host(),
            postgres_port: default_postgres_port(),
            postgres_database: default_postgres_database(),
            postgres_user: default_postgres_user(),
            postgres_password: default_postgres_password(),
            postgres_pool_size: default_postgres_pool_size(),
        }
    }
}

/// Configuration for local git repository access
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VcsConfig {
    /// Directory holding one clone per repository name
    #[serde(default = "default_repos_dir")]
    pub repos_dir: String,

    /// Prefix joined with a repository name to form its clone URL
    #[serde(default = "default_clone_url_prefix")]
    pub clone_url_prefix: String,
}

impl Default for VcsConfig {
    fn default() -> Self {
        Self {
            repos_dir: default_repos_dir(),
            clone_url_prefix: default_clone_url_prefix(),
        }
    }
}

/// Main configuration structure for the autoindex system
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Enqueuer limits
    #[serde(default)]
    pub enqueuer: EnqueuerConfig,

    /// Storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Local git configuration
    #[serde(default)]
    pub vcs: VcsConfig,
}

impl Config {
    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        if let Some(rate) = self.enqueuer.max_repositories_inspected_per_second {
            if rate.is_nan() || rate <= 0.0 {
                return Err(Error::config(format!(
                    "enqueuer.max_repositories_inspected_per_second must be positive (got {rate}); set it to inf to disable the limit"
                )));
            }
        }

        if self.enqueuer.max_index_jobs_per_inferred_configuration == 0 {
            return Err(Error::config(
                "enqueuer.max_index_jobs_per_inferred_configuration must be greater than 0"
                    .to_string(),
            ));
        }

        if self.enqueuer.declared_configuration_path.trim().is_empty() {
            return Err(Error::config(
                "enqueuer.declared_configuration_path cannot be empty".to_string(),
            ));
        }

        self.storage.validate()?;

        if self.vcs.repos_dir.is_empty() {
            return Err(Error::config("vcs.repos_dir cannot be empty".to_string()));
        }

        Ok(())
    }

    /// Saves the configuration to a TOML file
    pub fn save(&self, path: &std::path::Path) -> Result<()> {
        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| Error::config(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, toml_string)
            .map_err(|e| Error::config(format!("Failed to write config file: {e}")))?;

        Ok(())
    }
}
