//! Storage-related configuration methods

use crate::error::{Error, Result};

use super::StorageConfig;

/// Reject hostnames carrying a scheme, credentials or a path
fn validate_hostname(host: &str) -> Result<()> {
    if host.contains("://") || host.contains('@') || host.contains('/') {
        return Err(Error::config(format!(
            "Invalid hostname '{host}': contains forbidden characters"
        )));
    }
    if host.is_empty() {
        return Err(Error::config("Hostname cannot be empty".to_string()));
    }
    Ok(())
}

/// Only alphanumerics, underscores and hyphens, within Postgres's 63-character limit
fn validate_database_name(name: &str) -> Result<()> {
    if !name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
    {
        return Err(Error::config(format!(
            "Invalid database name '{name}': only alphanumeric, underscore, and hyphen allowed"
        )));
    }
    if name.len() > 63 {
        return Err(Error::config(
            "Database name exceeds PostgreSQL's 63-character limit".to_string(),
        ));
    }
    if name.is_empty() {
        return Err(Error::config("Database name cannot be empty".to_string()));
    }
    Ok(())
}

impl StorageConfig {
    /// Validate connection settings
    pub fn validate(&self) -> Result<()> {
        validate_hostname(&self.postgres_host)?;
        validate_database_name(&self.postgres_database)?;

        if self.postgres_port == 0 {
            return Err(Error::config(
                "Invalid port: must be greater than 0".to_string(),
            ));
        }
        if self.postgres_pool_size == 0 {
            return Err(Error::config(
                "storage.postgres_pool_size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Build a `postgres://` connection URL from the individual settings
    pub fn database_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.postgres_user,
            self.postgres_password,
            self.postgres_host,
            self.postgres_port,
            self.postgres_database
        )
    }
}
