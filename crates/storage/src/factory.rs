use crate::PostgresStore;
use autoindex_core::{Error, StorageConfig};
use std::sync::Arc;

/// Connect to PostgreSQL using the storage section of the configuration
///
/// Migrations are not applied here; call [`PostgresStore::run_migrations`]
/// once the store is connected.
pub async fn create_postgres_store(config: &StorageConfig) -> Result<Arc<PostgresStore>, Error> {
    config.validate()?;
    let store = PostgresStore::connect(config).await?;
    Ok(Arc::new(store))
}
