use super::transaction::PostgresTransaction;
use super::types::{IndexRecord, IndexRow};
use crate::error::{sqlx_err, StorageError};
use crate::{DbStore, DbTransaction, RepositoryRegistry};
use async_trait::async_trait;
use autoindex_core::error::{Error, Result};
use autoindex_core::{RepositoryId, StorageConfig, StoredIndexConfiguration};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{debug, info};

/// PostgreSQL-backed store for index records and repository configuration
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a connection pool sized from configuration
    pub async fn connect(config: &StorageConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.postgres_pool_size)
            .connect(&config.database_url())
            .await
            .map_err(|e| {
                Error::from(StorageError::ConnectionFailed(format!(
                    "{}:{}/{}: {e}",
                    config.postgres_host, config.postgres_port, config.postgres_database
                )))
            })?;

        debug!(
            "Connected to Postgres at {}:{}",
            config.postgres_host, config.postgres_port
        );
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the bundled schema migrations
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::from(StorageError::MigrationFailed(e.to_string())))?;

        info!("Database migrations applied");
        Ok(())
    }

    /// Store (or replace) the explicit configuration of a repository
    pub async fn set_index_configuration(
        &self,
        repository_id: RepositoryId,
        data: &[u8],
    ) -> Result<i64> {
        sqlx::query_scalar(
            "INSERT INTO lsif_index_configuration (repository_id, data)
             VALUES ($1, $2)
             ON CONFLICT (repository_id) DO UPDATE SET data = EXCLUDED.data
             RETURNING id",
        )
        .bind(repository_id)
        .bind(data)
        .fetch_one(&self.pool)
        .await
        .map_err(sqlx_err("Failed to store index configuration"))
    }

    /// All index records of a repository in insertion order
    pub async fn get_indexes(&self, repository_id: RepositoryId) -> Result<Vec<IndexRecord>> {
        let rows = sqlx::query_as::<_, IndexRow>(
            "SELECT id, repository_id, commit, state, docker_steps, root, indexer,
                    indexer_args, outfile, queued_at
             FROM lsif_indexes
             WHERE repository_id = $1
             ORDER BY id",
        )
        .bind(repository_id)
        .fetch_all(&self.pool)
        .await
        .map_err(sqlx_err("Failed to list indexes"))?;

        rows.into_iter().map(IndexRecord::try_from).collect()
    }
}

#[async_trait]
impl DbStore for PostgresStore {
    async fn transact(&self) -> Result<Box<dyn DbTransaction>> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(sqlx_err("Failed to begin transaction"))?;
        Ok(Box::new(PostgresTransaction::new(tx)))
    }

    async fn get_index_configuration_by_repository_id(
        &self,
        repository_id: RepositoryId,
    ) -> Result<Option<StoredIndexConfiguration>> {
        let row: Option<(i64, i32, Vec<u8>)> = sqlx::query_as(
            "SELECT id, repository_id, data FROM lsif_index_configuration WHERE repository_id = $1",
        )
        .bind(repository_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(sqlx_err("Failed to get index configuration"))?;

        Ok(row.map(|(id, repository_id, data)| StoredIndexConfiguration {
            id,
            repository_id,
            data,
        }))
    }

    async fn get_repositories_with_index_configuration(&self) -> Result<Vec<RepositoryId>> {
        sqlx::query_scalar("SELECT repository_id FROM lsif_index_configuration ORDER BY repository_id")
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_err("Failed to list configured repositories"))
    }
}

#[async_trait]
impl RepositoryRegistry for PostgresStore {
    async fn ensure_repository(&self, name: &str) -> Result<RepositoryId> {
        // The no-op update makes RETURNING yield the existing row on conflict
        sqlx::query_scalar(
            "INSERT INTO repo (name) VALUES ($1)
             ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
             RETURNING id",
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await
        .map_err(sqlx_err("Failed to register repository"))
    }

    async fn repository_name(&self, repository_id: RepositoryId) -> Result<Option<String>> {
        sqlx::query_scalar("SELECT name FROM repo WHERE id = $1")
            .bind(repository_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(sqlx_err("Failed to look up repository"))
    }
}
