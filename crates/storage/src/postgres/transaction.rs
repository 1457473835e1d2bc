use super::types::ENQUEUE_LOCK_NAMESPACE;
use crate::error::sqlx_err;
use crate::DbTransaction;
use async_trait::async_trait;
use autoindex_core::error::Result;
use autoindex_core::{CommitId, NewIndex, RepositoryId};
use sqlx::types::Json;
use sqlx::{Postgres, Transaction};

/// An open PostgreSQL transaction exposed through [`DbTransaction`]
pub struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

impl PostgresTransaction {
    pub(crate) fn new(tx: Transaction<'static, Postgres>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl DbTransaction for PostgresTransaction {
    async fn is_queued(&mut self, repository_id: RepositoryId, commit: &CommitId) -> Result<bool> {
        // Serializes concurrent enqueuers for the same repository until this
        // transaction ends, so the check and the inserts that follow are atomic.
        sqlx::query("SELECT pg_advisory_xact_lock($1, $2)")
            .bind(ENQUEUE_LOCK_NAMESPACE)
            .bind(repository_id)
            .execute(&mut *self.tx)
            .await
            .map_err(sqlx_err("Failed to acquire enqueue lock"))?;

        sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM lsif_indexes WHERE repository_id = $1 AND commit = $2)
                OR EXISTS(SELECT 1 FROM lsif_enqueue_claims WHERE repository_id = $1 AND commit = $2)",
        )
        .bind(repository_id)
        .bind(commit.as_str())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(sqlx_err("Failed to check queued indexes"))
    }

    async fn claim_commit(&mut self, repository_id: RepositoryId, commit: &CommitId) -> Result<()> {
        sqlx::query("INSERT INTO lsif_enqueue_claims (repository_id, commit) VALUES ($1, $2)")
            .bind(repository_id)
            .bind(commit.as_str())
            .execute(&mut *self.tx)
            .await
            .map_err(sqlx_err("Failed to claim commit"))?;
        Ok(())
    }

    async fn insert_index(&mut self, index: &NewIndex) -> Result<i64> {
        sqlx::query_scalar(
            "INSERT INTO lsif_indexes (
                repository_id, commit, state, docker_steps, root, indexer, indexer_args, outfile
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id",
        )
        .bind(index.repository_id)
        .bind(index.commit.as_str())
        .bind(index.state.as_str())
        .bind(Json(&index.docker_steps))
        .bind(&index.root)
        .bind(&index.indexer)
        .bind(&index.indexer_args)
        .bind(&index.outfile)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(sqlx_err("Failed to insert index"))
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx
            .commit()
            .await
            .map_err(sqlx_err("Failed to commit transaction"))
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx
            .rollback()
            .await
            .map_err(sqlx_err("Failed to roll back transaction"))
    }
}
