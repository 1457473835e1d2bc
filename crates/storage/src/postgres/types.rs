//! Row types for PostgreSQL storage

use autoindex_core::{CommitId, DockerStep, IndexState, RepositoryId, Result};
use sqlx::types::Json;

/// Namespace for transaction-scoped advisory locks taken while enqueueing
///
/// Paired with the repository id as the second key of
/// `pg_advisory_xact_lock(int, int)`.
pub(crate) const ENQUEUE_LOCK_NAMESPACE: i32 = 0x6175_7478;

#[derive(sqlx::FromRow)]
pub(crate) struct IndexRow {
    pub id: i64,
    pub repository_id: i32,
    pub commit: String,
    pub state: String,
    pub docker_steps: Json<Vec<DockerStep>>,
    pub root: String,
    pub indexer: String,
    pub indexer_args: Vec<String>,
    pub outfile: Option<String>,
    pub queued_at: chrono::DateTime<chrono::Utc>,
}

/// An index record as read back from the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRecord {
    pub id: i64,
    pub repository_id: RepositoryId,
    pub commit: CommitId,
    pub state: IndexState,
    pub docker_steps: Vec<DockerStep>,
    pub root: String,
    pub indexer: String,
    pub indexer_args: Vec<String>,
    pub outfile: Option<String>,
    pub queued_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<IndexRow> for IndexRecord {
    type Error = autoindex_core::Error;

    fn try_from(row: IndexRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            repository_id: row.repository_id,
            commit: CommitId::new(row.commit),
            state: row.state.parse()?,
            docker_steps: row.docker_steps.0,
            root: row.root,
            indexer: row.indexer,
            indexer_args: row.indexer_args,
            outfile: row.outfile,
            queued_at: row.queued_at,
        })
    }
}
