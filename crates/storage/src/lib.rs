#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

pub mod error;
mod factory;
pub mod mock;
pub mod postgres;
mod registry;

// Export factory functions
pub use factory::create_postgres_store;
pub use postgres::{IndexRecord, PostgresStore, PostgresTransaction};
pub use registry::InMemoryRepositoryRegistry;

use async_trait::async_trait;
use autoindex_core::{CommitId, Error, NewIndex, RepositoryId, StoredIndexConfiguration};
use tracing::warn;

// ==== Traits ====

/// Read access to the store plus the ability to open a transaction
///
/// Index records are only ever written through a [`DbTransaction`], so a
/// dedup check and the inserts that follow it always share one unit of work.
#[async_trait]
pub trait DbStore: Send + Sync {
    /// Begin a transaction
    ///
    /// The returned handle must be released with [`finish`] (or an explicit
    /// commit/rollback) on every exit path.
    async fn transact(&self) -> Result<Box<dyn DbTransaction>, Error>;

    /// Explicit configuration stored for a repository, if any
    async fn get_index_configuration_by_repository_id(
        &self,
        repository_id: RepositoryId,
    ) -> Result<Option<StoredIndexConfiguration>, Error>;

    /// All repositories that have explicit configuration stored
    async fn get_repositories_with_index_configuration(&self) -> Result<Vec<RepositoryId>, Error>;
}

/// A capability-scoped handle to an open transaction
#[async_trait]
pub trait DbTransaction: Send {
    /// Whether any index work is already recorded for the commit
    async fn is_queued(&mut self, repository_id: RepositoryId, commit: &CommitId)
        -> Result<bool, Error>;

    /// Record that the commit is being enqueued in this transaction
    ///
    /// At most one claim exists per commit; a second claim fails with
    /// [`Error::Conflict`]. Jobs within one plan may repeat a root and indexer.
    async fn claim_commit(&mut self, repository_id: RepositoryId, commit: &CommitId)
        -> Result<(), Error>;

    /// Insert one index record and return its id
    async fn insert_index(&mut self, index: &NewIndex) -> Result<i64, Error>;

    async fn commit(self: Box<Self>) -> Result<(), Error>;

    async fn rollback(self: Box<Self>) -> Result<(), Error>;
}

/// Name ↔ id mapping for repositories known to this deployment
#[async_trait]
pub trait RepositoryRegistry: Send + Sync {
    /// Return the id for a repository name, registering it if unknown
    async fn ensure_repository(&self, name: &str) -> Result<RepositoryId, Error>;

    /// Look up the name registered for an id
    async fn repository_name(&self, repository_id: RepositoryId) -> Result<Option<String>, Error>;
}

/// Release a transaction according to the outcome of the work done in it
///
/// Commits on `Ok`. On `Err` the transaction is rolled back and the original
/// error is returned; a failing rollback is only logged.
pub async fn finish<T>(tx: Box<dyn DbTransaction>, result: Result<T, Error>) -> Result<T, Error> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!("Failed to roll back transaction after error ({err}): {rollback_err}");
            }
            Err(err)
        }
    }
}
