//! In-memory store for testing
//!
//! Transactions hold an owned lock over the whole data set, so concurrent
//! transactions are serialized the same way the advisory lock serializes
//! them in PostgreSQL.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use crate::{DbStore, DbTransaction};
use async_trait::async_trait;
use autoindex_core::error::{Error, Result};
use autoindex_core::{CommitId, NewIndex, RepositoryId, StoredIndexConfiguration};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// One observable call made against the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    GetIndexConfiguration(RepositoryId),
    GetConfiguredRepositories,
    Transact,
    IsQueued(RepositoryId, CommitId),
    ClaimCommit(RepositoryId, CommitId),
    InsertIndex(NewIndex),
    Commit,
    Rollback,
}

/// An index record held by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredIndex {
    pub id: i64,
    pub index: NewIndex,
}

#[derive(Debug, Default)]
struct MockData {
    configurations: HashMap<RepositoryId, StoredIndexConfiguration>,
    indexes: Vec<StoredIndex>,
    claims: HashSet<(RepositoryId, CommitId)>,
    next_index_id: i64,
    next_configuration_id: i64,
}

#[derive(Debug, Default)]
struct Failures {
    transact: bool,
    get_configuration: bool,
    insert_at: Option<usize>,
    inserts_seen: usize,
}

#[derive(Debug, Default)]
struct Delays {
    is_queued: Option<Duration>,
    insert: Option<Duration>,
}

#[derive(Debug, Default)]
struct Shared {
    history: Mutex<Vec<StoreCall>>,
    failures: Mutex<Failures>,
    delays: Mutex<Delays>,
}

impl Shared {
    fn record(&self, call: StoreCall) {
        self.history.lock().unwrap().push(call);
    }

    async fn pause(&self, select: impl Fn(&Delays) -> Option<Duration>) {
        let delay = select(&self.delays.lock().unwrap());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

/// Mock implementation of [`DbStore`]
#[derive(Clone, Default)]
pub struct MockDbStore {
    data: Arc<AsyncMutex<MockData>>,
    shared: Arc<Shared>,
}

impl MockDbStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed explicit configuration for a repository
    pub async fn with_index_configuration(
        self,
        repository_id: RepositoryId,
        data: impl Into<Vec<u8>>,
    ) -> Self {
        {
            let mut guard = self.data.lock().await;
            guard.next_configuration_id += 1;
            let id = guard.next_configuration_id;
            guard.configurations.insert(
                repository_id,
                StoredIndexConfiguration {
                    id,
                    repository_id,
                    data: data.into(),
                },
            );
        }
        self
    }

    /// Seed an index record for a commit, as if a previous run had queued it
    pub async fn queue_existing(&self, index: NewIndex) -> i64 {
        let mut guard = self.data.lock().await;
        guard.next_index_id += 1;
        let id = guard.next_index_id;
        guard.indexes.push(StoredIndex { id, index });
        id
    }

    /// Make every subsequent `transact` call fail
    pub fn fail_transact(&self) {
        self.shared.failures.lock().unwrap().transact = true;
    }

    /// Make configuration lookups fail
    pub fn fail_get_configuration(&self) {
        self.shared.failures.lock().unwrap().get_configuration = true;
    }

    /// Make the `n`-th insert (zero-based, counted over the store's lifetime) fail
    pub fn fail_insert_at(&self, n: usize) {
        self.shared.failures.lock().unwrap().insert_at = Some(n);
    }

    /// Delay every `is_queued` call, after it is recorded
    pub fn delay_is_queued(&self, delay: Duration) {
        self.shared.delays.lock().unwrap().is_queued = Some(delay);
    }

    /// Delay every `insert_index` call, after it is recorded
    pub fn delay_inserts(&self, delay: Duration) {
        self.shared.delays.lock().unwrap().insert = Some(delay);
    }

    /// Committed index records in insertion order
    pub async fn indexes(&self) -> Vec<StoredIndex> {
        self.data.lock().await.indexes.clone()
    }

    pub fn history(&self) -> Vec<StoreCall> {
        self.shared.history.lock().unwrap().clone()
    }

    /// Number of recorded calls matching a predicate
    pub fn count_calls(&self, predicate: impl Fn(&StoreCall) -> bool) -> usize {
        self.shared
            .history
            .lock()
            .unwrap()
            .iter()
            .filter(|call| predicate(call))
            .count()
    }
}

#[async_trait]
impl DbStore for MockDbStore {
    async fn transact(&self) -> Result<Box<dyn DbTransaction>> {
        self.shared.record(StoreCall::Transact);
        if self.shared.failures.lock().unwrap().transact {
            return Err(Error::storage("mock transact failure"));
        }

        let guard = Arc::clone(&self.data).lock_owned().await;
        Ok(Box::new(MockTransaction {
            guard,
            pending: Vec::new(),
            pending_claims: Vec::new(),
            shared: Arc::clone(&self.shared),
        }))
    }

    async fn get_index_configuration_by_repository_id(
        &self,
        repository_id: RepositoryId,
    ) -> Result<Option<StoredIndexConfiguration>> {
        self.shared
            .record(StoreCall::GetIndexConfiguration(repository_id));
        if self.shared.failures.lock().unwrap().get_configuration {
            return Err(Error::storage("mock configuration lookup failure"));
        }
        Ok(self
            .data
            .lock()
            .await
            .configurations
            .get(&repository_id)
            .cloned())
    }

    async fn get_repositories_with_index_configuration(&self) -> Result<Vec<RepositoryId>> {
        self.shared.record(StoreCall::GetConfiguredRepositories);
        let mut ids: Vec<_> = self.data.lock().await.configurations.keys().copied().collect();
        ids.sort_unstable();
        Ok(ids)
    }
}

struct MockTransaction {
    guard: OwnedMutexGuard<MockData>,
    pending: Vec<StoredIndex>,
    pending_claims: Vec<(RepositoryId, CommitId)>,
    shared: Arc<Shared>,
}

#[async_trait]
impl DbTransaction for MockTransaction {
    async fn is_queued(&mut self, repository_id: RepositoryId, commit: &CommitId) -> Result<bool> {
        self.shared
            .record(StoreCall::IsQueued(repository_id, commit.clone()));
        self.shared.pause(|d| d.is_queued).await;

        let claimed = self.guard.claims.contains(&(repository_id, commit.clone()));
        Ok(claimed
            || self
                .guard
                .indexes
                .iter()
                .any(|i| i.index.repository_id == repository_id && &i.index.commit == commit))
    }

    async fn claim_commit(&mut self, repository_id: RepositoryId, commit: &CommitId) -> Result<()> {
        self.shared
            .record(StoreCall::ClaimCommit(repository_id, commit.clone()));

        let key = (repository_id, commit.clone());
        if self.guard.claims.contains(&key) || self.pending_claims.contains(&key) {
            return Err(Error::conflict(format!(
                "commit {commit} of repository {repository_id} is already claimed"
            )));
        }
        self.pending_claims.push(key);
        Ok(())
    }

    async fn insert_index(&mut self, index: &NewIndex) -> Result<i64> {
        self.shared.record(StoreCall::InsertIndex(index.clone()));
        self.shared.pause(|d| d.insert).await;

        {
            let mut failures = self.shared.failures.lock().unwrap();
            let seen = failures.inserts_seen;
            failures.inserts_seen += 1;
            if failures.insert_at == Some(seen) {
                return Err(Error::storage("mock insert failure"));
            }
        }

        // Ids are consumed even when the transaction later rolls back
        self.guard.next_index_id += 1;
        let id = self.guard.next_index_id;
        self.pending.push(StoredIndex {
            id,
            index: index.clone(),
        });
        Ok(id)
    }

    async fn commit(mut self: Box<Self>) -> Result<()> {
        self.shared.record(StoreCall::Commit);
        let pending = std::mem::take(&mut self.pending);
        self.guard.indexes.extend(pending);
        let claims = std::mem::take(&mut self.pending_claims);
        self.guard.claims.extend(claims);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.shared.record(StoreCall::Rollback);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoindex_core::{IndexJob, IndexState};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn job(root: &str, indexer: &str) -> IndexJob {
        IndexJob {
            steps: Vec::new(),
            root: root.to_string(),
            indexer: indexer.to_string(),
            indexer_args: Vec::new(),
            outfile: None,
        }
    }

    #[tokio::test]
    async fn test_commit_applies_inserts() {
        let store = MockDbStore::new();
        let commit = CommitId::new("deadbeef");

        let mut tx = store.transact().await.unwrap();
        assert!(!tx.is_queued(42, &commit).await.unwrap());
        let id = tx
            .insert_index(&NewIndex::queued(42, &commit, job("", "lsif-go")))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let indexes = store.indexes().await;
        assert_eq!(indexes.len(), 1);
        assert_eq!(indexes[0].id, id);

        let mut tx = store.transact().await.unwrap();
        assert!(tx.is_queued(42, &commit).await.unwrap());
        tx.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn test_rollback_discards_inserts() {
        let store = MockDbStore::new();
        let commit = CommitId::new("deadbeef");

        let mut tx = store.transact().await.unwrap();
        tx.insert_index(&NewIndex::queued(42, &commit, job("", "lsif-go")))
            .await
            .unwrap();
        tx.rollback().await.unwrap();

        assert!(store.indexes().await.is_empty());
        assert_eq!(
            store.history(),
            vec![
                StoreCall::Transact,
                StoreCall::InsertIndex(NewIndex::queued(42, &commit, job("", "lsif-go"))),
                StoreCall::Rollback,
            ]
        );
    }

    #[tokio::test]
    async fn test_is_queued_ignores_state() {
        let store = MockDbStore::new();
        let commit = CommitId::new("deadbeef");
        let mut done = NewIndex::queued(42, &commit, job("", "lsif-go"));
        done.state = IndexState::Completed;
        store.queue_existing(done).await;

        let mut tx = store.transact().await.unwrap();
        assert!(tx.is_queued(42, &commit).await.unwrap());
        assert!(!tx.is_queued(43, &commit).await.unwrap());
        tx.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn test_second_claim_conflicts() {
        let store = MockDbStore::new();
        let commit = CommitId::new("deadbeef");

        let mut tx = store.transact().await.unwrap();
        tx.claim_commit(42, &commit).await.unwrap();
        let err = tx.claim_commit(42, &commit).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        tx.rollback().await.unwrap();

        // The rolled back claim is gone
        let mut tx = store.transact().await.unwrap();
        assert!(!tx.is_queued(42, &commit).await.unwrap());
        tx.claim_commit(42, &commit).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.transact().await.unwrap();
        assert!(tx.is_queued(42, &commit).await.unwrap());
        let err = tx.claim_commit(42, &commit).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        tx.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn test_jobs_may_share_root_and_indexer() {
        let store = MockDbStore::new();
        let commit = CommitId::new("deadbeef");
        let mut deps = job("", "lsif-go");
        deps.indexer_args = vec!["--dep-graph".to_string()];
        deps.outfile = Some("deps.dump".to_string());

        let mut tx = store.transact().await.unwrap();
        tx.claim_commit(42, &commit).await.unwrap();
        tx.insert_index(&NewIndex::queued(42, &commit, job("", "lsif-go")))
            .await
            .unwrap();
        tx.insert_index(&NewIndex::queued(42, &commit, deps))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.indexes().await.len(), 2);
    }

    #[tokio::test]
    async fn test_fail_insert_at() {
        let store = MockDbStore::new();
        store.fail_insert_at(1);
        let commit = CommitId::new("deadbeef");

        let mut tx = store.transact().await.unwrap();
        tx.insert_index(&NewIndex::queued(42, &commit, job("a", "x")))
            .await
            .unwrap();
        let err = tx
            .insert_index(&NewIndex::queued(42, &commit, job("b", "x")))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
        tx.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn test_transactions_are_serialized() {
        let store = MockDbStore::new();
        let tx = store.transact().await.unwrap();

        let other = store.clone();
        let second = tokio::spawn(async move { other.transact().await.map(|_| ()) });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!second.is_finished());

        tx.commit().await.unwrap();
        second.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_configuration_lookup() {
        let store = MockDbStore::new()
            .with_index_configuration(7, b"{}".to_vec())
            .await
            .with_index_configuration(3, b"{}".to_vec())
            .await;

        let config = store
            .get_index_configuration_by_repository_id(7)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(config.repository_id, 7);
        assert_eq!(config.data, b"{}".to_vec());
        assert!(store
            .get_index_configuration_by_repository_id(8)
            .await
            .unwrap()
            .is_none());
        assert_eq!(
            store.get_repositories_with_index_configuration().await.unwrap(),
            vec![3, 7]
        );
    }
}
