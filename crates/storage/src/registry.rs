use crate::RepositoryRegistry;
use async_trait::async_trait;
use autoindex_core::{Error, RepositoryId};
use dashmap::DashMap;
use std::sync::atomic::{AtomicI32, Ordering};

/// Process-local repository registry
///
/// Ids are assigned from 1 in registration order and never reused.
#[derive(Debug)]
pub struct InMemoryRepositoryRegistry {
    ids: DashMap<String, RepositoryId>,
    names: DashMap<RepositoryId, String>,
    next_id: AtomicI32,
}

impl Default for InMemoryRepositoryRegistry {
    fn default() -> Self {
        Self {
            ids: DashMap::new(),
            names: DashMap::new(),
            next_id: AtomicI32::new(1),
        }
    }
}

impl InMemoryRepositoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[async_trait]
impl RepositoryRegistry for InMemoryRepositoryRegistry {
    async fn ensure_repository(&self, name: &str) -> Result<RepositoryId, Error> {
        if name.is_empty() {
            return Err(Error::invalid_input("Repository name cannot be empty"));
        }

        // The entry guard holds the shard lock, so concurrent callers for the
        // same name observe a single id.
        let id = *self
            .ids
            .entry(name.to_string())
            .or_insert_with(|| {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                self.names.insert(id, name.to_string());
                id
            })
            .value();
        Ok(id)
    }

    async fn repository_name(&self, repository_id: RepositoryId) -> Result<Option<String>, Error> {
        Ok(self.names.get(&repository_id).map(|name| name.clone()))
    }
}
