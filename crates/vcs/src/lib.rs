//! Repository content access for the auto-indexing enqueuer
//!
//! Two collaborators live here: [`VcsClient`] reads files and resolves
//! revisions at a commit, and [`RepoUpdaterClient`] makes sure a repository
//! is known locally and up to date.

#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

mod git;
pub mod mock;
mod updater;

pub use git::LocalGitClient;
pub use mock::{MockRepoUpdater, MockVcsClient, VcsCall};
pub use updater::LocalRepoUpdater;

use async_trait::async_trait;
use autoindex_core::{CommitId, Error, RepositoryId};
use regex::Regex;

/// Read-only access to repository contents at a resolved commit
#[async_trait]
pub trait VcsClient: Send + Sync {
    /// Resolve a revision specifier (branch, tag, `HEAD`, sha) to a commit
    async fn resolve_revision(
        &self,
        repository_id: RepositoryId,
        revision: &str,
    ) -> Result<CommitId, Error>;

    async fn file_exists(
        &self,
        repository_id: RepositoryId,
        commit: &CommitId,
        path: &str,
    ) -> Result<bool, Error>;

    /// Raw bytes of a file; a missing file is an error
    async fn read_file(
        &self,
        repository_id: RepositoryId,
        commit: &CommitId,
        path: &str,
    ) -> Result<Vec<u8>, Error>;

    /// Every file path in the tree that matches `pattern`, relative to the root
    async fn list_files(
        &self,
        repository_id: RepositoryId,
        commit: &CommitId,
        pattern: &Regex,
    ) -> Result<Vec<String>, Error>;
}

/// Repository metadata service
#[async_trait]
pub trait RepoUpdaterClient: Send + Sync {
    /// Make sure `name` is cloned and current, returning its id
    async fn ensure_repository_updated(&self, name: &str) -> Result<RepositoryId, Error>;
}
