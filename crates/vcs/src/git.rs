//! git2-backed [`VcsClient`] over repositories stored on local disk

use crate::VcsClient;
use async_trait::async_trait;
use autoindex_core::error::{Error, Result};
use autoindex_core::{CommitId, RepositoryId};
use autoindex_storage::RepositoryRegistry;
use git2::{ErrorCode, ObjectType, Oid, Repository, Tree, TreeWalkMode, TreeWalkResult};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace};

/// Reads repositories laid out as `<repos_dir>/<repository name>`
///
/// Repository ids are translated to names through the shared registry, so
/// the same registry must be handed to whatever clones the repositories.
#[derive(Clone)]
pub struct LocalGitClient {
    repos_dir: PathBuf,
    registry: Arc<dyn RepositoryRegistry>,
}

impl LocalGitClient {
    pub fn new(repos_dir: impl Into<PathBuf>, registry: Arc<dyn RepositoryRegistry>) -> Self {
        Self {
            repos_dir: repos_dir.into(),
            registry,
        }
    }

    async fn repository_path(&self, repository_id: RepositoryId) -> Result<PathBuf> {
        let name = self
            .registry
            .repository_name(repository_id)
            .await?
            .ok_or_else(|| Error::vcs(format!("Unknown repository id {repository_id}")))?;
        Ok(self.repos_dir.join(name))
    }

    /// Run a blocking git2 operation against a repository off the async runtime
    async fn with_repository<T, F>(&self, repository_id: RepositoryId, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Repository) -> Result<T> + Send + 'static,
    {
        let path = self.repository_path(repository_id).await?;
        tokio::task::spawn_blocking(move || {
            let repo = open_repository(&path)?;
            op(&repo)
        })
        .await
        .map_err(|e| Error::vcs(format!("Git task failed: {e}")))?
    }
}

fn open_repository(path: &Path) -> Result<Repository> {
    Repository::open(path)
        .map_err(|e| Error::vcs(format!("Failed to open repository {}: {e}", path.display())))
}

fn commit_tree<'r>(repo: &'r Repository, commit: &str) -> Result<Tree<'r>> {
    let oid = Oid::from_str(commit)
        .map_err(|e| Error::vcs(format!("Invalid commit id {commit}: {e}")))?;
    repo.find_commit(oid)
        .and_then(|c| c.tree())
        .map_err(|e| Error::vcs(format!("Failed to load tree for commit {commit}: {e}")))
}

#[async_trait]
impl VcsClient for LocalGitClient {
    async fn resolve_revision(
        &self,
        repository_id: RepositoryId,
        revision: &str,
    ) -> Result<CommitId> {
        debug!("Resolving revision {revision} of repository {repository_id}");
        let revision = revision.to_string();
        self.with_repository(repository_id, move |repo| {
            let commit = repo
                .revparse_single(&revision)
                .and_then(|object| object.peel_to_commit())
                .map_err(|e| Error::vcs(format!("Failed to resolve revision {revision}: {e}")))?;
            Ok(CommitId::new(commit.id().to_string()))
        })
        .await
    }

    async fn file_exists(
        &self,
        repository_id: RepositoryId,
        commit: &CommitId,
        path: &str,
    ) -> Result<bool> {
        let commit = commit.as_str().to_string();
        let path = path.to_string();
        self.with_repository(repository_id, move |repo| {
            let tree = commit_tree(repo, &commit)?;
            match tree.get_path(Path::new(&path)) {
                Ok(entry) => Ok(entry.kind() == Some(ObjectType::Blob)),
                Err(e) if e.code() == ErrorCode::NotFound => Ok(false),
                Err(e) => Err(Error::vcs(format!("Failed to look up {path}: {e}"))),
            }
        })
        .await
    }

    async fn read_file(
        &self,
        repository_id: RepositoryId,
        commit: &CommitId,
        path: &str,
    ) -> Result<Vec<u8>> {
        let commit = commit.as_str().to_string();
        let path = path.to_string();
        self.with_repository(repository_id, move |repo| {
            let tree = commit_tree(repo, &commit)?;
            let entry = tree
                .get_path(Path::new(&path))
                .map_err(|e| Error::vcs(format!("File {path} not found at {commit}: {e}")))?;
            let object = entry
                .to_object(repo)
                .map_err(|e| Error::vcs(format!("Failed to load {path}: {e}")))?;
            let blob = object
                .as_blob()
                .ok_or_else(|| Error::vcs(format!("{path} is not a file")))?;

            trace!("Read {} bytes from {path}", blob.content().len());
            Ok(blob.content().to_vec())
        })
        .await
    }

    async fn list_files(
        &self,
        repository_id: RepositoryId,
        commit: &CommitId,
        pattern: &Regex,
    ) -> Result<Vec<String>> {
        let commit = commit.as_str().to_string();
        let pattern = pattern.clone();
        self.with_repository(repository_id, move |repo| {
            let tree = commit_tree(repo, &commit)?;
            let mut paths = Vec::new();
            tree.walk(TreeWalkMode::PreOrder, |dir, entry| {
                if entry.kind() == Some(ObjectType::Blob) {
                    if let Some(name) = entry.name() {
                        let path = format!("{dir}{name}");
                        if pattern.is_match(&path) {
                            paths.push(path);
                        }
                    }
                }
                TreeWalkResult::Ok
            })
            .map_err(|e| Error::vcs(format!("Failed to walk tree at {commit}: {e}")))?;

            debug!("{} files match {} at {commit}", paths.len(), pattern.as_str());
            Ok(paths)
        })
        .await
    }
}
