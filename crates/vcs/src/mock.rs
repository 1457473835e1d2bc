//! In-memory collaborators for testing

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use crate::{RepoUpdaterClient, VcsClient};
use async_trait::async_trait;
use autoindex_core::error::{Error, Result};
use autoindex_core::{CommitId, RepositoryId};
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One observable call made against [`MockVcsClient`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VcsCall {
    ResolveRevision(RepositoryId, String),
    FileExists(RepositoryId, CommitId, String),
    ReadFile(RepositoryId, CommitId, String),
    /// The pattern is recorded by its source text
    ListFiles(RepositoryId, CommitId, String),
}

#[derive(Debug, Default)]
struct MockRepository {
    revisions: HashMap<String, CommitId>,
    files: HashMap<CommitId, BTreeMap<String, Vec<u8>>>,
}

#[derive(Debug, Default)]
struct VcsState {
    repositories: HashMap<RepositoryId, MockRepository>,
    history: Vec<VcsCall>,
    fail_list_files: bool,
    fail_read_file: bool,
    delay: Option<Duration>,
}

/// Mock implementation of [`VcsClient`]
///
/// Repositories, revisions and files are seeded up front. `list_files`
/// filters the seeded paths with the given pattern.
#[derive(Clone, Default)]
pub struct MockVcsClient {
    state: Arc<Mutex<VcsState>>,
}

impl MockVcsClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `revision` resolve to `commit`
    pub fn with_revision(self, repository_id: RepositoryId, revision: &str, commit: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let repo = state.repositories.entry(repository_id).or_default();
            repo.revisions
                .insert(revision.to_string(), CommitId::new(commit));
            repo.files.entry(CommitId::new(commit)).or_default();
        }
        self
    }

    pub fn with_file(
        self,
        repository_id: RepositoryId,
        commit: &str,
        path: &str,
        contents: impl Into<Vec<u8>>,
    ) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state
                .repositories
                .entry(repository_id)
                .or_default()
                .files
                .entry(CommitId::new(commit))
                .or_default()
                .insert(path.to_string(), contents.into());
        }
        self
    }

    /// Seed several empty files at once
    pub fn with_paths(self, repository_id: RepositoryId, commit: &str, paths: &[&str]) -> Self {
        paths.iter().fold(self, |mock, path| {
            mock.with_file(repository_id, commit, path, Vec::new())
        })
    }

    /// Make every `list_files` call fail
    pub fn fail_list_files(&self) {
        self.state.lock().unwrap().fail_list_files = true;
    }

    pub fn fail_read_file(&self) {
        self.state.lock().unwrap().fail_read_file = true;
    }

    /// Sleep this long inside every call before answering
    pub fn with_delay(self, delay: Duration) -> Self {
        self.state.lock().unwrap().delay = Some(delay);
        self
    }

    pub fn history(&self) -> Vec<VcsCall> {
        self.state.lock().unwrap().history.clone()
    }

    /// Number of `list_files` calls made so far
    pub fn list_files_calls(&self) -> usize {
        self.history()
            .iter()
            .filter(|call| matches!(call, VcsCall::ListFiles(..)))
            .count()
    }

    async fn enter(&self, call: VcsCall) {
        let delay = {
            let mut state = self.state.lock().unwrap();
            state.history.push(call);
            state.delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn with_tree<T>(
        &self,
        repository_id: RepositoryId,
        commit: &CommitId,
        f: impl FnOnce(&BTreeMap<String, Vec<u8>>) -> Result<T>,
    ) -> Result<T> {
        let state = self.state.lock().unwrap();
        let tree = state
            .repositories
            .get(&repository_id)
            .and_then(|repo| repo.files.get(commit))
            .ok_or_else(|| Error::vcs(format!("Unknown commit {commit} in {repository_id}")))?;
        f(tree)
    }
}

#[async_trait]
impl VcsClient for MockVcsClient {
    async fn resolve_revision(
        &self,
        repository_id: RepositoryId,
        revision: &str,
    ) -> Result<CommitId> {
        self.enter(VcsCall::ResolveRevision(repository_id, revision.to_string()))
            .await;
        let state = self.state.lock().unwrap();
        state
            .repositories
            .get(&repository_id)
            .and_then(|repo| repo.revisions.get(revision))
            .cloned()
            .ok_or_else(|| Error::vcs(format!("Revision {revision} not found in {repository_id}")))
    }

    async fn file_exists(
        &self,
        repository_id: RepositoryId,
        commit: &CommitId,
        path: &str,
    ) -> Result<bool> {
        self.enter(VcsCall::FileExists(repository_id, commit.clone(), path.to_string()))
            .await;
        self.with_tree(repository_id, commit, |tree| Ok(tree.contains_key(path)))
    }

    async fn read_file(
        &self,
        repository_id: RepositoryId,
        commit: &CommitId,
        path: &str,
    ) -> Result<Vec<u8>> {
        self.enter(VcsCall::ReadFile(repository_id, commit.clone(), path.to_string()))
            .await;
        if self.state.lock().unwrap().fail_read_file {
            return Err(Error::vcs("mock read failure"));
        }
        self.with_tree(repository_id, commit, |tree| {
            tree.get(path)
                .cloned()
                .ok_or_else(|| Error::vcs(format!("File {path} not found at {commit}")))
        })
    }

    async fn list_files(
        &self,
        repository_id: RepositoryId,
        commit: &CommitId,
        pattern: &Regex,
    ) -> Result<Vec<String>> {
        self.enter(VcsCall::ListFiles(
            repository_id,
            commit.clone(),
            pattern.as_str().to_string(),
        ))
        .await;
        if self.state.lock().unwrap().fail_list_files {
            return Err(Error::vcs("mock list failure"));
        }
        self.with_tree(repository_id, commit, |tree| {
            Ok(tree
                .keys()
                .filter(|path| pattern.is_match(path))
                .cloned()
                .collect())
        })
    }
}

#[derive(Debug, Default)]
struct UpdaterState {
    repositories: HashMap<String, RepositoryId>,
    history: Vec<String>,
    fail: bool,
}

/// Mock implementation of [`RepoUpdaterClient`]
#[derive(Clone, Default)]
pub struct MockRepoUpdater {
    state: Arc<Mutex<UpdaterState>>,
}

impl MockRepoUpdater {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_repository(self, name: &str, repository_id: RepositoryId) -> Self {
        self.state
            .lock()
            .unwrap()
            .repositories
            .insert(name.to_string(), repository_id);
        self
    }

    pub fn fail(&self) {
        self.state.lock().unwrap().fail = true;
    }

    /// Names passed to `ensure_repository_updated`, in call order
    pub fn history(&self) -> Vec<String> {
        self.state.lock().unwrap().history.clone()
    }
}

#[async_trait]
impl RepoUpdaterClient for MockRepoUpdater {
    async fn ensure_repository_updated(&self, name: &str) -> Result<RepositoryId> {
        let mut state = self.state.lock().unwrap();
        state.history.push(name.to_string());
        if state.fail {
            return Err(Error::repo_updater("mock update failure"));
        }
        state
            .repositories
            .get(name)
            .copied()
            .ok_or_else(|| Error::repo_updater(format!("Repository {name} not found")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_list_files_filters_by_pattern() {
        let vcs = MockVcsClient::new()
            .with_revision(1, "HEAD", "c42")
            .with_paths(1, "c42", &["go.mod", "a/go.mod", "a/main.go", "README.md"]);
        let commit = vcs.resolve_revision(1, "HEAD").await.unwrap();

        let pattern = Regex::new(r"(^|/)go\.mod$").unwrap();
        let files = vcs.list_files(1, &commit, &pattern).await.unwrap();
        assert_eq!(files, vec!["a/go.mod".to_string(), "go.mod".to_string()]);
        assert_eq!(vcs.list_files_calls(), 1);
    }

    #[tokio::test]
    async fn test_read_missing_file_is_error() {
        let vcs = MockVcsClient::new().with_revision(1, "HEAD", "c42");
        let commit = CommitId::new("c42");

        assert!(!vcs.file_exists(1, &commit, "sourcegraph.yaml").await.unwrap());
        assert!(matches!(
            vcs.read_file(1, &commit, "sourcegraph.yaml").await,
            Err(Error::Vcs(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_revision() {
        let vcs = MockVcsClient::new();
        let err = vcs.resolve_revision(1, "main").await.unwrap_err();
        assert!(matches!(err, Error::Vcs(_)));
        assert_eq!(
            vcs.history(),
            vec![VcsCall::ResolveRevision(1, "main".to_string())]
        );
    }

    #[tokio::test]
    async fn test_repo_updater() {
        let updater = MockRepoUpdater::new().with_repository("github.com/foo/bar", 42);
        assert_eq!(
            updater
                .ensure_repository_updated("github.com/foo/bar")
                .await
                .unwrap(),
            42
        );
        assert!(updater
            .ensure_repository_updated("github.com/foo/baz")
            .await
            .is_err());
        assert_eq!(
            updater.history(),
            vec!["github.com/foo/bar".to_string(), "github.com/foo/baz".to_string()]
        );
    }
}
