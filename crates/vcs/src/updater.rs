//! Keeps local clones of remote repositories current

use crate::RepoUpdaterClient;
use async_trait::async_trait;
use autoindex_core::error::{Error, Result};
use autoindex_core::RepositoryId;
use autoindex_storage::RepositoryRegistry;
use git2::build::RepoBuilder;
use git2::Repository;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Mirrors every branch and tag of the remote into the bare clone
const FETCH_REFSPECS: [&str; 2] = ["+refs/heads/*:refs/heads/*", "+refs/tags/*:refs/tags/*"];

/// [`RepoUpdaterClient`] that clones into `<repos_dir>/<name>`
///
/// Clones are bare mirrors so fetches can move every branch, including the
/// one `HEAD` points at.
#[derive(Clone)]
pub struct LocalRepoUpdater {
    repos_dir: PathBuf,
    clone_url_prefix: String,
    registry: Arc<dyn RepositoryRegistry>,
}

impl LocalRepoUpdater {
    pub fn new(
        repos_dir: impl Into<PathBuf>,
        clone_url_prefix: impl Into<String>,
        registry: Arc<dyn RepositoryRegistry>,
    ) -> Self {
        Self {
            repos_dir: repos_dir.into(),
            clone_url_prefix: clone_url_prefix.into(),
            registry,
        }
    }
}

/// Reject names that would escape the repositories directory
fn validate_repository_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid_input("Repository name cannot be empty"));
    }
    let escapes = Path::new(name)
        .components()
        .any(|c| !matches!(c, Component::Normal(_)));
    if escapes {
        return Err(Error::invalid_input(format!(
            "Repository name '{name}' must be a relative path without '..'"
        )));
    }
    Ok(())
}

fn clone_or_fetch(url: &str, path: &Path) -> Result<()> {
    match Repository::open_bare(path) {
        Ok(repo) => {
            debug!("Fetching {url} into {}", path.display());
            let mut remote = repo
                .find_remote("origin")
                .map_err(|e| Error::repo_updater(format!("No origin for {}: {e}", path.display())))?;
            remote
                .fetch(&FETCH_REFSPECS, None, None)
                .map_err(|e| Error::repo_updater(format!("Failed to fetch {url}: {e}")))?;
            Ok(())
        }
        Err(_) if !path.exists() => {
            info!("Cloning {url} into {}", path.display());
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let repo = RepoBuilder::new()
                .bare(true)
                .clone(url, path)
                .map_err(|e| Error::repo_updater(format!("Failed to clone {url}: {e}")))?;
            // The initial clone only tracks remote branches under refs/remotes
            repo.find_remote("origin")
                .and_then(|mut remote| remote.fetch(&FETCH_REFSPECS, None, None))
                .map_err(|e| Error::repo_updater(format!("Failed to fetch {url}: {e}")))?;
            Ok(())
        }
        Err(e) => Err(Error::repo_updater(format!(
            "{} exists but is not a bare repository: {e}",
            path.display()
        ))),
    }
}

#[async_trait]
impl RepoUpdaterClient for LocalRepoUpdater {
    async fn ensure_repository_updated(&self, name: &str) -> Result<RepositoryId> {
        validate_repository_name(name)?;

        let url = format!("{}{name}", self.clone_url_prefix);
        let path = self.repos_dir.join(name);
        tokio::task::spawn_blocking(move || clone_or_fetch(&url, &path))
            .await
            .map_err(|e| Error::repo_updater(format!("Update task failed: {e}")))??;

        self.registry.ensure_repository(name).await
    }
}
