//! Tests for the git2-backed collaborators against on-disk fixtures

use autoindex_core::{CommitId, Error};
use autoindex_storage::{InMemoryRepositoryRegistry, RepositoryRegistry};
use autoindex_vcs::{LocalGitClient, LocalRepoUpdater, RepoUpdaterClient, VcsClient};
use git2::{IndexAddOption, Oid, Repository, Signature};
use pretty_assertions::assert_eq;
use regex::Regex;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn write_and_commit(repo: &Repository, files: &[(&str, &str)], message: &str) -> Oid {
    let workdir = repo.workdir().unwrap().to_path_buf();
    for (path, contents) in files {
        let full = workdir.join(path);
        std::fs::create_dir_all(full.parent().unwrap()).unwrap();
        std::fs::write(full, contents).unwrap();
    }

    let mut index = repo.index().unwrap();
    index
        .add_all(["*"].iter(), IndexAddOption::DEFAULT, None)
        .unwrap();
    index.write().unwrap();
    let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
    let sig = Signature::now("Test User", "test@example.com").unwrap();

    let parent = repo.head().ok().map(|h| h.peel_to_commit().unwrap());
    let parents: Vec<_> = parent.iter().collect();
    repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
        .unwrap()
}

fn init_repo(path: &Path) -> Repository {
    std::fs::create_dir_all(path).unwrap();
    Repository::init(path).unwrap()
}

async fn setup_client(name: &str) -> (TempDir, Repository, LocalGitClient, i32) {
    let root = TempDir::new().unwrap();
    let repo = init_repo(&root.path().join(name));
    let registry = Arc::new(InMemoryRepositoryRegistry::new());
    let id = registry.ensure_repository(name).await.unwrap();
    let client = LocalGitClient::new(root.path(), registry);
    (root, repo, client, id)
}

#[tokio::test]
async fn test_resolve_revision_and_read_files() {
    let (_root, repo, client, id) = setup_client("github.com/test/repo").await;
    let oid = write_and_commit(
        &repo,
        &[("go.mod", "module example.com/x\n"), ("cmd/main.go", "package main\n")],
        "initial",
    );

    let commit = client.resolve_revision(id, "HEAD").await.unwrap();
    assert_eq!(commit, CommitId::new(oid.to_string()));

    assert!(client.file_exists(id, &commit, "go.mod").await.unwrap());
    assert!(client.file_exists(id, &commit, "cmd/main.go").await.unwrap());
    assert!(!client.file_exists(id, &commit, "sourcegraph.yaml").await.unwrap());
    // Directories are not files
    assert!(!client.file_exists(id, &commit, "cmd").await.unwrap());

    let contents = client.read_file(id, &commit, "go.mod").await.unwrap();
    assert_eq!(contents, b"module example.com/x\n".to_vec());

    let err = client
        .read_file(id, &commit, "sourcegraph.yaml")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Vcs(_)));
}

#[tokio::test]
async fn test_reads_are_pinned_to_commit() {
    let (_root, repo, client, id) = setup_client("github.com/test/pinned").await;
    let first = write_and_commit(&repo, &[("a/go.mod", "v1")], "first");
    write_and_commit(&repo, &[("a/go.mod", "v2"), ("b/go.mod", "v2")], "second");

    let first = CommitId::new(first.to_string());
    let pattern = Regex::new(r"(^|/)go\.mod$").unwrap();

    let files = client.list_files(id, &first, &pattern).await.unwrap();
    assert_eq!(files, vec!["a/go.mod".to_string()]);
    assert_eq!(
        client.read_file(id, &first, "a/go.mod").await.unwrap(),
        b"v1".to_vec()
    );

    let head = client.resolve_revision(id, "HEAD").await.unwrap();
    let files = client.list_files(id, &head, &pattern).await.unwrap();
    assert_eq!(files, vec!["a/go.mod".to_string(), "b/go.mod".to_string()]);
}

#[tokio::test]
async fn test_unknown_repository_and_revision() {
    let (_root, repo, client, id) = setup_client("github.com/test/unknown").await;
    write_and_commit(&repo, &[("README.md", "hi")], "initial");

    assert!(matches!(
        client.resolve_revision(id + 100, "HEAD").await,
        Err(Error::Vcs(_))
    ));
    assert!(matches!(
        client.resolve_revision(id, "no-such-branch").await,
        Err(Error::Vcs(_))
    ));
}

#[tokio::test]
async fn test_repo_updater_clones_then_fetches() {
    let upstream_root = TempDir::new().unwrap();
    let mirror_root = TempDir::new().unwrap();
    let name = "github.com/test/upstream";

    let upstream = init_repo(&upstream_root.path().join(name));
    let first = write_and_commit(&upstream, &[("go.mod", "module x\n")], "first");

    let registry = Arc::new(InMemoryRepositoryRegistry::new());
    let prefix = format!("{}/", upstream_root.path().display());
    let updater = LocalRepoUpdater::new(mirror_root.path(), prefix, registry.clone());
    let client = LocalGitClient::new(mirror_root.path(), registry.clone());

    let id = updater.ensure_repository_updated(name).await.unwrap();
    assert_eq!(
        client.resolve_revision(id, "HEAD").await.unwrap(),
        CommitId::new(first.to_string())
    );

    let second = write_and_commit(&upstream, &[("b/go.mod", "module y\n")], "second");
    let again = updater.ensure_repository_updated(name).await.unwrap();
    assert_eq!(again, id);
    assert_eq!(
        client.resolve_revision(id, "HEAD").await.unwrap(),
        CommitId::new(second.to_string())
    );
}

#[tokio::test]
async fn test_repo_updater_rejects_escaping_names() {
    let root = TempDir::new().unwrap();
    let registry = Arc::new(InMemoryRepositoryRegistry::new());
    let updater = LocalRepoUpdater::new(root.path(), "https://", registry.clone());

    let err = updater
        .ensure_repository_updated("../outside")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
    assert!(registry.is_empty());
}
