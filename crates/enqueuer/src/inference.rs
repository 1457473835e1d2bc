//! Infers index jobs from the layout of a repository
//!
//! Each [`Recognizer`] keys on a build manifest. A single manifest anywhere
//! in the tree yields one job at the repository root; several manifests
//! yield one job per directory containing one.

use crate::cancel::cancellable;
use autoindex_core::error::{Error, Result};
use autoindex_core::{CommitId, DockerStep, IndexJob, RepositoryId};
use autoindex_vcs::VcsClient;
use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A fixed preparation step run before the indexer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CannedStep {
    pub image: &'static str,
    pub commands: &'static [&'static str],
}

/// Static description of how to index one ecosystem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recognizer {
    pub name: &'static str,
    /// File name whose presence marks a project root
    pub manifest_file: &'static str,
    pub indexer: &'static str,
    pub indexer_args: &'static [&'static str],
    pub steps: &'static [CannedStep],
}

/// Registered recognizers in the order their jobs are emitted
pub const RECOGNIZERS: &[Recognizer] = &[
    Recognizer {
        name: "go",
        manifest_file: "go.mod",
        indexer: "sourcegraph/lsif-go:latest",
        indexer_args: &["lsif-go", "--no-animation"],
        steps: &[CannedStep {
            image: "sourcegraph/lsif-go:latest",
            commands: &["go mod download"],
        }],
    },
    Recognizer {
        name: "typescript",
        manifest_file: "tsconfig.json",
        indexer: "sourcegraph/lsif-node:autoindex",
        indexer_args: &["lsif-tsc", "-p", "."],
        steps: &[CannedStep {
            image: "sourcegraph/lsif-node:autoindex",
            commands: &["npm install --ignore-scripts"],
        }],
    },
    Recognizer {
        name: "rust",
        manifest_file: "Cargo.toml",
        indexer: "sourcegraph/lsif-rust:latest",
        indexer_args: &["rust-analyzer", "lsif", "."],
        steps: &[CannedStep {
            image: "rust:latest",
            commands: &["cargo fetch"],
        }],
    },
    Recognizer {
        name: "python",
        manifest_file: "pyproject.toml",
        indexer: "sourcegraph/scip-python:autoindex",
        indexer_args: &["scip-python", "index", "."],
        steps: &[CannedStep {
            image: "python:3.11",
            commands: &["pip install ."],
        }],
    },
];

/// Look up a registered recognizer by name
pub fn find_recognizer(name: &str) -> Option<&'static Recognizer> {
    RECOGNIZERS.iter().find(|r| r.name == name)
}

impl Recognizer {
    /// Pattern handed to the VCS when listing candidate manifests
    pub fn path_pattern(&self) -> Result<Regex> {
        Regex::new(&format!("(^|/){}$", regex::escape(self.manifest_file)))
            .map_err(|e| Error::invalid_input(format!("bad pattern for {}: {e}", self.name)))
    }

    fn is_manifest(&self, path: &str) -> bool {
        path.rsplit('/').next() == Some(self.manifest_file)
    }

    /// Map listed paths to jobs; paths that are not this manifest are ignored
    pub fn infer(&self, paths: &[String]) -> Vec<IndexJob> {
        let mut dirs: Vec<&str> = paths
            .iter()
            .filter(|path| self.is_manifest(path))
            .map(|path| containing_dir(path))
            .collect();
        dirs.sort_unstable();
        dirs.dedup();

        match dirs.len() {
            0 => Vec::new(),
            1 => vec![self.job("")],
            _ => dirs
                .into_iter()
                .map(|dir| self.job(if dir.is_empty() { "." } else { dir }))
                .collect(),
        }
    }

    fn job(&self, root: &str) -> IndexJob {
        IndexJob {
            steps: self
                .steps
                .iter()
                .map(|step| DockerStep {
                    root: root.to_string(),
                    image: step.image.to_string(),
                    commands: step.commands.iter().map(|c| c.to_string()).collect(),
                })
                .collect(),
            root: root.to_string(),
            indexer: self.indexer.to_string(),
            indexer_args: self.indexer_args.iter().map(|a| a.to_string()).collect(),
            outfile: None,
        }
    }
}

fn containing_dir(path: &str) -> &str {
    path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

/// Run every recognizer against the tree at `commit`
///
/// Files are listed once per recognizer. Any listing failure aborts the
/// whole inference.
pub async fn infer_index_jobs(
    vcs: &dyn VcsClient,
    cancel: &CancellationToken,
    repository_id: RepositoryId,
    commit: &CommitId,
) -> Result<Vec<IndexJob>> {
    let mut jobs = Vec::new();
    for recognizer in RECOGNIZERS {
        let pattern = recognizer.path_pattern()?;
        let paths = cancellable(cancel, vcs.list_files(repository_id, commit, &pattern)).await?;

        let inferred = recognizer.infer(&paths);
        if !inferred.is_empty() {
            debug!(
                "Inferred {} {} job(s) for repository {repository_id} at {}",
                inferred.len(),
                recognizer.name,
                commit.short()
            );
        }
        jobs.extend(inferred);
    }
    Ok(jobs)
}
