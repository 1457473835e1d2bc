//! Index job plans and the records persisted for downstream workers

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier issued by the repository registry
pub type RepositoryId = i32;

/// A resolved, immutable commit identifier
///
/// Symbolic revisions (`HEAD`, branch names, tags) are resolved by the VCS
/// collaborator before a `CommitId` is built, so every persisted record
/// points at concrete content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitId(String);

impl CommitId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 8 characters, for log lines
    pub fn short(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CommitId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A single container invocation that prepares the workspace before indexing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DockerStep {
    /// Working directory relative to the repository root
    #[serde(default)]
    pub root: String,
    pub image: String,
    #[serde(default)]
    pub commands: Vec<String>,
}

/// An index job plan, before it is persisted
///
/// Produced either by decoding configuration or by the inference engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexJob {
    /// Effective step list: shared steps followed by job-specific steps
    pub steps: Vec<DockerStep>,
    pub root: String,
    pub indexer: String,
    pub indexer_args: Vec<String>,
    pub outfile: Option<String>,
}

/// Lifecycle state of a persisted index record
///
/// This crate only ever writes `Queued`; the other states belong to the
/// execution subsystem and exist so stored rows can be read back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexState {
    Queued,
    Processing,
    Completed,
    Errored,
}

impl IndexState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Errored => "errored",
        }
    }
}

impl fmt::Display for IndexState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndexState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "queued" => Ok(Self::Queued),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "errored" => Ok(Self::Errored),
            _ => Err(Error::storage(format!("Invalid index state: {s}"))),
        }
    }
}

/// The persisted unit of work handed to index workers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewIndex {
    pub repository_id: RepositoryId,
    pub commit: CommitId,
    pub state: IndexState,
    pub docker_steps: Vec<DockerStep>,
    pub root: String,
    pub indexer: String,
    pub indexer_args: Vec<String>,
    pub outfile: Option<String>,
}

impl NewIndex {
    /// Build a queued record for one job of a plan
    pub fn queued(repository_id: RepositoryId, commit: &CommitId, job: IndexJob) -> Self {
        Self {
            repository_id,
            commit: commit.clone(),
            state: IndexState::Queued,
            docker_steps: job.steps,
            root: job.root,
            indexer: job.indexer,
            indexer_args: job.indexer_args,
            outfile: job.outfile,
        }
    }
}

/// A dependency package coordinate, e.g. a Go module at a version
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Package {
    pub scheme: String,
    pub name: String,
    pub version: String,
}

impl Package {
    pub fn new(
        scheme: impl Into<String>,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            scheme: scheme.into(),
            name: name.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}@{}", self.scheme, self.name, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_queued_record_takes_job_fields() {
        let job = IndexJob {
            steps: vec![DockerStep {
                root: "web/".to_string(),
                image: "node:12".to_string(),
                commands: vec!["yarn".to_string()],
            }],
            root: "web/".to_string(),
            indexer: "lsif-tsc".to_string(),
            indexer_args: vec!["-p".to_string(), ".".to_string()],
            outfile: Some("lsif.dump".to_string()),
        };

        let record = NewIndex::queued(42, &CommitId::new("c42"), job.clone());

        assert_eq!(record.repository_id, 42);
        assert_eq!(record.commit.as_str(), "c42");
        assert_eq!(record.state, IndexState::Queued);
        assert_eq!(record.docker_steps, job.steps);
        assert_eq!(record.root, "web/");
        assert_eq!(record.outfile.as_deref(), Some("lsif.dump"));
    }

    #[test]
    fn test_index_state_round_trips_through_str() {
        for state in [
            IndexState::Queued,
            IndexState::Processing,
            IndexState::Completed,
            IndexState::Errored,
        ] {
            assert_eq!(state.as_str().parse::<IndexState>().ok(), Some(state));
        }
        assert!("pending".parse::<IndexState>().is_err());
    }

    #[test]
    fn test_commit_short_hash() {
        let commit = CommitId::new("4e7eeb0f8a96c0ffee");
        assert_eq!(commit.short(), "4e7eeb0f");
        assert_eq!(CommitId::new("c42").short(), "c42");
    }
}
