//! Chooses where a repository's index plan comes from
//!
//! Precedence is explicit stored configuration, then a configuration file
//! committed to the repository, then inference. Only inference is rate
//! limited and capped.

use crate::cancel::cancellable;
use crate::inference;
use crate::limiter::RateLimiter;
use autoindex_core::error::Result;
use autoindex_core::{CommitId, IndexConfiguration, IndexJob, RepositoryId};
use autoindex_storage::DbStore;
use autoindex_vcs::VcsClient;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Where a plan came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanSource {
    /// Configuration stored for the repository
    Explicit,
    /// Configuration file committed to the repository
    Declared,
    /// Inferred from the repository layout
    Inferred,
}

impl fmt::Display for PlanSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Explicit => write!(f, "explicit"),
            Self::Declared => write!(f, "declared"),
            Self::Inferred => write!(f, "inferred"),
        }
    }
}

/// A resolved plan; an empty job list means nothing should be indexed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexPlan {
    pub source: PlanSource,
    pub jobs: Vec<IndexJob>,
}

pub(crate) struct ConfigurationResolver {
    store: Arc<dyn DbStore>,
    vcs: Arc<dyn VcsClient>,
    limiter: Arc<RateLimiter>,
    declared_configuration_path: String,
    max_inferred_jobs: usize,
}

impl ConfigurationResolver {
    pub(crate) fn new(
        store: Arc<dyn DbStore>,
        vcs: Arc<dyn VcsClient>,
        limiter: Arc<RateLimiter>,
        declared_configuration_path: String,
        max_inferred_jobs: usize,
    ) -> Self {
        Self {
            store,
            vcs,
            limiter,
            declared_configuration_path,
            max_inferred_jobs,
        }
    }

    pub(crate) async fn resolve(
        &self,
        cancel: &CancellationToken,
        repository_id: RepositoryId,
        commit: &CommitId,
    ) -> Result<IndexPlan> {
        let stored = cancellable(
            cancel,
            self.store
                .get_index_configuration_by_repository_id(repository_id),
        )
        .await?;
        if let Some(stored) = stored {
            debug!("Using stored index configuration {} for repository {repository_id}", stored.id);
            let config = IndexConfiguration::decode(&stored.data)?;
            return Ok(IndexPlan {
                source: PlanSource::Explicit,
                jobs: config.into_index_jobs(),
            });
        }

        let path = self.declared_configuration_path.as_str();
        if cancellable(cancel, self.vcs.file_exists(repository_id, commit, path)).await? {
            debug!("Using {path} from repository {repository_id} at {}", commit.short());
            let data = cancellable(cancel, self.vcs.read_file(repository_id, commit, path)).await?;
            let config = IndexConfiguration::decode(&data)?;
            return Ok(IndexPlan {
                source: PlanSource::Declared,
                jobs: config.into_index_jobs(),
            });
        }

        let jobs = self.infer(cancel, repository_id, commit).await?;
        if jobs.len() > self.max_inferred_jobs {
            info!(
                "Discarding {} inferred index jobs for repository {repository_id} (limit {})",
                jobs.len(),
                self.max_inferred_jobs
            );
            return Ok(IndexPlan {
                source: PlanSource::Inferred,
                jobs: Vec::new(),
            });
        }

        Ok(IndexPlan {
            source: PlanSource::Inferred,
            jobs,
        })
    }

    /// Inference behind the shared rate limiter, without the job cap
    pub(crate) async fn infer(
        &self,
        cancel: &CancellationToken,
        repository_id: RepositoryId,
        commit: &CommitId,
    ) -> Result<Vec<IndexJob>> {
        self.limiter.acquire(cancel).await?;
        inference::infer_index_jobs(self.vcs.as_ref(), cancel, repository_id, commit).await
    }
}
