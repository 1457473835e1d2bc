//! Enqueue entry points and the transactional enqueue
//!
//! Every entry point resolves a commit, then a plan, and only then opens a
//! transaction. Within it the commit is checked, claimed and its jobs are
//! inserted in plan order; [`finish`] commits or rolls back.

use crate::cancel::cancellable;
use crate::limiter::RateLimiter;
use crate::package::infer_repository_and_revision;
use crate::resolver::{ConfigurationResolver, IndexPlan, PlanSource};
use autoindex_core::error::{Error, Result};
use autoindex_core::{CommitId, EnqueuerConfig, IndexJob, NewIndex, Package, RepositoryId};
use autoindex_storage::{finish, DbStore, DbTransaction};
use autoindex_vcs::{RepoUpdaterClient, VcsClient};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Revision resolved when no explicit revision is given
const DEFAULT_REVISION: &str = "HEAD";

/// Result of one enqueue call that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueOutcome {
    /// New index records were inserted, in plan order
    Queued {
        commit: CommitId,
        source: PlanSource,
        ids: Vec<i64>,
    },
    /// Work was already recorded for the commit; nothing was inserted
    AlreadyQueued { commit: CommitId },
    /// The plan was empty or discarded by the job cap
    NoIndexJobs { commit: CommitId },
    /// The package coordinate does not map to a repository
    UnsupportedPackage,
}

impl QueueOutcome {
    pub fn queued_count(&self) -> usize {
        match self {
            Self::Queued { ids, .. } => ids.len(),
            _ => 0,
        }
    }
}

impl fmt::Display for QueueOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued {
                commit,
                source,
                ids,
            } => write!(
                f,
                "queued {} index job(s) at {} from {source} configuration",
                ids.len(),
                commit.short()
            ),
            Self::AlreadyQueued { commit } => write!(f, "already queued at {}", commit.short()),
            Self::NoIndexJobs { commit } => write!(f, "nothing to index at {}", commit.short()),
            Self::UnsupportedPackage => write!(f, "unsupported package"),
        }
    }
}

/// Totals for a sweep over configured repositories
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub repositories: usize,
    pub queued: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Resolves index plans and records them as queued index jobs
pub struct IndexEnqueuer {
    store: Arc<dyn DbStore>,
    vcs: Arc<dyn VcsClient>,
    repo_updater: Option<Arc<dyn RepoUpdaterClient>>,
    resolver: ConfigurationResolver,
}

impl IndexEnqueuer {
    /// Create an enqueuer with its own rate limiter built from `config`
    pub fn new(
        store: Arc<dyn DbStore>,
        vcs: Arc<dyn VcsClient>,
        config: &EnqueuerConfig,
    ) -> Result<Self> {
        let limiter = RateLimiter::new(config.max_repositories_inspected_per_second)?;
        Ok(Self::with_rate_limiter(store, vcs, config, Arc::new(limiter)))
    }

    /// Create an enqueuer sharing an existing rate limiter
    pub fn with_rate_limiter(
        store: Arc<dyn DbStore>,
        vcs: Arc<dyn VcsClient>,
        config: &EnqueuerConfig,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        let resolver = ConfigurationResolver::new(
            Arc::clone(&store),
            Arc::clone(&vcs),
            limiter,
            config.declared_configuration_path.clone(),
            config.max_index_jobs_per_inferred_configuration,
        );
        Self {
            store,
            vcs,
            repo_updater: None,
            resolver,
        }
    }

    /// Enable [`Self::queue_indexes_for_package`]
    pub fn with_repo_updater(mut self, repo_updater: Arc<dyn RepoUpdaterClient>) -> Self {
        self.repo_updater = Some(repo_updater);
        self
    }

    /// Queue index jobs for the current `HEAD` of a repository
    pub async fn queue_indexes_for_repository(
        &self,
        cancel: &CancellationToken,
        repository_id: RepositoryId,
    ) -> Result<QueueOutcome> {
        self.queue_indexes_for_repository_at(cancel, repository_id, DEFAULT_REVISION)
            .await
    }

    /// Queue index jobs for a repository at any revision the VCS can resolve
    pub async fn queue_indexes_for_repository_at(
        &self,
        cancel: &CancellationToken,
        repository_id: RepositoryId,
        revision: &str,
    ) -> Result<QueueOutcome> {
        let commit = cancellable(cancel, self.vcs.resolve_revision(repository_id, revision)).await?;
        self.queue_indexes_for_commit(cancel, repository_id, commit)
            .await
    }

    /// Queue index jobs for the repository that hosts a dependency package
    pub async fn queue_indexes_for_package(
        &self,
        cancel: &CancellationToken,
        package: &Package,
    ) -> Result<QueueOutcome> {
        let Some((repository_name, revision)) = infer_repository_and_revision(package) else {
            debug!("No repository known for package {package}");
            return Ok(QueueOutcome::UnsupportedPackage);
        };

        let repo_updater = self
            .repo_updater
            .as_ref()
            .ok_or_else(|| Error::config("no repository updater configured"))?;
        let repository_id = cancellable(
            cancel,
            repo_updater.ensure_repository_updated(&repository_name),
        )
        .await?;

        debug!("Package {package} maps to {repository_name} ({repository_id}) at {revision}");
        self.queue_indexes_for_repository_at(cancel, repository_id, &revision)
            .await
    }

    /// Queue index jobs for every repository with stored configuration
    ///
    /// A failing repository is logged and counted; the sweep moves on.
    /// Cancellation ends the sweep with an error.
    pub async fn queue_indexes_for_configured_repositories(
        &self,
        cancel: &CancellationToken,
    ) -> Result<SweepStats> {
        let repository_ids = cancellable(
            cancel,
            self.store.get_repositories_with_index_configuration(),
        )
        .await?;

        let mut stats = SweepStats {
            repositories: repository_ids.len(),
            ..SweepStats::default()
        };
        for repository_id in repository_ids {
            match self.queue_indexes_for_repository(cancel, repository_id).await {
                Ok(QueueOutcome::Queued { .. }) => stats.queued += 1,
                Ok(_) => stats.skipped += 1,
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    warn!("Failed to queue indexes for repository {repository_id}: {e}");
                    stats.failed += 1;
                }
            }
        }

        info!(
            "Sweep finished: {} repositories, {} queued, {} skipped, {} failed",
            stats.repositories, stats.queued, stats.skipped, stats.failed
        );
        Ok(stats)
    }

    /// Preview the inferred plan for a commit without queueing anything
    ///
    /// Subject to the rate limiter but not to the job cap.
    pub async fn infer_index_jobs(
        &self,
        cancel: &CancellationToken,
        repository_id: RepositoryId,
        commit: &CommitId,
    ) -> Result<Vec<IndexJob>> {
        self.resolver.infer(cancel, repository_id, commit).await
    }

    /// Resolve the plan for a commit without queueing anything
    pub async fn resolve_index_plan(
        &self,
        cancel: &CancellationToken,
        repository_id: RepositoryId,
        commit: &CommitId,
    ) -> Result<IndexPlan> {
        self.resolver.resolve(cancel, repository_id, commit).await
    }

    async fn queue_indexes_for_commit(
        &self,
        cancel: &CancellationToken,
        repository_id: RepositoryId,
        commit: CommitId,
    ) -> Result<QueueOutcome> {
        let plan = self.resolver.resolve(cancel, repository_id, &commit).await?;
        if plan.jobs.is_empty() {
            debug!(
                "No {} index jobs for repository {repository_id} at {}",
                plan.source,
                commit.short()
            );
            return Ok(QueueOutcome::NoIndexJobs { commit });
        }

        let mut tx = cancellable(cancel, self.store.transact()).await?;
        let result = enqueue_plan(tx.as_mut(), cancel, repository_id, commit, plan).await;
        let outcome = finish(tx, result).await?;

        if let QueueOutcome::Queued { commit, ids, source } = &outcome {
            info!(
                "Queued {} index job(s) for repository {repository_id} at {} from {source} configuration",
                ids.len(),
                commit.short()
            );
        }
        Ok(outcome)
    }
}

/// Dedup check, commit claim and inserts, run inside one transaction
async fn enqueue_plan(
    tx: &mut dyn DbTransaction,
    cancel: &CancellationToken,
    repository_id: RepositoryId,
    commit: CommitId,
    plan: IndexPlan,
) -> Result<QueueOutcome> {
    if cancellable(cancel, tx.is_queued(repository_id, &commit)).await? {
        debug!(
            "Repository {repository_id} already has index work at {}",
            commit.short()
        );
        return Ok(QueueOutcome::AlreadyQueued { commit });
    }

    cancellable(cancel, tx.claim_commit(repository_id, &commit)).await?;

    let mut ids = Vec::with_capacity(plan.jobs.len());
    for job in plan.jobs {
        let index = NewIndex::queued(repository_id, &commit, job);
        ids.push(cancellable(cancel, tx.insert_index(&index)).await?);
    }

    Ok(QueueOutcome::Queued {
        commit,
        source: plan.source,
        ids,
    })
}
