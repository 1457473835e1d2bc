//! Auto-indexing enqueuer CLI
//!
//! Wires configuration, PostgreSQL and local git clones into the enqueuer.

#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

use anyhow::{Context, Result};
use autoindex_core::config::global_config_path;
use autoindex_core::{Config, ConfigurationFormat, IndexConfiguration, Package, RepositoryId};
use autoindex_enqueuer::{CancellationToken, IndexEnqueuer};
use autoindex_storage::{create_postgres_store, PostgresStore, RepositoryRegistry};
use autoindex_vcs::{LocalGitClient, LocalRepoUpdater, RepoUpdaterClient, VcsClient};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "autoindex")]
#[command(about = "Queue code-intelligence index jobs for repositories")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Apply database migrations
    Migrate,
    /// Queue index jobs for a repository
    Repository {
        /// Repository name, e.g. github.com/owner/repo
        name: String,
        /// Revision to index
        #[arg(long, default_value = "HEAD")]
        rev: String,
        /// Use the existing clone without fetching
        #[arg(long)]
        no_fetch: bool,
    },
    /// Queue index jobs for the repository hosting a dependency package
    Package {
        /// Package scheme, e.g. gomod
        scheme: String,
        /// Package name, e.g. https://github.com/owner/repo
        name: String,
        /// Package version or pseudo-version
        version: String,
    },
    /// Queue index jobs for every repository with stored configuration
    Sweep,
    /// Print the jobs inferred for a repository without queueing them
    Infer {
        name: String,
        #[arg(long, default_value = "HEAD")]
        rev: String,
    },
    /// Store explicit index configuration for a repository
    SetConfiguration {
        name: String,
        /// JSON or YAML configuration file
        file: PathBuf,
    },
    /// List index records of a repository
    Indexes { name: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose)?;

    match cli.command {
        Commands::InitConfig { force } => init_config(cli.config.as_deref(), force),
        command => {
            let config = Config::load(cli.config.as_deref())?;
            config.validate()?;
            let app = App::connect(&config).await?;
            app.run(command).await
        }
    }
}

/// Initialize logging system
fn init_logging(verbose: bool) -> Result<()> {
    let level = if verbose { "debug" } else { "info" };

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "autoindex={level},autoindex_core={level},autoindex_storage={level},\
             autoindex_vcs={level},autoindex_enqueuer={level}"
        ))
        .init();

    Ok(())
}

fn init_config(path: Option<&Path>, force: bool) -> Result<()> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => global_config_path()?,
    };
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists; pass --force to overwrite it",
            path.display()
        );
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create config directory")?;
    }

    Config::default().save(&path)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

/// Cancel the returned token on Ctrl-C
fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            trigger.cancel();
        }
    });
    token
}

struct App {
    store: Arc<PostgresStore>,
    vcs: Arc<LocalGitClient>,
    repo_updater: Arc<LocalRepoUpdater>,
    enqueuer: IndexEnqueuer,
}

impl App {
    async fn connect(config: &Config) -> Result<Self> {
        let store = create_postgres_store(&config.storage)
            .await
            .context("Failed to connect to Postgres")?;
        store
            .run_migrations()
            .await
            .context("Failed to run database migrations")?;

        let registry: Arc<dyn RepositoryRegistry> = store.clone();
        let vcs = Arc::new(LocalGitClient::new(&config.vcs.repos_dir, Arc::clone(&registry)));
        let repo_updater = Arc::new(LocalRepoUpdater::new(
            &config.vcs.repos_dir,
            config.vcs.clone_url_prefix.clone(),
            registry,
        ));
        let enqueuer = IndexEnqueuer::new(store.clone(), vcs.clone(), &config.enqueuer)?
            .with_repo_updater(repo_updater.clone());

        Ok(Self {
            store,
            vcs,
            repo_updater,
            enqueuer,
        })
    }

    async fn run(&self, command: Commands) -> Result<()> {
        let cancel = shutdown_token();

        match command {
            // Handled before connecting
            Commands::InitConfig { .. } => Ok(()),
            Commands::Migrate => {
                info!("Database migrations completed");
                Ok(())
            }
            Commands::Repository {
                name,
                rev,
                no_fetch,
            } => {
                let repository_id = self.repository_id(&name, !no_fetch).await?;
                let outcome = self
                    .enqueuer
                    .queue_indexes_for_repository_at(&cancel, repository_id, &rev)
                    .await?;
                println!("{name}: {outcome}");
                Ok(())
            }
            Commands::Package {
                scheme,
                name,
                version,
            } => {
                let package = Package::new(scheme, name, version);
                let outcome = self
                    .enqueuer
                    .queue_indexes_for_package(&cancel, &package)
                    .await?;
                println!("{package}: {outcome}");
                Ok(())
            }
            Commands::Sweep => {
                let stats = self
                    .enqueuer
                    .queue_indexes_for_configured_repositories(&cancel)
                    .await?;
                println!(
                    "{} repositories: {} queued, {} skipped, {} failed",
                    stats.repositories, stats.queued, stats.skipped, stats.failed
                );
                Ok(())
            }
            Commands::Infer { name, rev } => {
                let repository_id = self.repository_id(&name, false).await?;
                let commit = self.vcs.resolve_revision(repository_id, &rev).await?;
                let jobs = self
                    .enqueuer
                    .infer_index_jobs(&cancel, repository_id, &commit)
                    .await?;
                println!("{}", serde_json::to_string_pretty(&jobs)?);
                Ok(())
            }
            Commands::SetConfiguration { name, file } => {
                let data = std::fs::read(&file)
                    .with_context(|| format!("Failed to read {}", file.display()))?;
                let config = match ConfigurationFormat::from_path(&file.to_string_lossy()) {
                    Some(format) => IndexConfiguration::decode_as(&data, format)?,
                    None => IndexConfiguration::decode(&data)?,
                };

                let repository_id = self.store.ensure_repository(&name).await?;
                self.store
                    .set_index_configuration(repository_id, &data)
                    .await?;
                println!(
                    "Stored configuration with {} index job(s) for {name}",
                    config.index_jobs.len()
                );
                Ok(())
            }
            Commands::Indexes { name } => {
                let repository_id = self.store.ensure_repository(&name).await?;
                for index in self.store.get_indexes(repository_id).await? {
                    println!(
                        "{}\t{}\t{}\t{}\t{}",
                        index.id,
                        index.commit.short(),
                        index.state,
                        if index.root.is_empty() { "." } else { index.root.as_str() },
                        index.indexer
                    );
                }
                Ok(())
            }
        }
    }

    /// Look up a repository id, cloning or fetching first when asked
    async fn repository_id(&self, name: &str, fetch: bool) -> Result<RepositoryId> {
        if fetch {
            return Ok(self.repo_updater.ensure_repository_updated(name).await?);
        }
        Ok(self.store.ensure_repository(name).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_package() {
        let cli = Cli::try_parse_from([
            "autoindex",
            "package",
            "gomod",
            "https://github.com/foo/bar",
            "v1.0.0-abcdef123456",
        ])
        .unwrap();
        match cli.command {
            Commands::Package {
                scheme,
                name,
                version,
            } => {
                assert_eq!(scheme, "gomod");
                assert_eq!(name, "https://github.com/foo/bar");
                assert_eq!(version, "v1.0.0-abcdef123456");
            }
            _ => panic!("expected package command"),
        }
    }

    #[test]
    fn test_parse_repository_defaults_to_head() {
        let cli = Cli::try_parse_from(["autoindex", "-v", "repository", "github.com/foo/bar"]).unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Repository { name, rev, no_fetch } => {
                assert_eq!(name, "github.com/foo/bar");
                assert_eq!(rev, "HEAD");
                assert!(!no_fetch);
            }
            _ => panic!("expected repository command"),
        }
    }
}
