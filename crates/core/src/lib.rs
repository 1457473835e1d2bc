//! Core types for the autoindex job enqueuer
//!
//! This crate provides the foundational abstractions shared by the storage,
//! VCS and enqueuer crates:
//!
//! - **Index plans and records**: `IndexJob`, `NewIndex`, `DockerStep`
//! - **Index configuration**: decoding of JSON-with-comments and YAML documents
//! - **Configuration**: process configuration management
//! - **Error handling**: Unified error types
//!

#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

pub mod config;
pub mod error;
pub mod index;
pub mod index_configuration;

// Re-export main types for convenience
pub use config::{Config, EnqueuerConfig, StorageConfig, VcsConfig};
pub use error::{Error, Result, ResultExt};
pub use index::{CommitId, DockerStep, IndexJob, IndexState, NewIndex, Package, RepositoryId};
pub use index_configuration::{
    ConfigurationFormat, IndexConfiguration, IndexJobSpec, StoredIndexConfiguration,
};

/// Version of the core library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
