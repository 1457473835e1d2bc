//! Index configuration documents
//!
//! A repository's index configuration is either stored explicitly (managed
//! outside this crate) or declared in a file committed to the repository.
//! Both are accepted in two dialects that decode to the same schema:
//!
//! - JSON tolerating `//` comments and trailing commas
//! - YAML
//!
//! ```yaml
//! shared_steps:
//!   - root: /
//!     image: node:12
//!     commands:
//!       - yarn install --frozen-lockfile --non-interactive
//! index_jobs:
//!   - root: web/
//!     indexer: lsif-tsc
//!     indexer_args: ['-p', '.']
//!     outfile: lsif.dump
//! ```

use crate::error::{Error, Result};
use crate::index::{DockerStep, IndexJob, RepositoryId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw configuration row as held by the persistence collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredIndexConfiguration {
    pub id: i64,
    pub repository_id: RepositoryId,
    pub data: Vec<u8>,
}

/// Serialization dialect of a configuration document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigurationFormat {
    Json,
    Yaml,
}

impl ConfigurationFormat {
    /// Guess the dialect from a file name, if the extension says
    pub fn from_path(path: &str) -> Option<Self> {
        let lower = path.to_ascii_lowercase();
        if lower.ends_with(".json") || lower.ends_with(".jsonc") {
            Some(Self::Json)
        } else if lower.ends_with(".yaml") || lower.ends_with(".yml") {
            Some(Self::Yaml)
        } else {
            None
        }
    }
}

impl fmt::Display for ConfigurationFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => write!(f, "JSON"),
            Self::Yaml => write!(f, "YAML"),
        }
    }
}

/// One entry of `index_jobs`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexJobSpec {
    #[serde(default)]
    pub root: String,
    #[serde(default)]
    pub steps: Vec<DockerStep>,
    pub indexer: String,
    #[serde(default)]
    pub indexer_args: Vec<String>,
    #[serde(default)]
    pub outfile: Option<String>,
}

/// Decoded index configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexConfiguration {
    #[serde(default)]
    pub shared_steps: Vec<DockerStep>,
    #[serde(default)]
    pub index_jobs: Vec<IndexJobSpec>,
}

impl IndexConfiguration {
    /// Decode the comment-tolerant JSON dialect
    pub fn from_json(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|e| Error::decode(format!("configuration is not UTF-8: {e}")))?;
        json5::from_str(text).map_err(|e| Error::decode(format!("invalid JSON: {e}")))
    }

    /// Decode the YAML dialect
    ///
    /// A document with no content (blank, comments only, or an explicit
    /// null) is rejected instead of decoding to an empty configuration.
    pub fn from_yaml(data: &[u8]) -> Result<Self> {
        let value: serde_yaml::Value = serde_yaml::from_slice(data)
            .map_err(|e| Error::decode(format!("invalid YAML: {e}")))?;
        if value.is_null() {
            return Err(Error::decode("invalid YAML: empty document"));
        }
        serde_yaml::from_value(value).map_err(|e| Error::decode(format!("invalid YAML: {e}")))
    }

    /// Decode a document in a known dialect
    pub fn decode_as(data: &[u8], format: ConfigurationFormat) -> Result<Self> {
        match format {
            ConfigurationFormat::Json => Self::from_json(data),
            ConfigurationFormat::Yaml => Self::from_yaml(data),
        }
    }

    /// Decode a document of unknown dialect, trying JSON and then YAML
    ///
    /// JSON goes first because a commented JSON document is never valid
    /// YAML, while plain JSON would also be accepted by the YAML decoder
    /// with worse error messages.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let json_err = match Self::from_json(data) {
            Ok(config) => return Ok(config),
            Err(e) => e,
        };

        Self::from_yaml(data).map_err(|yaml_err| {
            Error::decode(format!(
                "not a JSON or YAML index configuration ({json_err}; {yaml_err})"
            ))
        })
    }

    /// Expand into index job plans
    ///
    /// Every job's step list is the shared steps followed by its own steps.
    pub fn into_index_jobs(self) -> Vec<IndexJob> {
        let shared_steps = self.shared_steps;

        self.index_jobs
            .into_iter()
            .map(|spec| {
                let mut steps = Vec::with_capacity(shared_steps.len() + spec.steps.len());
                steps.extend(shared_steps.iter().cloned());
                steps.extend(spec.steps);

                IndexJob {
                    steps,
                    root: spec.root,
                    indexer: spec.indexer,
                    indexer_args: spec.indexer_args,
                    outfile: spec.outfile.filter(|outfile| !outfile.is_empty()),
                }
            })
            .collect()
    }
}
