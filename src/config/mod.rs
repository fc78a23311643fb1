//! # Indexer Configuration
//!
//! Environment-style settings recognized by the indexer. Every option is
//! read through [`ConfigManager`], which layers built-in defaults, an optional
//! configuration file and the process environment.
//!
//! The four run-critical options stay optional in [`IndexerSettings`] so a
//! missing value is observable: the orchestration engine validates them on
//! entry and fails fast with a configuration error.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use blob_indexer::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = ConfigManager::load()?;
//! let parallel = settings.blob_amount_parallel;
//! # Ok(())
//! # }
//! ```

pub mod loader;

use crate::constants::defaults;
use crate::error::{IndexerError, Result};
use crate::orchestration::FailurePolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub use loader::ConfigManager;

/// Every recognized setting. Field names are the lower-cased environment
/// variable names (`BLOB_AMOUNT_PARALLEL` → `blob_amount_parallel`).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct IndexerSettings {
    /// Fan-out concurrency and listing page size
    pub blob_amount_parallel: Option<usize>,
    /// Index used when a request does not name one
    pub search_index_name: Option<String>,
    /// Source container, required
    pub blob_container_name: Option<String>,
    /// Per-activity retry ceiling
    pub max_number_of_attempts: Option<u32>,

    #[serde(default = "default_document_retry_interval_ms")]
    pub document_retry_interval_ms: u64,
    #[serde(default = "default_service_retry_interval_ms")]
    pub service_retry_interval_ms: u64,
    #[serde(default)]
    pub failure_policy: FailurePolicy,

    // Reference collaborators
    #[serde(default)]
    pub source_root: Option<PathBuf>,
    #[serde(default = "default_account_name")]
    pub source_storage_account_name: String,
    #[serde(default)]
    pub search_index_root: Option<PathBuf>,
    #[serde(default)]
    pub embedding_endpoint: Option<String>,
    #[serde(default)]
    pub embedding_api_key: Option<String>,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default)]
    pub embedding_dimensions: Option<usize>,

    // Checkpoint store
    #[serde(default)]
    pub checkpoint_dir: Option<PathBuf>,
    #[serde(default)]
    pub database_url: Option<String>,

    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

fn default_document_retry_interval_ms() -> u64 {
    defaults::DOCUMENT_RETRY_INTERVAL_MS
}

fn default_service_retry_interval_ms() -> u64 {
    defaults::SERVICE_RETRY_INTERVAL_MS
}

fn default_account_name() -> String {
    defaults::SOURCE_STORAGE_ACCOUNT_NAME.to_string()
}

fn default_embedding_model() -> String {
    defaults::EMBEDDING_MODEL.to_string()
}

fn default_bind_address() -> String {
    defaults::BIND_ADDRESS.to_string()
}

impl Default for IndexerSettings {
    fn default() -> Self {
        Self {
            blob_amount_parallel: Some(defaults::BLOB_AMOUNT_PARALLEL),
            search_index_name: Some(defaults::SEARCH_INDEX_NAME.to_string()),
            blob_container_name: None,
            max_number_of_attempts: Some(defaults::MAX_NUMBER_OF_ATTEMPTS),
            document_retry_interval_ms: defaults::DOCUMENT_RETRY_INTERVAL_MS,
            service_retry_interval_ms: defaults::SERVICE_RETRY_INTERVAL_MS,
            failure_policy: FailurePolicy::default(),
            source_root: None,
            source_storage_account_name: default_account_name(),
            search_index_root: None,
            embedding_endpoint: None,
            embedding_api_key: None,
            embedding_model: default_embedding_model(),
            embedding_dimensions: None,
            checkpoint_dir: None,
            database_url: None,
            bind_address: default_bind_address(),
        }
    }
}

impl IndexerSettings {
    /// Reject values that are present but unusable. Absent run-critical
    /// values are left for the engine to report when a run starts.
    pub fn validate(&self) -> Result<()> {
        if self.blob_amount_parallel == Some(0) {
            return Err(IndexerError::configuration(
                "BLOB_AMOUNT_PARALLEL must be at least 1",
            ));
        }
        if self.max_number_of_attempts == Some(0) {
            return Err(IndexerError::configuration(
                "MAX_NUMBER_OF_ATTEMPTS must be at least 1",
            ));
        }
        if matches!(&self.blob_container_name, Some(name) if name.trim().is_empty()) {
            return Err(IndexerError::configuration(
                "BLOB_CONTAINER_NAME must not be empty",
            ));
        }
        Ok(())
    }

    pub fn document_retry_interval(&self) -> Duration {
        Duration::from_millis(self.document_retry_interval_ms)
    }

    pub fn service_retry_interval(&self) -> Duration {
        Duration::from_millis(self.service_retry_interval_ms)
    }

    /// Settings with a container, for tests and local runs
    pub fn with_container(container: impl Into<String>) -> Self {
        Self {
            blob_container_name: Some(container.into()),
            ..Self::default()
        }
    }
}
