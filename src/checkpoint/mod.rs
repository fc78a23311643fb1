//! # Checkpoint Store
//!
//! Durable progress of indexing runs. The engine saves a
//! [`WorkflowCheckpoint`] after every committed page and records each
//! completed document in the in-flight ledger as soon as it joins, so a
//! restarted run neither reprocesses committed work nor loses uncommitted
//! pages.
//!
//! Backends:
//! - [`MemoryCheckpointStore`] for tests and single-process runs
//! - [`FileCheckpointStore`], one JSON file per run written atomically
//! - [`PostgresCheckpointStore`], one row per run

pub mod file;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

use crate::error::Result;
use crate::models::{RunSummary, WorkflowCheckpoint};
use async_trait::async_trait;
use uuid::Uuid;

pub use file::FileCheckpointStore;
pub use memory::MemoryCheckpointStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresCheckpointStore;

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Latest checkpoint of a run, `None` if the run is unknown
    async fn load(&self, run_id: Uuid) -> Result<Option<WorkflowCheckpoint>>;

    /// Replace the stored checkpoint of `checkpoint.run_id`
    async fn save(&self, checkpoint: &WorkflowCheckpoint) -> Result<()>;

    /// Add one document to the in-flight ledger of an existing run
    async fn record_document(&self, run_id: Uuid, ledger_key: &str) -> Result<()>;

    /// Summaries of every stored run, oldest first
    async fn list_runs(&self) -> Result<Vec<RunSummary>>;
}
