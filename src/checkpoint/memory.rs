use super::CheckpointStore;
use crate::error::{IndexerError, Result};
use crate::models::{RunSummary, WorkflowCheckpoint};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Process-local checkpoint store
#[derive(Debug, Clone, Default)]
pub struct MemoryCheckpointStore {
    runs: Arc<RwLock<HashMap<Uuid, WorkflowCheckpoint>>>,
    saves: Arc<RwLock<u64>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `save` calls so far
    pub fn save_count(&self) -> u64 {
        *self.saves.read()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(&self, run_id: Uuid) -> Result<Option<WorkflowCheckpoint>> {
        Ok(self.runs.read().get(&run_id).cloned())
    }

    async fn save(&self, checkpoint: &WorkflowCheckpoint) -> Result<()> {
        self.runs
            .write()
            .insert(checkpoint.run_id, checkpoint.clone());
        *self.saves.write() += 1;
        Ok(())
    }

    async fn record_document(&self, run_id: Uuid, ledger_key: &str) -> Result<()> {
        let mut runs = self.runs.write();
        let checkpoint = runs
            .get_mut(&run_id)
            .ok_or_else(|| IndexerError::checkpoint(format!("unknown run {run_id}")))?;
        checkpoint.completed_documents.insert(ledger_key.to_string());
        checkpoint.touch();
        Ok(())
    }

    async fn list_runs(&self) -> Result<Vec<RunSummary>> {
        let runs = self.runs.read();
        let mut checkpoints: Vec<&WorkflowCheckpoint> = runs.values().collect();
        checkpoints.sort_by_key(|c| c.created_at);
        Ok(checkpoints.into_iter().map(RunSummary::from).collect())
    }
}
