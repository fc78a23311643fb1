use super::CheckpointStore;
use crate::error::{IndexerError, Result};
use crate::models::{RunSummary, WorkflowCheckpoint};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

/// One `{run_id}.json` file per run under a directory.
///
/// Writes go to a temporary file that is then renamed over the previous
/// checkpoint, so a crash mid-write leaves the last complete checkpoint.
#[derive(Debug)]
pub struct FileCheckpointStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileCheckpointStore {
    /// Open (creating if needed) a checkpoint directory
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, run_id: Uuid) -> PathBuf {
        self.dir.join(format!("{run_id}.json"))
    }

    async fn read(&self, path: &Path) -> Result<Option<WorkflowCheckpoint>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map(Some).map_err(|e| {
                IndexerError::checkpoint(format!("corrupt checkpoint {}: {e}", path.display()))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, checkpoint: &WorkflowCheckpoint) -> Result<()> {
        let path = self.path_for(checkpoint.run_id);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(checkpoint)?).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(
            run_id = %checkpoint.run_id,
            pages = checkpoint.completed_pages,
            "Checkpoint written to {}",
            path.display()
        );
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn load(&self, run_id: Uuid) -> Result<Option<WorkflowCheckpoint>> {
        self.read(&self.path_for(run_id)).await
    }

    async fn save(&self, checkpoint: &WorkflowCheckpoint) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.write(checkpoint).await
    }

    async fn record_document(&self, run_id: Uuid, ledger_key: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut checkpoint = self
            .load(run_id)
            .await?
            .ok_or_else(|| IndexerError::checkpoint(format!("unknown run {run_id}")))?;
        checkpoint.completed_documents.insert(ledger_key.to_string());
        checkpoint.touch();
        self.write(&checkpoint).await
    }

    async fn list_runs(&self) -> Result<Vec<RunSummary>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut checkpoints = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().map_or(false, |ext| ext == "json") {
                if let Some(checkpoint) = self.read(&path).await? {
                    checkpoints.push(checkpoint);
                }
            }
        }
        checkpoints.sort_by_key(|c| c.created_at);
        Ok(checkpoints.iter().map(RunSummary::from).collect())
    }
}
