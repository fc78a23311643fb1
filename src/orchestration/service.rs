//! Run lifecycle on top of the engine: start runs in the background, resume
//! them by id, report their checkpoints and cancel them.

use super::engine::{IndexRequest, OrchestrationEngine, RunParameters};
use crate::checkpoint::CheckpointStore;
use crate::constants::operations;
use crate::error::{IndexerError, Result};
use crate::models::{RunStatus, RunSummary, WorkflowCheckpoint};
use crate::resilience::CancellationSignal;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};
use uuid::Uuid;

/// Runs in progress in this process. A background run removes its own
/// entries when its task ends.
pub struct IndexingService {
    engine: Arc<OrchestrationEngine>,
    signals: Arc<DashMap<Uuid, CancellationSignal>>,
    tasks: Arc<DashMap<Uuid, JoinHandle<Result<RunSummary>>>>,
}

impl IndexingService {
    pub fn new(engine: OrchestrationEngine) -> Self {
        Self {
            engine: Arc::new(engine),
            signals: Arc::new(DashMap::new()),
            tasks: Arc::new(DashMap::new()),
        }
    }

    pub fn engine(&self) -> &OrchestrationEngine {
        &self.engine
    }

    fn store(&self) -> &Arc<dyn CheckpointStore> {
        self.engine.store()
    }

    /// Validate `request` and start a new run in the background.
    ///
    /// Configuration problems are reported here, before any run id is handed
    /// out or any collaborator is called.
    pub fn start_index(&self, request: IndexRequest) -> Result<Uuid> {
        RunParameters::resolve(request.index_name.as_deref(), self.engine.settings())?;
        let run_id = Uuid::new_v4();
        self.spawn(run_id, request);
        Ok(run_id)
    }

    /// Resume a run that stopped before completing
    pub async fn resume(&self, run_id: Uuid) -> Result<Uuid> {
        let checkpoint = self.status(run_id).await?;
        if self.is_active(run_id) {
            return Err(IndexerError::configuration(format!(
                "run {run_id} is already in progress"
            )));
        }
        if checkpoint.status == RunStatus::Completed {
            info!(%run_id, "Run already completed, not resuming");
            return Ok(run_id);
        }

        let request = IndexRequest::new(Vec::new(), Some(checkpoint.index_name));
        RunParameters::resolve(request.index_name.as_deref(), self.engine.settings())?;
        self.spawn(run_id, request);
        Ok(run_id)
    }

    pub async fn status(&self, run_id: Uuid) -> Result<WorkflowCheckpoint> {
        self.store()
            .load(run_id)
            .await?
            .ok_or_else(|| IndexerError::NotFound(format!("run {run_id}")))
    }

    /// Signal cancellation. Returns `false` when the run is not in progress
    /// in this process.
    pub async fn cancel(&self, run_id: Uuid) -> Result<bool> {
        if let Some(signal) = self.signals.get(&run_id) {
            signal.cancel();
            info!(%run_id, "Cancellation requested");
            return Ok(true);
        }
        self.status(run_id).await?;
        Ok(false)
    }

    /// Whether a background task for `run_id` is still running
    pub fn is_active(&self, run_id: Uuid) -> bool {
        self.tasks
            .get(&run_id)
            .map(|task| !task.is_finished())
            .unwrap_or(false)
    }

    /// Number of runs with a live background task or cancellation signal
    pub fn tracked_runs(&self) -> usize {
        self.tasks.len().max(self.signals.len())
    }

    /// Wait for a background run and return its result.
    ///
    /// A run whose task already ended is answered from its checkpoint.
    pub async fn join(&self, run_id: Uuid) -> Result<RunSummary> {
        let Some((_, handle)) = self.tasks.remove(&run_id) else {
            return self.finished_summary(run_id).await;
        };

        handle.await.map_err(|join_err| {
            IndexerError::service(operations::INDEX, format!("run task panicked: {join_err}"))
        })?
    }

    async fn finished_summary(&self, run_id: Uuid) -> Result<RunSummary> {
        let checkpoint = self.status(run_id).await?;
        match checkpoint.status {
            RunStatus::Completed => Ok(RunSummary::from(&checkpoint)),
            RunStatus::Cancelled => Err(IndexerError::Cancelled(
                checkpoint.last_error.unwrap_or_else(|| format!("run {run_id}")),
            )),
            status => Err(IndexerError::service(
                operations::INDEX,
                checkpoint
                    .last_error
                    .unwrap_or_else(|| format!("run {run_id} stopped while {status:?}")),
            )),
        }
    }

    /// Run a new request in the current task under `run_id`, used by the CLI
    pub async fn run_to_completion(&self, run_id: Uuid, request: IndexRequest) -> Result<RunSummary> {
        self.run_inline(run_id, request).await
    }

    /// Stored runs, oldest first
    pub async fn list_runs(&self) -> Result<Vec<RunSummary>> {
        self.store().list_runs().await
    }

    /// Resume `run_id` in the current task
    pub async fn resume_to_completion(&self, run_id: Uuid) -> Result<RunSummary> {
        let checkpoint = self.status(run_id).await?;
        let request = IndexRequest::new(Vec::new(), Some(checkpoint.index_name));
        self.run_inline(run_id, request).await
    }

    async fn run_inline(&self, run_id: Uuid, request: IndexRequest) -> Result<RunSummary> {
        let signal = CancellationSignal::new();
        self.signals.insert(run_id, signal.clone());
        let result = self.engine.run(run_id, &request, signal).await;
        self.signals.remove(&run_id);
        result
    }

    fn spawn(&self, run_id: Uuid, request: IndexRequest) {
        let signal = CancellationSignal::new();
        self.signals.insert(run_id, signal.clone());

        let engine = self.engine.clone();
        let tasks = self.tasks.clone();
        let signals = self.signals.clone();
        let (registered, wait_registered) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            // Removal below must follow the insert of this task's handle
            let _ = wait_registered.await;
            let result = engine.run(run_id, &request, signal).await;
            if let Err(err) = &result {
                error!(%run_id, error = %err, "Indexing run stopped");
            }
            tasks.remove(&run_id);
            signals.remove(&run_id);
            result
        });
        self.tasks.insert(run_id, handle);
        let _ = registered.send(());
    }
}
