//! # Orchestration Engine
//!
//! Top-level driver of one indexing run:
//! `Init → EnsureIndex → Paginate → FanOut → Join → (Paginate | Done)`.
//!
//! The engine is the only writer of the run's checkpoint. It saves after
//! every joined page and re-derives all of its state from the checkpoint on
//! restart, so re-running a run id replays the same listing calls from the
//! last committed cursor.

use super::document_pipeline::DocumentPipeline;
use super::fan_out::{FailurePolicy, FanOutController};
use super::pagination::PaginationCursor;
use crate::checkpoint::CheckpointStore;
use crate::config::IndexerSettings;
use crate::constants::{operations, settings as setting_names};
use crate::error::{IndexerError, Result};
use crate::events::{EventPublisher, IndexingEvent};
use crate::logging::{log_error, log_run_operation};
use crate::models::{Cursor, RunStatus, RunSummary, WorkflowCheckpoint};
use crate::resilience::{CancellationSignal, RetryExecutor, RetryPolicy};
use crate::services::Collaborators;
use crate::state_machine::{RunEvent, RunStateMachine};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Body of an index request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRequest {
    /// Name prefixes to enumerate; empty means every blob
    #[serde(default)]
    pub prefix_list: Vec<String>,
    /// Target index, `SEARCH_INDEX_NAME` when absent
    #[serde(default)]
    pub index_name: Option<String>,
}

impl IndexRequest {
    pub fn new(prefix_list: Vec<String>, index_name: Option<String>) -> Self {
        Self {
            prefix_list,
            index_name,
        }
    }
}

/// Validated, immutable parameters of one run
#[derive(Debug, Clone, PartialEq)]
pub struct RunParameters {
    pub container_name: String,
    pub index_name: String,
    pub concurrency_limit: usize,
    pub document_retry: RetryPolicy,
    pub service_retry: RetryPolicy,
    pub failure_policy: FailurePolicy,
}

impl RunParameters {
    /// Resolve run parameters, failing on any missing required setting
    pub fn resolve(requested_index: Option<&str>, settings: &IndexerSettings) -> Result<Self> {
        let container_name = settings
            .blob_container_name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| missing(setting_names::BLOB_CONTAINER_NAME))?;

        let index_name = requested_index
            .map(str::to_string)
            .or_else(|| settings.search_index_name.clone())
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| missing(setting_names::SEARCH_INDEX_NAME))?;

        let concurrency_limit = settings
            .blob_amount_parallel
            .ok_or_else(|| missing(setting_names::BLOB_AMOUNT_PARALLEL))?;
        if concurrency_limit == 0 {
            return Err(IndexerError::configuration(format!(
                "{} must be at least 1",
                setting_names::BLOB_AMOUNT_PARALLEL
            )));
        }

        let max_attempts = settings
            .max_number_of_attempts
            .ok_or_else(|| missing(setting_names::MAX_NUMBER_OF_ATTEMPTS))?;

        Ok(Self {
            container_name,
            index_name,
            concurrency_limit,
            document_retry: RetryPolicy::new(settings.document_retry_interval(), max_attempts)?,
            service_retry: RetryPolicy::new(settings.service_retry_interval(), max_attempts)?,
            failure_policy: settings.failure_policy,
        })
    }
}

fn missing(name: &str) -> IndexerError {
    IndexerError::configuration(format!("{name} is required"))
}

/// Drives runs against one collaborator set and checkpoint store
pub struct OrchestrationEngine {
    collaborators: Collaborators,
    store: Arc<dyn CheckpointStore>,
    settings: Arc<IndexerSettings>,
    events: EventPublisher,
}

impl OrchestrationEngine {
    pub fn new(
        collaborators: Collaborators,
        store: Arc<dyn CheckpointStore>,
        settings: Arc<IndexerSettings>,
    ) -> Self {
        Self {
            collaborators,
            store,
            settings,
            events: EventPublisher::default(),
        }
    }

    pub fn with_events(mut self, events: EventPublisher) -> Self {
        self.events = events;
        self
    }

    pub fn events(&self) -> &EventPublisher {
        &self.events
    }

    pub fn store(&self) -> &Arc<dyn CheckpointStore> {
        &self.store
    }

    pub fn settings(&self) -> &IndexerSettings {
        &self.settings
    }

    /// Run (or resume) `run_id` until the source is exhausted.
    ///
    /// A run whose checkpoint is already Completed returns its summary
    /// without touching any collaborator.
    #[instrument(skip(self, request, cancellation))]
    pub async fn run(
        &self,
        run_id: Uuid,
        request: &IndexRequest,
        cancellation: CancellationSignal,
    ) -> Result<RunSummary> {
        let mut machine = RunStateMachine::new(run_id);
        let params = RunParameters::resolve(request.index_name.as_deref(), &self.settings)?;

        let mut checkpoint = match self.store.load(run_id).await? {
            Some(existing) if existing.status == RunStatus::Completed => {
                info!("Run already completed, nothing to do");
                return Ok(RunSummary::from(&existing));
            }
            Some(mut existing) => {
                existing.mark(RunStatus::Running, None);
                self.store.save(&existing).await?;
                log_run_operation(
                    operations::RESUME,
                    run_id,
                    Some(&existing.index_name),
                    "resumed",
                    Some(&format!("after {} committed pages", existing.completed_pages)),
                );
                self.events.publish(
                    run_id,
                    IndexingEvent::RunResumed {
                        completed_pages: existing.completed_pages,
                    },
                );
                existing
            }
            None => {
                let fresh = WorkflowCheckpoint::new(
                    run_id,
                    &params.index_name,
                    &params.container_name,
                    Cursor::new(request.prefix_list.clone()),
                );
                self.store.save(&fresh).await?;
                log_run_operation(operations::INDEX, run_id, Some(&params.index_name), "started", None);
                self.events.publish(
                    run_id,
                    IndexingEvent::RunStarted {
                        index_name: params.index_name.clone(),
                    },
                );
                fresh
            }
        };
        machine.transition(RunEvent::Validated)?;

        match self
            .drive(&mut machine, &mut checkpoint, &params, &cancellation)
            .await
        {
            Ok(()) => {
                checkpoint.mark(RunStatus::Completed, None);
                self.store.save(&checkpoint).await?;
                log_run_operation(
                    operations::INDEX,
                    run_id,
                    Some(&checkpoint.index_name),
                    "completed",
                    Some(&format!(
                        "{} pages, {} documents",
                        checkpoint.completed_pages, checkpoint.documents_completed
                    )),
                );
                self.events.publish(
                    run_id,
                    IndexingEvent::RunCompleted {
                        pages: checkpoint.completed_pages,
                        documents: checkpoint.documents_completed,
                    },
                );
                Ok(RunSummary::from(&checkpoint))
            }
            Err(err) => {
                self.halt(&mut machine, &mut checkpoint, &err).await;
                Err(err)
            }
        }
    }

    async fn drive(
        &self,
        machine: &mut RunStateMachine,
        checkpoint: &mut WorkflowCheckpoint,
        params: &RunParameters,
        cancellation: &CancellationSignal,
    ) -> Result<()> {
        let retry = RetryExecutor::new();
        let index_name = checkpoint.index_name.clone();
        let search_index = self.collaborators.search_index.clone();

        retry
            .execute(operations::ENSURE_INDEX_EXISTS, &params.service_retry, |_| {
                search_index.ensure_index(&index_name)
            })
            .await?;
        machine.transition(RunEvent::IndexReady)?;

        let pagination = PaginationCursor::new(
            self.collaborators.lister.clone(),
            checkpoint.container_name.clone(),
            params.service_retry,
        );
        let pipeline = Arc::new(DocumentPipeline::new(
            self.collaborators.clone(),
            params.service_retry,
            checkpoint.run_id,
        ));
        let fan_out = FanOutController::new(
            pipeline,
            self.store.clone(),
            self.events.clone(),
            cancellation.clone(),
            checkpoint.run_id,
            index_name.clone(),
            params.failure_policy,
        );

        loop {
            cancellation.check("between pages")?;

            let page = pagination
                .next_page(&checkpoint.cursor, params.concurrency_limit)
                .await?;
            if page.is_empty() {
                machine.transition(RunEvent::SourceExhausted)?;
                checkpoint.cursor = page.next_cursor;
                return Ok(());
            }

            machine.transition(RunEvent::PageFetched)?;
            self.events.publish(
                checkpoint.run_id,
                IndexingEvent::PageFetched {
                    page: checkpoint.completed_pages + 1,
                    documents: page.len(),
                },
            );

            machine.transition(RunEvent::Dispatched)?;
            let outcome = fan_out
                .dispatch(
                    &page,
                    params.concurrency_limit,
                    &params.document_retry,
                    &checkpoint.completed_documents,
                )
                .await?;
            machine.transition(RunEvent::Joined)?;

            checkpoint.failed_documents.extend(outcome.failures());
            let completed = (outcome.completed_count() + outcome.skipped_count()) as u64;
            checkpoint.commit_page(page.next_cursor, completed);
            self.store.save(checkpoint).await?;

            info!(
                page = checkpoint.completed_pages,
                documents = completed,
                exhausted = page.exhausted,
                "Page committed"
            );
            self.events.publish(
                checkpoint.run_id,
                IndexingEvent::PageCommitted {
                    page: checkpoint.completed_pages,
                    documents: completed,
                },
            );
        }
    }

    /// Persist a halted run. The ledger written by the fan-out is reloaded
    /// so documents completed in the uncommitted page are kept. Store
    /// failures here are logged; the caller still returns `err`.
    async fn halt(
        &self,
        machine: &mut RunStateMachine,
        checkpoint: &mut WorkflowCheckpoint,
        err: &IndexerError,
    ) {
        let cancelled = matches!(err.root_cause(), IndexerError::Cancelled(_));
        let event = if cancelled {
            RunEvent::Cancel
        } else {
            RunEvent::Fail(err.to_string())
        };
        if let Err(transition_err) = machine.transition(event) {
            warn!(error = %transition_err, "Run state machine rejected halt");
        }

        match self.store.load(checkpoint.run_id).await {
            Ok(Some(stored)) => checkpoint.completed_documents = stored.completed_documents,
            Ok(None) => {}
            Err(load_err) => {
                warn!(error = %load_err, "Could not reload document ledger, keeping in-memory copy");
            }
        }

        let status = if cancelled {
            RunStatus::Cancelled
        } else {
            RunStatus::Failed
        };
        checkpoint.mark(status, Some(err.to_string()));
        if let Err(save_err) = self.store.save(checkpoint).await {
            warn!(error = %save_err, "Could not persist halted run");
        }

        if cancelled {
            log_run_operation(
                operations::CANCEL,
                checkpoint.run_id,
                Some(&checkpoint.index_name),
                "cancelled",
                Some(&format!("after {} committed pages", checkpoint.completed_pages)),
            );
        } else {
            log_error("orchestration_engine", operations::INDEX, &err.to_string(), None);
        }
        let event = if cancelled {
            IndexingEvent::RunCancelled {
                completed_pages: checkpoint.completed_pages,
            }
        } else {
            IndexingEvent::RunFailed {
                error: err.to_string(),
            }
        };
        self.events.publish(checkpoint.run_id, event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::MemoryCheckpointStore;
    use crate::test_helpers::{stub_collaborators, StubCracker};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Serves the first load, then fails every later one
    #[derive(Default)]
    struct FailingReloadStore {
        inner: MemoryCheckpointStore,
        loads: AtomicU32,
    }

    #[async_trait]
    impl CheckpointStore for FailingReloadStore {
        async fn load(&self, run_id: Uuid) -> Result<Option<WorkflowCheckpoint>> {
            if self.loads.fetch_add(1, Ordering::SeqCst) > 0 {
                return Err(IndexerError::checkpoint("store offline"));
            }
            self.inner.load(run_id).await
        }

        async fn save(&self, checkpoint: &WorkflowCheckpoint) -> Result<()> {
            self.inner.save(checkpoint).await
        }

        async fn record_document(&self, run_id: Uuid, ledger_key: &str) -> Result<()> {
            self.inner.record_document(run_id, ledger_key).await
        }

        async fn list_runs(&self) -> Result<Vec<RunSummary>> {
            self.inner.list_runs().await
        }
    }

    fn settings(parallel: usize) -> Arc<IndexerSettings> {
        let mut settings = IndexerSettings::with_container("source");
        settings.blob_amount_parallel = Some(parallel);
        Arc::new(settings)
    }

    #[test]
    fn test_resolve_requires_container() {
        let err = RunParameters::resolve(None, &IndexerSettings::default()).unwrap_err();
        assert!(err.to_string().contains("BLOB_CONTAINER_NAME"));
    }

    #[test]
    fn test_resolve_prefers_requested_index() {
        let settings = IndexerSettings::with_container("source");
        let params = RunParameters::resolve(Some("custom"), &settings).unwrap();
        assert_eq!(params.index_name, "custom");
        assert_eq!(params.concurrency_limit, 20);
        assert_eq!(params.document_retry.max_attempts, 1);

        let params = RunParameters::resolve(None, &settings).unwrap();
        assert_eq!(params.index_name, "default-index");
    }

    #[test]
    fn test_resolve_rejects_missing_attempts() {
        let mut settings = IndexerSettings::with_container("source");
        settings.max_number_of_attempts = None;
        assert!(matches!(
            RunParameters::resolve(None, &settings),
            Err(IndexerError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_run_indexes_every_blob() {
        let stubs = stub_collaborators(&["a", "b", "c"]);
        let store = Arc::new(MemoryCheckpointStore::new());
        let engine = OrchestrationEngine::new(stubs.collaborators(), store.clone(), settings(2));

        let summary = engine
            .run(Uuid::new_v4(), &IndexRequest::default(), CancellationSignal::new())
            .await
            .unwrap();

        assert_eq!(summary.status, RunStatus::Completed);
        assert_eq!(summary.pages_committed, 2);
        assert_eq!(summary.documents_completed, 3);
        assert_eq!(stubs.search.ensure_calls(), 1);
        assert_eq!(stubs.search.source_files("default-index"), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_completed_run_is_not_repeated() {
        let stubs = stub_collaborators(&["a"]);
        let store = Arc::new(MemoryCheckpointStore::new());
        let engine = OrchestrationEngine::new(stubs.collaborators(), store, settings(2));
        let run_id = Uuid::new_v4();

        engine
            .run(run_id, &IndexRequest::default(), CancellationSignal::new())
            .await
            .unwrap();
        let listed = stubs.lister.call_count();

        let summary = engine
            .run(run_id, &IndexRequest::default(), CancellationSignal::new())
            .await
            .unwrap();
        assert_eq!(summary.status, RunStatus::Completed);
        assert_eq!(stubs.lister.call_count(), listed);
        assert_eq!(stubs.search.ensure_calls(), 1);
    }

    #[tokio::test]
    async fn test_halt_keeps_run_error_when_reload_fails() {
        let mut stubs = stub_collaborators(&["a"]);
        stubs.cracker = Arc::new(StubCracker::new().with_permanent_failure("a"));
        let store = Arc::new(FailingReloadStore::default());
        let engine = OrchestrationEngine::new(stubs.collaborators(), store.clone(), settings(1));
        let run_id = Uuid::new_v4();

        let err = engine
            .run(run_id, &IndexRequest::default(), CancellationSignal::new())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("source/a"), "unexpected error: {err}");
        assert!(matches!(err.root_cause(), IndexerError::Service { .. }));
        let stored = store.inner.load(run_id).await.unwrap().unwrap();
        assert_eq!(stored.status, RunStatus::Failed);
    }
}
