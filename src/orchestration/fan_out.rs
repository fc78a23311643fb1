//! # Fan-out Controller
//!
//! Starts one document pipeline per blob of a page, at most
//! `concurrency_limit` at a time, and joins them all before the engine moves
//! on. Each pipeline returns an explicit result; the controller aggregates
//! them and applies the configured [`FailurePolicy`].

use super::document_pipeline::DocumentPipeline;
use crate::checkpoint::CheckpointStore;
use crate::constants::operations;
use crate::error::{IndexerError, Result};
use crate::events::{EventPublisher, IndexingEvent};
use crate::models::{BlobReference, FailedDocument, Page};
use crate::resilience::{CancellationSignal, RetryExecutor, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

/// What a permanently failed document does to its page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Abort the page's remaining pipelines and fail the run
    #[default]
    #[serde(alias = "abort")]
    AbortOnFirstFailure,
    /// Record the failure and finish the page
    #[serde(alias = "continue")]
    ContinueOnFailure,
}

/// Terminal result of one document within a page
#[derive(Debug)]
pub enum DocumentOutcome {
    Completed { blob: BlobReference, attempts: u32 },
    /// Already in the run's completion ledger
    Skipped { blob: BlobReference },
    Failed { blob: BlobReference, error: IndexerError },
}

impl DocumentOutcome {
    pub fn blob(&self) -> &BlobReference {
        match self {
            Self::Completed { blob, .. } | Self::Skipped { blob } | Self::Failed { blob, .. } => {
                blob
            }
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Outcomes of one joined page, in page order
#[derive(Debug, Default)]
pub struct PageOutcome {
    pub outcomes: Vec<DocumentOutcome>,
}

impl PageOutcome {
    pub fn completed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_completed()).count()
    }

    pub fn skipped_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, DocumentOutcome::Skipped { .. }))
            .count()
    }

    pub fn failures(&self) -> Vec<FailedDocument> {
        self.outcomes
            .iter()
            .filter_map(|outcome| match outcome {
                DocumentOutcome::Failed { blob, error } => Some(FailedDocument {
                    blob: blob.to_string(),
                    error: error.to_string(),
                }),
                _ => None,
            })
            .collect()
    }
}

pub struct FanOutController {
    pipeline: Arc<DocumentPipeline>,
    store: Arc<dyn CheckpointStore>,
    events: EventPublisher,
    cancellation: CancellationSignal,
    run_id: Uuid,
    index_name: String,
    failure_policy: FailurePolicy,
}

impl FanOutController {
    pub fn new(
        pipeline: Arc<DocumentPipeline>,
        store: Arc<dyn CheckpointStore>,
        events: EventPublisher,
        cancellation: CancellationSignal,
        run_id: Uuid,
        index_name: impl Into<String>,
        failure_policy: FailurePolicy,
    ) -> Self {
        Self {
            pipeline,
            store,
            events,
            cancellation,
            run_id,
            index_name: index_name.into(),
            failure_policy,
        }
    }

    /// Run every blob of `page` through the pipeline and join.
    ///
    /// Blobs whose ledger key is in `ledger` are skipped. Every completed
    /// document is recorded in the checkpoint ledger as soon as it joins.
    /// Under [`FailurePolicy::AbortOnFirstFailure`], and for any fatal error,
    /// the first failure aborts the remaining pipelines and is returned.
    #[instrument(skip_all, fields(run_id = %self.run_id, documents = page.len()))]
    pub async fn dispatch(
        &self,
        page: &Page,
        concurrency_limit: usize,
        retry_policy: &RetryPolicy,
        ledger: &BTreeSet<String>,
    ) -> Result<PageOutcome> {
        if concurrency_limit == 0 {
            return Err(IndexerError::configuration(
                "concurrency limit must be at least 1",
            ));
        }

        let semaphore = Arc::new(Semaphore::new(concurrency_limit));
        let mut join_set = JoinSet::new();
        let mut slots: Vec<Option<DocumentOutcome>> = Vec::with_capacity(page.len());

        for (position, blob) in page.blobs.iter().enumerate() {
            if ledger.contains(&blob.ledger_key()) {
                debug!(blob = %blob, "Skipping document already in ledger");
                self.events.publish(
                    self.run_id,
                    IndexingEvent::DocumentSkipped {
                        blob: blob.to_string(),
                    },
                );
                slots.push(Some(DocumentOutcome::Skipped { blob: blob.clone() }));
                continue;
            }
            slots.push(None);

            let semaphore = semaphore.clone();
            let pipeline = self.pipeline.clone();
            let cancellation = self.cancellation.clone();
            let policy = *retry_policy;
            let index_name = self.index_name.clone();
            let blob = blob.clone();

            self.events.publish(
                self.run_id,
                IndexingEvent::DocumentDispatched {
                    blob: blob.to_string(),
                },
            );

            join_set.spawn(async move {
                let result = async {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .map_err(|_| IndexerError::Cancelled("fan-out closed".to_string()))?;
                    cancellation.check(&format!("before starting {blob}"))?;

                    let job = RetryExecutor::new()
                        .execute(operations::INDEX_DOCUMENT, &policy, |attempt| {
                            let pipeline = pipeline.clone();
                            let blob = blob.clone();
                            let index_name = index_name.clone();
                            async move { pipeline.run(&blob, &index_name, attempt).await }
                        })
                        .await?;
                    Ok::<u32, IndexerError>(job.attempt_count())
                }
                .await;
                (position, blob, result)
            });
        }

        let mut abort_error: Option<IndexerError> = None;

        while let Some(joined) = join_set.join_next().await {
            let (position, blob, result) = match joined {
                Ok(output) => output,
                Err(join_err) if join_err.is_cancelled() => continue,
                Err(join_err) => {
                    error!(error = %join_err, "Document task panicked");
                    if abort_error.is_none() {
                        abort_error = Some(IndexerError::service(
                            operations::INDEX_DOCUMENT,
                            format!("pipeline task panicked: {join_err}"),
                        ));
                        join_set.abort_all();
                    }
                    continue;
                }
            };

            match result {
                Ok(attempts) => {
                    self.store.record_document(self.run_id, &blob.ledger_key()).await?;
                    self.events.publish(
                        self.run_id,
                        IndexingEvent::DocumentCompleted {
                            blob: blob.to_string(),
                            attempts,
                        },
                    );
                    slots[position] = Some(DocumentOutcome::Completed { blob, attempts });
                }
                Err(err) => {
                    self.events.publish(
                        self.run_id,
                        IndexingEvent::DocumentFailed {
                            blob: blob.to_string(),
                            error: err.to_string(),
                        },
                    );
                    let abort = err.is_fatal()
                        || matches!(err, IndexerError::Cancelled(_))
                        || self.failure_policy == FailurePolicy::AbortOnFirstFailure;

                    if !abort {
                        error!(blob = %blob, error = %err, "Document failed, continuing page");
                        slots[position] = Some(DocumentOutcome::Failed { blob, error: err });
                    } else if abort_error.is_none() {
                        error!(blob = %blob, error = %err, "Document failed, aborting page");
                        join_set.abort_all();
                        abort_error = Some(err);
                    }
                }
            }
        }

        if let Some(err) = abort_error {
            return Err(err);
        }

        let outcome = PageOutcome {
            outcomes: slots.into_iter().flatten().collect(),
        };
        info!(
            completed = outcome.completed_count(),
            skipped = outcome.skipped_count(),
            failed = outcome.outcomes.len() - outcome.completed_count() - outcome.skipped_count(),
            "Page joined"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::MemoryCheckpointStore;
    use crate::models::{Cursor, WorkflowCheckpoint};
    use crate::services::SearchIndex;
    use crate::test_helpers::{stub_collaborators, StubCollaborators, StubCracker, STUB_ACCOUNT};
    use std::time::Duration;

    fn page(names: &[&str]) -> Page {
        Page {
            blobs: names
                .iter()
                .map(|n| BlobReference::new(STUB_ACCOUNT, "source", *n))
                .collect(),
            next_cursor: Cursor::default(),
            exhausted: true,
        }
    }

    async fn build_controller(
        stubs: &StubCollaborators,
        policy: FailurePolicy,
    ) -> (FanOutController, Arc<MemoryCheckpointStore>, Uuid) {
        build_controller_with_signal(stubs, policy, CancellationSignal::new()).await
    }

    async fn build_controller_with_signal(
        stubs: &StubCollaborators,
        policy: FailurePolicy,
        cancellation: CancellationSignal,
    ) -> (FanOutController, Arc<MemoryCheckpointStore>, Uuid) {
        let run_id = Uuid::new_v4();
        let store = Arc::new(MemoryCheckpointStore::new());
        store
            .save(&WorkflowCheckpoint::new(run_id, "docs", "source", Cursor::default()))
            .await
            .unwrap();
        stubs.search.ensure_index("docs").await.unwrap();

        let pipeline = Arc::new(DocumentPipeline::new(
            stubs.collaborators(),
            RetryPolicy::no_retry(),
            run_id,
        ));
        let controller = FanOutController::new(
            pipeline,
            store.clone(),
            EventPublisher::default(),
            cancellation,
            run_id,
            "docs",
            policy,
        );
        (controller, store, run_id)
    }

    #[tokio::test]
    async fn test_every_document_is_dispatched_and_recorded() {
        let stubs = stub_collaborators(&[]);
        let (controller, store, run_id) = build_controller(&stubs, FailurePolicy::default()).await;

        let outcome = controller
            .dispatch(&page(&["a", "b", "c"]), 2, &RetryPolicy::no_retry(), &BTreeSet::new())
            .await
            .unwrap();

        assert_eq!(outcome.completed_count(), 3);
        let order: Vec<&str> = outcome.outcomes.iter().map(|o| o.blob().name.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c"]);

        let checkpoint = store.load(run_id).await.unwrap().unwrap();
        assert_eq!(checkpoint.completed_documents.len(), 3);
    }

    #[tokio::test]
    async fn test_ledger_entries_are_skipped() {
        let stubs = stub_collaborators(&[]);
        let (controller, _store, _) = build_controller(&stubs, FailurePolicy::default()).await;
        let ledger: BTreeSet<String> = [BlobReference::new(STUB_ACCOUNT, "source", "a").ledger_key()]
            .into_iter()
            .collect();

        let outcome = controller
            .dispatch(&page(&["a", "b"]), 2, &RetryPolicy::no_retry(), &ledger)
            .await
            .unwrap();

        assert_eq!(outcome.skipped_count(), 1);
        assert_eq!(stubs.cracker.cracked(), vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn test_abort_policy_fails_the_page() {
        let mut stubs = stub_collaborators(&[]);
        stubs.cracker = Arc::new(StubCracker::new().with_permanent_failure("b"));
        let (controller, _store, _) = build_controller(&stubs, FailurePolicy::AbortOnFirstFailure).await;

        let err = controller
            .dispatch(&page(&["a", "b", "c"]), 1, &RetryPolicy::no_retry(), &BTreeSet::new())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("source/b"), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn test_continue_policy_collects_failures() {
        let mut stubs = stub_collaborators(&[]);
        stubs.cracker = Arc::new(StubCracker::new().with_permanent_failure("b"));
        let (controller, _store, _) = build_controller(&stubs, FailurePolicy::ContinueOnFailure).await;

        let outcome = controller
            .dispatch(&page(&["a", "b", "c"]), 3, &RetryPolicy::no_retry(), &BTreeSet::new())
            .await
            .unwrap();

        assert_eq!(outcome.completed_count(), 2);
        let failures = outcome.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].blob, "source/b");
    }

    #[tokio::test]
    async fn test_cancellation_stops_remaining_documents_of_page() {
        let signal = CancellationSignal::new();
        let mut stubs = stub_collaborators(&[]);
        stubs.cracker = Arc::new(StubCracker::new().cancel_on("a", signal.clone()));
        let (controller, store, run_id) =
            build_controller_with_signal(&stubs, FailurePolicy::ContinueOnFailure, signal).await;

        let err = controller
            .dispatch(&page(&["a", "b", "c"]), 1, &RetryPolicy::no_retry(), &BTreeSet::new())
            .await
            .unwrap_err();

        assert!(matches!(err, IndexerError::Cancelled(_)), "unexpected error: {err}");
        assert_eq!(stubs.cracker.cracked(), vec!["a".to_string()]);

        let checkpoint = store.load(run_id).await.unwrap().unwrap();
        let ledger: Vec<&str> = checkpoint.completed_documents.iter().map(String::as_str).collect();
        assert_eq!(ledger, vec!["stub/source/a"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_document_retry_reruns_pipeline() {
        let mut stubs = stub_collaborators(&[]);
        stubs.cracker = Arc::new(StubCracker::new().with_transient_failures("a", 1));
        let (controller, _store, _) = build_controller(&stubs, FailurePolicy::default()).await;
        let policy = RetryPolicy::new(Duration::from_secs(60), 2).unwrap();

        let outcome = controller
            .dispatch(&page(&["a"]), 1, &policy, &BTreeSet::new())
            .await
            .unwrap();

        match &outcome.outcomes[0] {
            DocumentOutcome::Completed { attempts, .. } => assert_eq!(*attempts, 2),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(stubs.cracker.cracked(), vec!["a".to_string(), "a".to_string()]);
    }

    #[tokio::test]
    async fn test_concurrency_limit_is_respected() {
        let mut stubs = stub_collaborators(&[]);
        let mut cracker = StubCracker::new();
        for name in ["a", "b", "c", "d"] {
            cracker = cracker.with_delay(name, Duration::from_millis(20));
        }
        stubs.cracker = Arc::new(cracker);
        let (controller, _store, _) = build_controller(&stubs, FailurePolicy::default()).await;

        let started = tokio::time::Instant::now();
        controller
            .dispatch(&page(&["a", "b", "c", "d"]), 2, &RetryPolicy::no_retry(), &BTreeSet::new())
            .await
            .unwrap();

        assert!(started.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_zero_concurrency_is_rejected() {
        let stubs = stub_collaborators(&[]);
        let (controller, _store, _) = build_controller(&stubs, FailurePolicy::default()).await;
        assert!(controller
            .dispatch(&page(&["a"]), 0, &RetryPolicy::no_retry(), &BTreeSet::new())
            .await
            .is_err());
    }
}
