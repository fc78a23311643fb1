//! Engine wiring shared by the integration tests.

use blob_indexer::checkpoint::{CheckpointStore, MemoryCheckpointStore};
use blob_indexer::config::IndexerSettings;
use blob_indexer::orchestration::{FailurePolicy, OrchestrationEngine};
use blob_indexer::test_helpers::StubCollaborators;
use std::sync::Arc;
use std::time::Duration;

/// Settings over container `source` with short retry intervals
pub fn settings(parallel: usize) -> IndexerSettings {
    let mut settings = IndexerSettings::with_container("source");
    settings.blob_amount_parallel = Some(parallel);
    settings.document_retry_interval_ms = 10;
    settings.service_retry_interval_ms = 10;
    settings
}

pub fn settings_with_policy(parallel: usize, policy: FailurePolicy) -> IndexerSettings {
    let mut settings = settings(parallel);
    settings.failure_policy = policy;
    settings
}

pub fn engine(
    stubs: &StubCollaborators,
    store: Arc<dyn CheckpointStore>,
    settings: IndexerSettings,
) -> OrchestrationEngine {
    OrchestrationEngine::new(stubs.collaborators(), store, Arc::new(settings))
}

pub fn memory_store() -> Arc<MemoryCheckpointStore> {
    Arc::new(MemoryCheckpointStore::new())
}

/// Names of the listing calls as `(prefix, token)` pairs
pub fn listing_sequence(stubs: &StubCollaborators) -> Vec<(String, Option<String>)> {
    stubs
        .lister
        .calls()
        .into_iter()
        .map(|call| (call.prefix, call.token))
        .collect()
}

pub const LONG_CRACK: Duration = Duration::from_secs(10);
