//! Scripted in-memory collaborators for unit and integration tests.
//!
//! Every stub records the calls it receives so tests can assert on the exact
//! sequence of external calls a run made.

use crate::error::{IndexerError, Result};
use crate::models::{BlobReference, Chunk, Document, SearchDocument};
use crate::resilience::CancellationSignal;
use crate::services::{
    BlobLister, Chunker, Collaborators, DocumentCracker, Embedder, ListResult, SearchIndex,
    SentenceChunker,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const STUB_ACCOUNT: &str = "stub";

/// One recorded listing call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListCall {
    pub container: String,
    pub prefix: String,
    pub token: Option<String>,
    pub page_size: usize,
}

/// Lists a fixed set of names in sorted order; the token is the last name
/// served
#[derive(Debug, Default)]
pub struct StubLister {
    names: Vec<String>,
    calls: Mutex<Vec<ListCall>>,
    failures_remaining: AtomicU32,
}

impl StubLister {
    pub fn new(names: &[&str]) -> Self {
        let mut names: Vec<String> = names.iter().map(|n| n.to_string()).collect();
        names.sort();
        Self {
            names,
            ..Self::default()
        }
    }

    /// Fail the first `n` calls with a transient error
    pub fn failing_first(self, n: u32) -> Self {
        self.failures_remaining.store(n, Ordering::SeqCst);
        self
    }

    pub fn calls(&self) -> Vec<ListCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl BlobLister for StubLister {
    async fn list(
        &self,
        container: &str,
        prefix: &str,
        continuation_token: Option<&str>,
        page_size: usize,
    ) -> Result<ListResult> {
        self.calls.lock().push(ListCall {
            container: container.to_string(),
            prefix: prefix.to_string(),
            token: continuation_token.map(str::to_string),
            page_size,
        });

        if take_failure(&self.failures_remaining) {
            return Err(IndexerError::transient("stub_lister", "throttled"));
        }

        let mut matching = self
            .names
            .iter()
            .filter(|name| name.starts_with(prefix))
            .filter(|name| continuation_token.map_or(true, |token| name.as_str() > token));
        let selected: Vec<&String> = matching.by_ref().take(page_size).collect();
        let next_token = if matching.next().is_some() {
            selected.last().map(|name| name.to_string())
        } else {
            None
        };

        Ok(ListResult {
            blobs: selected
                .into_iter()
                .map(|name| BlobReference::new(STUB_ACCOUNT, container, name.as_str()))
                .collect(),
            next_token,
        })
    }
}

#[derive(Debug, Default)]
struct CrackScript {
    pages: Option<Vec<String>>,
    transient_failures: u32,
    permanent_failure: bool,
    delay: Option<Duration>,
    cancel: Option<CancellationSignal>,
}

/// Produces a small text document per blob name
#[derive(Debug, Default)]
pub struct StubCracker {
    scripts: Mutex<HashMap<String, CrackScript>>,
    cracked: Mutex<Vec<String>>,
}

impl StubCracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pages(self, name: &str, pages: &[&str]) -> Self {
        self.script(name).pages = Some(pages.iter().map(|p| p.to_string()).collect());
        self
    }

    /// Fail `times` attempts for `name` with a transient error
    pub fn with_transient_failures(self, name: &str, times: u32) -> Self {
        self.script(name).transient_failures = times;
        self
    }

    /// Always reject `name` with a non-retryable error
    pub fn with_permanent_failure(self, name: &str) -> Self {
        self.script(name).permanent_failure = true;
        self
    }

    /// Sleep before answering for `name`
    pub fn with_delay(self, name: &str, delay: Duration) -> Self {
        self.script(name).delay = Some(delay);
        self
    }

    /// Trigger `signal` when `name` is cracked
    pub fn cancel_on(self, name: &str, signal: CancellationSignal) -> Self {
        self.script(name).cancel = Some(signal);
        self
    }

    /// Blob names in the order they were cracked, one entry per attempt
    pub fn cracked(&self) -> Vec<String> {
        self.cracked.lock().clone()
    }

    fn script(&self, name: &str) -> parking_lot::MappedMutexGuard<'_, CrackScript> {
        parking_lot::MutexGuard::map(self.scripts.lock(), |scripts| {
            scripts.entry(name.to_string()).or_default()
        })
    }
}

#[async_trait]
impl DocumentCracker for StubCracker {
    async fn crack(&self, blob: &BlobReference) -> Result<Document> {
        self.cracked.lock().push(blob.name.clone());

        let (delay, pages, fail_transient, fail_permanent) = {
            let mut scripts = self.scripts.lock();
            let script = scripts.entry(blob.name.clone()).or_default();
            if let Some(signal) = &script.cancel {
                signal.cancel();
            }
            let fail_transient = script.transient_failures > 0;
            if fail_transient {
                script.transient_failures -= 1;
            }
            (
                script.delay,
                script.pages.clone(),
                fail_transient,
                script.permanent_failure,
            )
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fail_permanent {
            return Err(IndexerError::service("stub_cracker", format!("cannot read {}", blob.name)));
        }
        if fail_transient {
            return Err(IndexerError::transient("stub_cracker", "throttled"));
        }

        Ok(Document {
            pages: pages.unwrap_or_else(|| {
                vec![
                    format!("First page of {}. ", blob.name),
                    format!("Second page of {}.", blob.name),
                ]
            }),
            url: format!("https://{}.blob.local/{}/{}?sig=x", blob.account, blob.container, blob.name),
            filename: crate::services::blob_store::display_filename(&blob.name),
            blob_ref: blob.clone(),
        })
    }
}

/// Returns `[text length, 1.0]` for each chunk
#[derive(Debug, Default)]
pub struct StubEmbedder {
    calls: AtomicU32,
    failures_remaining: AtomicU32,
    drop_last_vector: AtomicBool,
}

impl StubEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_first(n: u32) -> Self {
        Self {
            failures_remaining: AtomicU32::new(n),
            ..Self::default()
        }
    }

    /// Answer every call with one vector fewer than chunks requested
    pub fn dropping_last_vector() -> Self {
        Self {
            drop_last_vector: AtomicBool::new(true),
            ..Self::default()
        }
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for StubEmbedder {
    async fn embed(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.failures_remaining) {
            return Err(IndexerError::transient("stub_embedder", "rate limited"));
        }
        let mut vectors: Vec<Vec<f32>> = chunks
            .iter()
            .map(|chunk| vec![chunk.text.chars().count() as f32, 1.0])
            .collect();
        if self.drop_last_vector.load(Ordering::SeqCst) {
            vectors.pop();
        }
        Ok(vectors)
    }
}

/// In-memory index keyed by document id
#[derive(Debug, Default)]
pub struct StubSearchIndex {
    indexes: Mutex<BTreeMap<String, BTreeMap<String, SearchDocument>>>,
    ensure_calls: AtomicU32,
    upload_calls: AtomicU32,
}

impl StubSearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ensure_calls(&self) -> u32 {
        self.ensure_calls.load(Ordering::SeqCst)
    }

    pub fn upload_calls(&self) -> u32 {
        self.upload_calls.load(Ordering::SeqCst)
    }

    /// Sorted ids stored in `index_name`
    pub fn uploaded_ids(&self, index_name: &str) -> Vec<String> {
        self.indexes
            .lock()
            .get(index_name)
            .map(|docs| docs.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Source files with at least one stored chunk
    pub fn source_files(&self, index_name: &str) -> Vec<String> {
        let mut files: Vec<String> = self
            .indexes
            .lock()
            .get(index_name)
            .map(|docs| docs.values().map(|d| d.sourcefile.clone()).collect())
            .unwrap_or_default();
        files.sort();
        files.dedup();
        files
    }
}

#[async_trait]
impl SearchIndex for StubSearchIndex {
    async fn ensure_index(&self, index_name: &str) -> Result<()> {
        self.ensure_calls.fetch_add(1, Ordering::SeqCst);
        self.indexes.lock().entry(index_name.to_string()).or_default();
        Ok(())
    }

    async fn upload_documents(&self, index_name: &str, documents: &[SearchDocument]) -> Result<()> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        let mut indexes = self.indexes.lock();
        let index = indexes
            .get_mut(index_name)
            .ok_or_else(|| IndexerError::service("stub_search", format!("no index {index_name}")))?;
        for document in documents {
            index.insert(document.id.clone(), document.clone());
        }
        Ok(())
    }
}

/// A full stub collaborator set with typed handles for assertions
pub struct StubCollaborators {
    pub lister: Arc<StubLister>,
    pub cracker: Arc<StubCracker>,
    pub chunker: Arc<dyn Chunker>,
    pub embedder: Arc<StubEmbedder>,
    pub search: Arc<StubSearchIndex>,
}

impl StubCollaborators {
    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            lister: self.lister.clone(),
            cracker: self.cracker.clone(),
            chunker: self.chunker.clone(),
            embedder: self.embedder.clone(),
            search_index: self.search.clone(),
        }
    }
}

/// Stubs over a container holding `names`
pub fn stub_collaborators(names: &[&str]) -> StubCollaborators {
    StubCollaborators {
        lister: Arc::new(StubLister::new(names)),
        cracker: Arc::new(StubCracker::new()),
        chunker: Arc::new(SentenceChunker::default()),
        embedder: Arc::new(StubEmbedder::new()),
        search: Arc::new(StubSearchIndex::new()),
    }
}

fn take_failure(remaining: &AtomicU32) -> bool {
    remaining
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}
