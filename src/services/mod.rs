//! # External Collaborators
//!
//! Fixed input/output contracts for the black-box services a run depends on,
//! plus reference implementations that run against the local filesystem.
//!
//! The orchestration core only sees the traits; [`Collaborators`] bundles one
//! instance of each and is built once per process by the client factory.

pub mod blob_store;
pub mod chunker;
pub mod embedding;
pub mod search;

use crate::error::Result;
use crate::models::{BlobReference, Chunk, Document, SearchDocument, TextSpan};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

pub use blob_store::{FsBlobLister, TextFileCracker};
pub use chunker::SentenceChunker;
pub use embedding::{HashingEmbedder, OpenAiEmbedder};
pub use search::{document_id, filename_to_id, FsSearchIndex, IndexPublisher};

/// One listing segment: the blobs and the token for the next segment
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListResult {
    pub blobs: Vec<BlobReference>,
    /// `None` when the prefix has no further segments
    pub next_token: Option<String>,
}

/// Enumerates blobs under a name prefix, one segment per call
#[async_trait]
pub trait BlobLister: Send + Sync {
    async fn list(
        &self,
        container: &str,
        prefix: &str,
        continuation_token: Option<&str>,
        page_size: usize,
    ) -> Result<ListResult>;
}

/// Extracts page text from a blob
#[async_trait]
pub trait DocumentCracker: Send + Sync {
    async fn crack(&self, blob: &BlobReference) -> Result<Document>;
}

/// Splits the concatenated page text into ordered spans. Pure, no I/O.
pub trait Chunker: Send + Sync {
    fn chunk(&self, document: &Document) -> Result<Vec<TextSpan>>;
}

/// Computes one embedding per chunk, in order
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>>;
}

/// Target search index
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Create the index if it is missing. Existing indexes are left alone.
    async fn ensure_index(&self, index_name: &str) -> Result<()>;

    /// Upload or overwrite one batch of documents keyed by their id
    async fn upload_documents(&self, index_name: &str, documents: &[SearchDocument])
        -> Result<()>;
}

/// The full collaborator set handed to the engine
#[derive(Clone)]
pub struct Collaborators {
    pub lister: Arc<dyn BlobLister>,
    pub cracker: Arc<dyn DocumentCracker>,
    pub chunker: Arc<dyn Chunker>,
    pub embedder: Arc<dyn Embedder>,
    pub search_index: Arc<dyn SearchIndex>,
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
