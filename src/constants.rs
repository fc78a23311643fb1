//! # System Constants
//!
//! Defaults, setting names, operation names and lifecycle event names that
//! define the operational boundaries of an indexing run.

use std::time::Duration;

/// Operation names, used as handler registry keys and retry labels
pub mod operations {
    // Entry points
    pub const INDEX: &str = "index";
    pub const RESUME: &str = "resume";
    pub const STATUS: &str = "status";
    pub const CANCEL: &str = "cancel";
    pub const LIST: &str = "list";

    // Sub-workflow
    pub const INDEX_DOCUMENT: &str = "index_document";

    // Activities
    pub const ENSURE_INDEX_EXISTS: &str = "ensure_index_exists";
    pub const LIST_BLOBS_CHUNK: &str = "list_blobs_chunk";
    pub const DOCUMENT_CRACKING: &str = "document_cracking";
    pub const CHUNKING: &str = "chunking";
    pub const EMBEDDING: &str = "embedding";
    pub const ADD_DOCUMENTS: &str = "add_documents";
}

/// Lifecycle events published while a run progresses
pub mod events {
    pub const RUN_STARTED: &str = "run.started";
    pub const RUN_RESUMED: &str = "run.resumed";
    pub const RUN_COMPLETED: &str = "run.completed";
    pub const RUN_FAILED: &str = "run.failed";
    pub const RUN_CANCELLED: &str = "run.cancelled";

    pub const PAGE_FETCHED: &str = "page.fetched";
    pub const PAGE_COMMITTED: &str = "page.committed";

    pub const DOCUMENT_DISPATCHED: &str = "document.dispatched";
    pub const DOCUMENT_SKIPPED: &str = "document.skipped";
    pub const DOCUMENT_COMPLETED: &str = "document.completed";
    pub const DOCUMENT_FAILED: &str = "document.failed";
}

/// Environment-style setting names
pub mod settings {
    pub const BLOB_AMOUNT_PARALLEL: &str = "BLOB_AMOUNT_PARALLEL";
    pub const SEARCH_INDEX_NAME: &str = "SEARCH_INDEX_NAME";
    pub const BLOB_CONTAINER_NAME: &str = "BLOB_CONTAINER_NAME";
    pub const MAX_NUMBER_OF_ATTEMPTS: &str = "MAX_NUMBER_OF_ATTEMPTS";
    pub const CONFIG_FILE: &str = "INDEXER_CONFIG_FILE";
}

pub mod defaults {
    pub const BLOB_AMOUNT_PARALLEL: usize = 20;
    pub const SEARCH_INDEX_NAME: &str = "default-index";
    pub const MAX_NUMBER_OF_ATTEMPTS: u32 = 1;
    pub const DOCUMENT_RETRY_INTERVAL_MS: u64 = 60_000;
    pub const SERVICE_RETRY_INTERVAL_MS: u64 = 3_000;
    pub const SOURCE_STORAGE_ACCOUNT_NAME: &str = "local";
    pub const BIND_ADDRESS: &str = "0.0.0.0:7071";
    pub const EMBEDDING_MODEL: &str = "text-embedding-3-large";
    pub const EMBEDDING_DIMENSIONS: usize = 3072;
    pub const HASHING_EMBEDDING_DIMENSIONS: usize = 256;
    pub const EMBEDDING_BATCH_SIZE: usize = 256;
    pub const EMBEDDING_TIMEOUT_SECONDS: u64 = 60;
    pub const CHUNK_SIZE_TOKENS: usize = 512;
    pub const CHUNK_OVERLAP_TOKENS: usize = 128;
    pub const MIN_SENTENCES_PER_CHUNK: usize = 1;
    pub const EVENT_CHANNEL_CAPACITY: usize = 1000;
}

/// Maximum number of documents per index upload request
pub const MAX_PUBLISH_BATCH_SIZE: usize = 1000;

/// Separator between pages in plain-text source documents
pub const PAGE_SEPARATOR: char = '\u{000C}';

pub fn document_retry_interval() -> Duration {
    Duration::from_millis(defaults::DOCUMENT_RETRY_INTERVAL_MS)
}

pub fn service_retry_interval() -> Duration {
    Duration::from_millis(defaults::SERVICE_RETRY_INTERVAL_MS)
}
