//! # Orchestration
//!
//! The durable core of an indexing run.
//!
//! ## Core Components
//!
//! - **OrchestrationEngine**: drives a run through
//!   `EnsureIndex → Paginate → FanOut → Join` and owns its checkpoint
//! - **PaginationCursor**: resumable multi-prefix listing, one page per call
//! - **FanOutController**: bounded parallel document pipelines per page
//! - **DocumentPipeline**: crack → chunk → embed → publish for one blob
//! - **IndexingService**: background run lifecycle (start, resume, status, cancel)
//!
//! Durability comes from the checkpoint written after each joined page. A
//! restarted run reloads that checkpoint and replays the listing from the
//! committed cursor, skipping documents already in the completion ledger.

pub mod document_pipeline;
pub mod engine;
pub mod fan_out;
pub mod pagination;
pub mod service;

pub use document_pipeline::{page_number_for_offset, spans_to_chunks, DocumentPipeline};
pub use engine::{IndexRequest, OrchestrationEngine, RunParameters};
pub use fan_out::{DocumentOutcome, FailurePolicy, FanOutController, PageOutcome};
pub use pagination::PaginationCursor;
pub use service::IndexingService;
