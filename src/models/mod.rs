//! # Data Model
//!
//! Plain serde types shared by the orchestration layer, the collaborators
//! and the checkpoint store.

pub mod blob_reference;
pub mod checkpoint;
pub mod cursor;
pub mod document;

pub use blob_reference::BlobReference;
pub use checkpoint::{FailedDocument, RunStatus, RunSummary, WorkflowCheckpoint};
pub use cursor::{Cursor, Page};
pub use document::{Chunk, Document, SearchDocument, TextSpan};
