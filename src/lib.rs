#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Blob Indexer
//!
//! Durable, replay-safe indexing of a blob container into a vector search
//! index: blob → text → chunks → embeddings → index documents.
//!
//! ## Architecture
//!
//! An orchestration engine lists the container one page at a time, fans each
//! page out to bounded parallel document pipelines, joins them, and writes a
//! checkpoint before moving on. A crashed or cancelled run resumes from its
//! last committed page and never reprocesses a document recorded in the
//! completion ledger.
//!
//! ## Module Organization
//!
//! - [`orchestration`] - engine, pagination, fan-out, document pipeline, run service
//! - [`services`] - collaborator traits and reference implementations
//! - [`checkpoint`] - durable run progress (memory, file, Postgres)
//! - [`state_machine`] - run and document phase tracking
//! - [`resilience`] - retry policies and cancellation
//! - [`registry`] - client factory and operation handler registry
//! - [`web`] - axum HTTP surface
//! - [`config`] - layered settings
//! - [`error`] - structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use blob_indexer::config::ConfigManager;
//! use blob_indexer::orchestration::{IndexRequest, IndexingService, OrchestrationEngine};
//! use blob_indexer::registry::ClientFactory;
//! use std::sync::Arc;
//!
//! # async fn example() -> blob_indexer::Result<()> {
//! let settings = Arc::new(ConfigManager::load()?);
//! let factory = ClientFactory::new(settings.clone());
//! let engine = OrchestrationEngine::new(
//!     factory.build_collaborators()?,
//!     factory.build_checkpoint_store().await?,
//!     settings,
//! );
//! let summary = IndexingService::new(engine)
//!     .run_to_completion(uuid::Uuid::new_v4(), IndexRequest::default())
//!     .await?;
//! println!("indexed {} documents", summary.documents_completed);
//! # Ok(())
//! # }
//! ```

pub mod checkpoint;
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod registry;
pub mod resilience;
pub mod services;
pub mod state_machine;
pub mod test_helpers;
pub mod web;

pub use config::IndexerSettings;
pub use error::{IndexerError, Result};
pub use models::{BlobReference, RunStatus, RunSummary, WorkflowCheckpoint};
pub use orchestration::{IndexRequest, IndexingService, OrchestrationEngine};
