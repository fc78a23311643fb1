//! # Document Pipeline
//!
//! The per-document sub-workflow: crack → chunk → embed → publish. Each
//! stage is one suspension point awaiting a collaborator. Cracking,
//! embedding and publishing use the service retry policy; chunking runs
//! exactly once.

use crate::constants::operations;
use crate::error::{IndexerError, Result};
use crate::logging::log_document_operation;
use crate::models::{BlobReference, Chunk, Document, TextSpan};
use crate::resilience::{RetryExecutor, RetryPolicy};
use crate::services::{Collaborators, IndexPublisher};
use crate::state_machine::{DocumentEvent, DocumentJob, DocumentStage};
use tracing::{instrument, warn};
use uuid::Uuid;

/// Page holding the char at `position` of the concatenated page text.
///
/// Positions at or beyond the total length are an error rather than being
/// clamped to the last page.
pub fn page_number_for_offset(position: usize, pages: &[String]) -> Result<usize> {
    let mut remaining = position;
    let mut total_length = 0;

    for (page_number, page) in pages.iter().enumerate() {
        let length = page.chars().count();
        if remaining < length {
            return Ok(page_number);
        }
        remaining -= length;
        total_length += length;
    }

    Err(IndexerError::OutOfRange {
        position,
        total_length,
    })
}

/// Map chunker spans onto the document's pages
pub fn spans_to_chunks(document: &Document, spans: Vec<TextSpan>) -> Result<Vec<Chunk>> {
    spans
        .into_iter()
        .map(|span| {
            let last_char = span.end_index.saturating_sub(1).max(span.start_index);
            Ok(Chunk {
                filename: document.filename.clone(),
                url: document.url.clone(),
                start_page: page_number_for_offset(span.start_index, &document.pages)?,
                end_page: page_number_for_offset(last_char, &document.pages)?,
                start_index: span.start_index,
                end_index: span.end_index,
                token_count: span.token_count,
                text: span.text,
                embedding: None,
            })
        })
        .collect()
}

/// Runs one document through every stage
pub struct DocumentPipeline {
    collaborators: Collaborators,
    publisher: IndexPublisher,
    service_policy: RetryPolicy,
    retry: RetryExecutor,
    run_id: Uuid,
}

impl DocumentPipeline {
    pub fn new(collaborators: Collaborators, service_policy: RetryPolicy, run_id: Uuid) -> Self {
        let publisher = IndexPublisher::new(collaborators.search_index.clone());
        Self {
            collaborators,
            publisher,
            service_policy,
            retry: RetryExecutor::new(),
            run_id,
        }
    }

    /// Process `blob` into `index_name`. `attempt` is the 1-based
    /// document-level attempt this run belongs to.
    ///
    /// Returns the completed job, or [`IndexerError::DocumentFailed`] naming
    /// the stage that failed.
    #[instrument(skip(self, blob), fields(run_id = %self.run_id, blob = %blob))]
    pub async fn run(&self, blob: &BlobReference, index_name: &str, attempt: u32) -> Result<DocumentJob> {
        let mut job = DocumentJob::new(blob.clone(), attempt);
        let blob_label = blob.to_string();
        log_document_operation(
            operations::INDEX_DOCUMENT,
            self.run_id,
            &blob_label,
            attempt,
            "started",
            None,
        );

        // Cracking
        let document = match self
            .retry
            .execute(operations::DOCUMENT_CRACKING, &self.service_policy, |_| {
                self.collaborators.cracker.crack(blob)
            })
            .await
        {
            Ok(document) => document,
            Err(err) => return Err(Self::fail(&mut job, err)),
        };
        job.transition(DocumentEvent::StageSucceeded)?;

        // Chunking, never retried
        let document_ref = &document;
        let chunked = self
            .retry
            .execute(operations::CHUNKING, &RetryPolicy::no_retry(), |_| async move {
                let spans = self.collaborators.chunker.chunk(document_ref)?;
                spans_to_chunks(document_ref, spans)
            })
            .await;
        let mut chunks = match chunked {
            Ok(chunks) => chunks,
            Err(err) => return Err(Self::fail(&mut job, err)),
        };
        job.transition(DocumentEvent::StageSucceeded)?;

        // Embedding
        let chunks_ref = &chunks;
        let embedded = self
            .retry
            .execute(operations::EMBEDDING, &self.service_policy, |_| async move {
                let vectors = self.collaborators.embedder.embed(chunks_ref).await?;
                if vectors.len() != chunks_ref.len() {
                    return Err(IndexerError::service(
                        operations::EMBEDDING,
                        format!("{} embeddings for {} chunks", vectors.len(), chunks_ref.len()),
                    ));
                }
                Ok(vectors)
            })
            .await;
        match embedded {
            Ok(vectors) => {
                for (chunk, vector) in chunks.iter_mut().zip(vectors) {
                    chunk.embedding = Some(vector);
                }
            }
            Err(err) => return Err(Self::fail(&mut job, err)),
        }
        job.transition(DocumentEvent::StageSucceeded)?;

        // Publishing
        let published = self
            .retry
            .execute(operations::ADD_DOCUMENTS, &self.service_policy, |_| {
                self.publisher.publish(index_name, &chunks)
            })
            .await;
        if let Err(err) = published {
            return Err(Self::fail(&mut job, err));
        }
        job.transition(DocumentEvent::StageSucceeded)?;

        log_document_operation(
            operations::INDEX_DOCUMENT,
            self.run_id,
            &blob_label,
            attempt,
            "completed",
            Some(&format!("{} chunks", chunks.len())),
        );
        Ok(job)
    }

    fn fail(job: &mut DocumentJob, err: IndexerError) -> IndexerError {
        let stage = job.stage();
        if let Err(transition_err) = job.transition(DocumentEvent::fail_with_error(err.to_string())) {
            warn!(error = %transition_err, "Could not mark document job failed");
        }
        warn!(
            blob = %job.blob_ref(),
            stage = %stage,
            attempt = job.attempt_count(),
            error = %err,
            "Document pipeline failed"
        );
        IndexerError::DocumentFailed {
            blob: job.blob_ref().to_string(),
            stage,
            source: Box::new(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{Chunker, SearchIndex};
    use crate::test_helpers::{stub_collaborators, StubEmbedder};
    use std::sync::Arc;

    fn pages(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_page_number_for_offset() {
        let pages = pages(&["ab", "cd"]);
        assert_eq!(page_number_for_offset(0, &pages).unwrap(), 0);
        assert_eq!(page_number_for_offset(1, &pages).unwrap(), 0);
        assert_eq!(page_number_for_offset(2, &pages).unwrap(), 1);
        assert_eq!(page_number_for_offset(3, &pages).unwrap(), 1);
        assert!(matches!(
            page_number_for_offset(4, &pages),
            Err(IndexerError::OutOfRange { position: 4, total_length: 4 })
        ));
        assert!(page_number_for_offset(40, &pages).is_err());
    }

    #[test]
    fn test_empty_pages_are_skipped() {
        let pages = pages(&["ab", "", "cd"]);
        assert_eq!(page_number_for_offset(2, &pages).unwrap(), 2);
    }

    #[test]
    fn test_span_end_is_exclusive() {
        let document = Document {
            pages: pages(&["ab", "cd"]),
            url: "file:///a".to_string(),
            filename: "a".to_string(),
            blob_ref: BlobReference::new("local", "source", "a"),
        };
        let spans = vec![TextSpan {
            text: "ab".to_string(),
            start_index: 0,
            end_index: 2,
            token_count: 1,
        }];

        let chunks = spans_to_chunks(&document, spans).unwrap();
        assert_eq!(chunks[0].start_page, 0);
        assert_eq!(chunks[0].end_page, 0);
    }

    #[test]
    fn test_span_past_text_is_out_of_range() {
        let document = Document {
            pages: pages(&["ab"]),
            url: "file:///a".to_string(),
            filename: "a".to_string(),
            blob_ref: BlobReference::new("local", "source", "a"),
        };
        let spans = vec![TextSpan {
            text: "abc".to_string(),
            start_index: 0,
            end_index: 4,
            token_count: 1,
        }];
        assert!(matches!(
            spans_to_chunks(&document, spans),
            Err(IndexerError::OutOfRange { .. })
        ));
    }

    #[tokio::test]
    async fn test_pipeline_walks_every_stage() {
        let collaborators = stub_collaborators(&["a.txt"]);
        let search = collaborators.search.clone();
        search.ensure_index("docs").await.unwrap();
        let pipeline = DocumentPipeline::new(
            collaborators.collaborators(),
            RetryPolicy::no_retry(),
            Uuid::new_v4(),
        );

        let blob = BlobReference::new("local", "source", "a.txt");
        let job = pipeline.run(&blob, "docs", 1).await.unwrap();

        assert_eq!(job.stage(), DocumentStage::Completed);
        assert_eq!(search.uploaded_ids("docs").len(), 1);
    }

    #[tokio::test]
    async fn test_embedding_failure_names_stage() {
        let mut stubs = stub_collaborators(&["a.txt"]);
        stubs.embedder = Arc::new(StubEmbedder::failing_first(u32::MAX));
        let pipeline = DocumentPipeline::new(stubs.collaborators(), RetryPolicy::no_retry(), Uuid::new_v4());

        let blob = BlobReference::new("local", "source", "a.txt");
        let err = pipeline.run(&blob, "docs", 1).await.unwrap_err();

        match err {
            IndexerError::DocumentFailed { stage, .. } => assert_eq!(stage, DocumentStage::Embedding),
            other => panic!("unexpected error: {other}"),
        }
        assert!(stubs.search.uploaded_ids("docs").is_empty());
    }

    #[tokio::test]
    async fn test_short_embedding_response_fails_document() {
        let mut stubs = stub_collaborators(&["a.txt"]);
        stubs.embedder = Arc::new(StubEmbedder::dropping_last_vector());
        stubs.search.ensure_index("docs").await.unwrap();
        let pipeline = DocumentPipeline::new(stubs.collaborators(), RetryPolicy::no_retry(), Uuid::new_v4());

        let blob = BlobReference::new("local", "source", "a.txt");
        let err = pipeline.run(&blob, "docs", 1).await.unwrap_err();

        match &err {
            IndexerError::DocumentFailed { stage, .. } => assert_eq!(*stage, DocumentStage::Embedding),
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("0 embeddings for 1 chunks"), "unexpected error: {err}");
        assert!(!err.is_retryable());
        assert_eq!(stubs.search.upload_calls(), 0);
        assert!(stubs.search.uploaded_ids("docs").is_empty());
    }

    struct OverrunChunker;

    impl Chunker for OverrunChunker {
        fn chunk(&self, document: &Document) -> Result<Vec<TextSpan>> {
            let length = document.full_text().chars().count();
            Ok(vec![TextSpan {
                text: document.full_text(),
                start_index: length + 1,
                end_index: length + 5,
                token_count: 1,
            }])
        }
    }

    #[tokio::test]
    async fn test_out_of_range_is_a_chunking_failure() {
        let mut stubs = stub_collaborators(&["a.txt"]);
        stubs.chunker = Arc::new(OverrunChunker);
        let pipeline = DocumentPipeline::new(stubs.collaborators(), RetryPolicy::no_retry(), Uuid::new_v4());

        let blob = BlobReference::new("local", "source", "a.txt");
        let err = pipeline.run(&blob, "docs", 1).await.unwrap_err();

        assert!(!err.is_retryable());
        assert!(matches!(err.root_cause(), IndexerError::OutOfRange { .. }));
        assert_eq!(stubs.embedder.call_count(), 0);
    }
}
