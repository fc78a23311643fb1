use super::{events::DocumentEvent, states::DocumentStage};
use crate::error::{IndexerError, Result};
use crate::models::BlobReference;
use tracing::debug;

/// One document's progress through crack → chunk → embed → publish.
///
/// Owned exclusively by the pipeline attempt that created it; only the
/// terminal stage is reported upward.
#[derive(Debug, Clone)]
pub struct DocumentJob {
    blob_ref: BlobReference,
    attempt_count: u32,
    stage: DocumentStage,
    failure: Option<String>,
}

impl DocumentJob {
    pub fn new(blob_ref: BlobReference, attempt_count: u32) -> Self {
        Self {
            blob_ref,
            attempt_count,
            stage: DocumentStage::default(),
            failure: None,
        }
    }

    pub fn blob_ref(&self) -> &BlobReference {
        &self.blob_ref
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    pub fn stage(&self) -> DocumentStage {
        self.stage
    }

    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// Apply an event, returning the new stage
    pub fn transition(&mut self, event: DocumentEvent) -> Result<DocumentStage> {
        let target = Self::determine_target_stage(self.stage, &event)?;

        debug!(
            blob = %self.blob_ref.name,
            attempt = self.attempt_count,
            from = %self.stage,
            to = %target,
            event = event.event_type(),
            "Document stage transition"
        );

        if let DocumentEvent::Fail(message) = event {
            self.failure = Some(message);
        }
        self.stage = target;
        Ok(target)
    }

    fn determine_target_stage(
        current: DocumentStage,
        event: &DocumentEvent,
    ) -> Result<DocumentStage> {
        let target = match (current, event) {
            (DocumentStage::Cracking, DocumentEvent::StageSucceeded) => DocumentStage::Chunking,
            (DocumentStage::Chunking, DocumentEvent::StageSucceeded) => DocumentStage::Embedding,
            (DocumentStage::Embedding, DocumentEvent::StageSucceeded) => DocumentStage::Publishing,
            (DocumentStage::Publishing, DocumentEvent::StageSucceeded) => DocumentStage::Completed,

            (stage, DocumentEvent::Fail(_)) if !stage.is_terminal() => DocumentStage::Failed,

            (from, event) => {
                return Err(IndexerError::InvalidTransition {
                    from: from.to_string(),
                    event: event.event_type().to_string(),
                })
            }
        };

        Ok(target)
    }
}
