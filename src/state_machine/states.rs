use serde::{Deserialize, Serialize};
use std::fmt;

/// Stages of a single document's pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStage {
    /// Extracting page text from the source blob
    Cracking,
    /// Splitting extracted text into overlapping chunks
    Chunking,
    /// Computing an embedding for every chunk
    Embedding,
    /// Uploading embedded chunks to the search index
    Publishing,
    /// All stages finished
    Completed,
    /// A stage failed permanently
    Failed,
}

impl DocumentStage {
    /// Check if this is a terminal stage (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Operation name used for retry bookkeeping and logging
    pub fn operation_name(&self) -> &'static str {
        match self {
            Self::Cracking => crate::constants::operations::DOCUMENT_CRACKING,
            Self::Chunking => crate::constants::operations::CHUNKING,
            Self::Embedding => crate::constants::operations::EMBEDDING,
            Self::Publishing => crate::constants::operations::ADD_DOCUMENTS,
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for DocumentStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cracking => write!(f, "cracking"),
            Self::Chunking => write!(f, "chunking"),
            Self::Embedding => write!(f, "embedding"),
            Self::Publishing => write!(f, "publishing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Phases of the top-level indexing run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    /// Validating configuration and restoring any checkpoint
    Init,
    /// Creating the target index if it does not exist
    EnsureIndex,
    /// Fetching the next page of blob references
    Paginate,
    /// Dispatching document pipelines for the current page
    FanOut,
    /// Waiting for every pipeline of the page to finish
    Join,
    /// Source exhausted, every page committed
    Done,
    /// Run halted by a permanent failure
    Failed,
    /// Run stopped by the cancellation signal
    Cancelled,
}

impl RunPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "init"),
            Self::EnsureIndex => write!(f, "ensure_index"),
            Self::Paginate => write!(f, "paginate"),
            Self::FanOut => write!(f, "fan_out"),
            Self::Join => write!(f, "join"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl Default for DocumentStage {
    fn default() -> Self {
        Self::Cracking
    }
}

impl Default for RunPhase {
    fn default() -> Self {
        Self::Init
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_stage_terminal_check() {
        assert!(DocumentStage::Completed.is_terminal());
        assert!(DocumentStage::Failed.is_terminal());
        assert!(!DocumentStage::Cracking.is_terminal());
        assert!(!DocumentStage::Publishing.is_terminal());
    }

    #[test]
    fn test_run_phase_terminal_check() {
        assert!(RunPhase::Done.is_terminal());
        assert!(RunPhase::Cancelled.is_terminal());
        assert!(!RunPhase::Join.is_terminal());
    }

    #[test]
    fn test_state_serde() {
        let json = serde_json::to_string(&DocumentStage::Embedding).unwrap();
        assert_eq!(json, "\"embedding\"");

        let parsed: RunPhase = serde_json::from_str("\"ensure_index\"").unwrap();
        assert_eq!(parsed, RunPhase::EnsureIndex);
    }
}
