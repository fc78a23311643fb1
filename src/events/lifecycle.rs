use crate::constants::events as names;
use serde::Serialize;

/// Something that happened to a run, one of its pages or one of its documents
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum IndexingEvent {
    RunStarted { index_name: String },
    RunResumed { completed_pages: u64 },
    RunCompleted { pages: u64, documents: u64 },
    RunFailed { error: String },
    RunCancelled { completed_pages: u64 },
    /// `page` is 1-based and counts committed pages plus this one
    PageFetched { page: u64, documents: usize },
    PageCommitted { page: u64, documents: u64 },
    DocumentDispatched { blob: String },
    /// Already in the completion ledger
    DocumentSkipped { blob: String },
    DocumentCompleted { blob: String, attempts: u32 },
    DocumentFailed { blob: String, error: String },
}

impl IndexingEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::RunStarted { .. } => names::RUN_STARTED,
            Self::RunResumed { .. } => names::RUN_RESUMED,
            Self::RunCompleted { .. } => names::RUN_COMPLETED,
            Self::RunFailed { .. } => names::RUN_FAILED,
            Self::RunCancelled { .. } => names::RUN_CANCELLED,
            Self::PageFetched { .. } => names::PAGE_FETCHED,
            Self::PageCommitted { .. } => names::PAGE_COMMITTED,
            Self::DocumentDispatched { .. } => names::DOCUMENT_DISPATCHED,
            Self::DocumentSkipped { .. } => names::DOCUMENT_SKIPPED,
            Self::DocumentCompleted { .. } => names::DOCUMENT_COMPLETED,
            Self::DocumentFailed { .. } => names::DOCUMENT_FAILED,
        }
    }

    /// Last event a run emits before its task returns
    pub fn ends_run(&self) -> bool {
        matches!(
            self,
            Self::RunCompleted { .. } | Self::RunFailed { .. } | Self::RunCancelled { .. }
        )
    }
}
