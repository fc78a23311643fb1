use serde::{Deserialize, Serialize};

/// Events that move a document through its pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum DocumentEvent {
    /// The current stage's collaborator call succeeded
    StageSucceeded,
    /// The current stage failed permanently
    Fail(String),
}

impl DocumentEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::StageSucceeded => "stage_succeeded",
            Self::Fail(_) => "fail",
        }
    }

    pub fn fail_with_error(error: impl Into<String>) -> Self {
        Self::Fail(error.into())
    }
}

/// Events that move the indexing run between phases
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum RunEvent {
    /// Configuration validated
    Validated,
    /// Target index exists
    IndexReady,
    /// A non-empty page arrived
    PageFetched,
    /// An empty page arrived, the source is exhausted
    SourceExhausted,
    /// Every pipeline of the page was dispatched
    Dispatched,
    /// The page's pipelines all reached a terminal stage
    Joined,
    /// A permanent failure halted the run
    Fail(String),
    /// The cancellation signal was observed
    Cancel,
}

impl RunEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Validated => "validated",
            Self::IndexReady => "index_ready",
            Self::PageFetched => "page_fetched",
            Self::SourceExhausted => "source_exhausted",
            Self::Dispatched => "dispatched",
            Self::Joined => "joined",
            Self::Fail(_) => "fail",
            Self::Cancel => "cancel",
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Fail(msg) => Some(msg),
            _ => None,
        }
    }
}
