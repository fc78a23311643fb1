use super::Cursor;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// Durable status of an indexing run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Invalid run status: {s}")),
        }
    }
}

/// A document that failed permanently while the run kept going
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedDocument {
    pub blob: String,
    pub error: String,
}

/// Everything needed to resume a run after a crash.
///
/// `cursor` always points just past the last committed page.
/// `completed_documents` is the ledger for the page currently in flight and
/// is cleared every time a page commits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowCheckpoint {
    pub run_id: Uuid,
    pub index_name: String,
    pub container_name: String,
    pub cursor: Cursor,
    pub completed_pages: u64,
    pub documents_completed: u64,
    #[serde(default)]
    pub completed_documents: BTreeSet<String>,
    #[serde(default)]
    pub failed_documents: Vec<FailedDocument>,
    pub status: RunStatus,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowCheckpoint {
    pub fn new(
        run_id: Uuid,
        index_name: impl Into<String>,
        container_name: impl Into<String>,
        cursor: Cursor,
    ) -> Self {
        let now = Utc::now();
        Self {
            run_id,
            index_name: index_name.into(),
            container_name: container_name.into(),
            cursor,
            completed_pages: 0,
            documents_completed: 0,
            completed_documents: BTreeSet::new(),
            failed_documents: Vec::new(),
            status: RunStatus::Running,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Record a joined page: move the cursor and clear the in-flight ledger
    pub fn commit_page(&mut self, next_cursor: Cursor, documents_completed: u64) {
        self.cursor = next_cursor;
        self.completed_pages += 1;
        self.documents_completed += documents_completed;
        self.completed_documents.clear();
        self.touch();
    }

    pub fn mark(&mut self, status: RunStatus, error: Option<String>) {
        self.status = status;
        self.last_error = error;
        self.touch();
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Outcome of a finished run, derived from its final checkpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub index_name: String,
    pub status: RunStatus,
    pub pages_committed: u64,
    pub documents_completed: u64,
    pub failed_documents: Vec<FailedDocument>,
}

impl From<&WorkflowCheckpoint> for RunSummary {
    fn from(checkpoint: &WorkflowCheckpoint) -> Self {
        Self {
            run_id: checkpoint.run_id,
            index_name: checkpoint.index_name.clone(),
            status: checkpoint.status,
            pages_committed: checkpoint.completed_pages,
            documents_completed: checkpoint.documents_completed,
            failed_documents: checkpoint.failed_documents.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_page_clears_ledger_and_moves_cursor() {
        let mut checkpoint =
            WorkflowCheckpoint::new(Uuid::new_v4(), "docs", "source", Cursor::default());
        checkpoint.completed_documents.insert("acct/source/a".to_string());

        let mut next = Cursor::default();
        next.continuation_token = Some("b".to_string());
        checkpoint.commit_page(next.clone(), 2);

        assert_eq!(checkpoint.cursor, next);
        assert_eq!(checkpoint.completed_pages, 1);
        assert_eq!(checkpoint.documents_completed, 2);
        assert!(checkpoint.completed_documents.is_empty());
    }

    #[test]
    fn test_checkpoint_json_shape() {
        let checkpoint =
            WorkflowCheckpoint::new(Uuid::new_v4(), "docs", "source", Cursor::default());
        let json = serde_json::to_value(&checkpoint).unwrap();

        assert_eq!(json["status"], "running");
        assert_eq!(json["cursor"]["prefix_offset"], 0);
        assert_eq!(json["cursor"]["prefix_list"][0], "");
    }

    #[test]
    fn test_run_status_parsing() {
        assert_eq!("cancelled".parse::<RunStatus>().unwrap(), RunStatus::Cancelled);
        assert!("paused".parse::<RunStatus>().is_err());
        assert!(RunStatus::Failed.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
    }
}
