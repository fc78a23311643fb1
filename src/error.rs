//! # Indexer Error Types
//!
//! One error enum for the whole crate. The variants follow the run's failure
//! taxonomy: configuration problems are fatal before any work starts,
//! transient service faults are retried, permanent stage failures fail the
//! owning document, and out-of-range offsets are fatal for a document.

use crate::state_machine::DocumentStage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Transient service error in {service}: {message}")]
    TransientService { service: String, message: String },

    #[error("Service error in {service}: {message}")]
    Service { service: String, message: String },

    #[error("{operation} failed permanently after {attempts} attempt(s): {source}")]
    PermanentStage {
        operation: String,
        attempts: u32,
        #[source]
        source: Box<IndexerError>,
    },

    #[error("Position {position} out of range for extracted text of length {total_length}")]
    OutOfRange { position: usize, total_length: usize },

    #[error("Document {blob} failed during {stage}: {source}")]
    DocumentFailed {
        blob: String,
        stage: DocumentStage,
        #[source]
        source: Box<IndexerError>,
    },

    #[error("Invalid state transition from {from} on {event}")]
    InvalidTransition { from: String, event: String },

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("Run cancelled: {0}")]
    Cancelled(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "postgres")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl IndexerError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn transient(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TransientService {
            service: service.into(),
            message: message.into(),
        }
    }

    pub fn service(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Service {
            service: service.into(),
            message: message.into(),
        }
    }

    pub fn checkpoint(message: impl Into<String>) -> Self {
        Self::Checkpoint(message.into())
    }

    /// Whether another attempt of the failed operation could succeed.
    ///
    /// A permanent stage failure stays retryable at an outer level only when
    /// its root cause was transient, so the document-level policy can re-run
    /// a pipeline whose stage exhausted its own retries. Chunking failures are
    /// data errors and never retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::TransientService { .. } => true,
            Self::PermanentStage { source, .. } => source.is_retryable(),
            Self::DocumentFailed { stage, source, .. } => {
                *stage != DocumentStage::Chunking && source.is_retryable()
            }
            _ => false,
        }
    }

    /// Errors that must halt the run regardless of the fan-out failure policy.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Configuration(_) | Self::Checkpoint(_) | Self::Cancelled(_) => true,
            #[cfg(feature = "postgres")]
            Self::Database(_) => true,
            Self::PermanentStage { source, .. } => source.is_fatal(),
            _ => false,
        }
    }

    /// The innermost error in a chain of permanent/document wrappers.
    pub fn root_cause(&self) -> &IndexerError {
        match self {
            Self::PermanentStage { source, .. } | Self::DocumentFailed { source, .. } => {
                source.root_cause()
            }
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, IndexerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors_are_retryable() {
        assert!(IndexerError::transient("embedding", "429").is_retryable());
        assert!(!IndexerError::service("embedding", "400").is_retryable());
        assert!(!IndexerError::OutOfRange {
            position: 4,
            total_length: 4
        }
        .is_retryable());
    }

    #[test]
    fn test_exhausted_transient_stays_retryable_for_outer_policy() {
        let exhausted = IndexerError::PermanentStage {
            operation: "document_cracking".to_string(),
            attempts: 3,
            source: Box::new(IndexerError::transient("cracking", "timeout")),
        };
        assert!(exhausted.is_retryable());

        let failed = IndexerError::DocumentFailed {
            blob: "a.pdf".to_string(),
            stage: DocumentStage::Cracking,
            source: Box::new(exhausted),
        };
        assert!(failed.is_retryable());
    }

    #[test]
    fn test_chunking_failures_never_retry() {
        let failed = IndexerError::DocumentFailed {
            blob: "a.pdf".to_string(),
            stage: DocumentStage::Chunking,
            source: Box::new(IndexerError::transient("chunking", "odd")),
        };
        assert!(!failed.is_retryable());
    }

    #[test]
    fn test_root_cause_unwraps_nested_failures() {
        let err = IndexerError::DocumentFailed {
            blob: "a.pdf".to_string(),
            stage: DocumentStage::Chunking,
            source: Box::new(IndexerError::OutOfRange {
                position: 9,
                total_length: 4,
            }),
        };
        assert!(matches!(
            err.root_cause(),
            IndexerError::OutOfRange { position: 9, .. }
        ));
        assert!(err.to_string().contains("a.pdf"));
        assert!(err.to_string().contains("chunking"));
    }

    #[test]
    fn test_configuration_errors_are_fatal() {
        assert!(IndexerError::configuration("BLOB_CONTAINER_NAME is not set").is_fatal());
        assert!(!IndexerError::transient("listing", "reset").is_fatal());
    }

    #[cfg(feature = "postgres")]
    #[test]
    fn test_database_errors_are_fatal() {
        let err = IndexerError::from(sqlx::Error::RowNotFound);
        assert!(err.is_fatal());
        assert!(!err.is_retryable());
    }
}
