use crate::error::{IndexerError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Cooperative cancellation flag shared between a run and its controller.
///
/// Checked between pages and before each pipeline instance starts; work
/// already in flight is allowed to finish.
#[derive(Debug, Clone, Default)]
pub struct CancellationSignal {
    cancelled: Arc<AtomicBool>,
}

impl CancellationSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::AcqRel) {
            info!("Cancellation requested");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Fail with [`IndexerError::Cancelled`] if cancellation was requested
    pub fn check(&self, context: &str) -> Result<()> {
        if self.is_cancelled() {
            return Err(IndexerError::Cancelled(context.to_string()));
        }
        Ok(())
    }
}
