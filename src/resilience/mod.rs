//! # Resilience Module
//!
//! Fault handling shared by every stage of a run:
//!
//! - **Retry Executor**: fixed-interval retries with an attempt ceiling
//! - **Cancellation**: a cooperative stop signal checked between units of work
//!
//! ## Usage
//!
//! ```rust,no_run
//! use blob_indexer::resilience::{RetryExecutor, RetryPolicy};
//! use std::time::Duration;
//!
//! # async fn example() -> blob_indexer::Result<()> {
//! let policy = RetryPolicy::new(Duration::from_secs(3), 3)?;
//! let value = RetryExecutor::new()
//!     .execute("embedding", &policy, |_attempt| async { Ok::<_, blob_indexer::IndexerError>(42) })
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod cancellation;
pub mod retry;

pub use cancellation::CancellationSignal;
pub use retry::{RetryExecutor, RetryPolicy};
