//! # Pagination Cursor
//!
//! Walks a multi-prefix, token-paginated blob listing one page at a time.
//! Identical cursors over identical listing responses always produce
//! identical pages, which is what makes a resumed run replay the same
//! sequence of listing calls.

use crate::constants::operations;
use crate::error::{IndexerError, Result};
use crate::models::{Cursor, Page};
use crate::resilience::{RetryExecutor, RetryPolicy};
use crate::services::BlobLister;
use std::sync::Arc;
use tracing::{debug, instrument};

pub struct PaginationCursor {
    lister: Arc<dyn BlobLister>,
    container: String,
    retry: RetryExecutor,
    policy: RetryPolicy,
}

impl PaginationCursor {
    pub fn new(lister: Arc<dyn BlobLister>, container: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            lister,
            container: container.into(),
            retry: RetryExecutor::new(),
            policy,
        }
    }

    /// Fetch the page that starts at `cursor`.
    ///
    /// A page is empty only when the whole enumeration is finished: empty
    /// listing segments (an empty prefix, or an empty segment that still
    /// carries a token) are skipped within the same call. A cursor already
    /// past its last prefix yields an empty exhausted page without listing.
    #[instrument(skip(self, cursor), fields(container = %self.container, offset = cursor.prefix_offset))]
    pub async fn next_page(&self, cursor: &Cursor, page_size: usize) -> Result<Page> {
        if page_size == 0 {
            return Err(IndexerError::configuration("page size must be at least 1"));
        }

        let mut next = if cursor.prefix_list.is_empty() {
            Cursor {
                prefix_offset: cursor.prefix_offset,
                ..Cursor::default()
            }
        } else {
            cursor.clone()
        };

        loop {
            let Some(prefix) = next.current_prefix().map(str::to_string) else {
                debug!("Enumeration exhausted");
                return Ok(Page {
                    blobs: Vec::new(),
                    next_cursor: next,
                    exhausted: true,
                });
            };
            let token = next.continuation_token.clone();

            let segment = self
                .retry
                .execute(operations::LIST_BLOBS_CHUNK, &self.policy, |_attempt| {
                    self.lister
                        .list(&self.container, &prefix, token.as_deref(), page_size)
                })
                .await?;

            debug!(
                prefix = %prefix,
                returned = segment.blobs.len(),
                has_token = segment.next_token.is_some(),
                "Listing segment received"
            );

            match segment.next_token {
                Some(next_token) => {
                    if segment.blobs.is_empty() && token.as_deref() == Some(next_token.as_str()) {
                        return Err(IndexerError::service(
                            operations::LIST_BLOBS_CHUNK,
                            format!("listing of prefix {prefix:?} returned the same token without results"),
                        ));
                    }
                    next.continuation_token = Some(next_token);
                }
                None => next.advance_prefix(),
            }

            if !segment.blobs.is_empty() {
                let exhausted = next.is_exhausted();
                return Ok(Page {
                    blobs: segment.blobs,
                    next_cursor: next,
                    exhausted,
                });
            }
        }
    }
}
