use super::BlobReference;
use serde::{Deserialize, Serialize};

/// Position within a multi-prefix, token-paginated enumeration of blobs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub prefix_list: Vec<String>,
    pub prefix_offset: usize,
    pub continuation_token: Option<String>,
}

impl Cursor {
    /// Start of the enumeration. An empty prefix list means "all documents".
    pub fn new(prefix_list: Vec<String>) -> Self {
        let prefix_list = if prefix_list.is_empty() {
            vec![String::new()]
        } else {
            prefix_list
        };

        Self {
            prefix_list,
            prefix_offset: 0,
            continuation_token: None,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.prefix_offset >= self.prefix_list.len()
    }

    pub fn current_prefix(&self) -> Option<&str> {
        self.prefix_list.get(self.prefix_offset).map(String::as_str)
    }

    /// Move past the current prefix
    pub fn advance_prefix(&mut self) {
        self.prefix_offset += 1;
        self.continuation_token = None;
    }
}

impl Default for Cursor {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

/// One batch of blob references plus the cursor to resume after it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub blobs: Vec<BlobReference>,
    pub next_cursor: Cursor,
    pub exhausted: bool,
}

impl Page {
    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }
}
