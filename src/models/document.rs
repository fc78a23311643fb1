use super::BlobReference;
use serde::{Deserialize, Serialize};

/// Extracted text of one blob, one entry per source page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub pages: Vec<String>,
    pub url: String,
    pub filename: String,
    pub blob_ref: BlobReference,
}

impl Document {
    /// Concatenation of every page, the text chunk offsets refer to
    pub fn full_text(&self) -> String {
        self.pages.concat()
    }
}

/// Raw chunker output: a span of the concatenated page text.
///
/// `start_index` is inclusive and `end_index` exclusive, both in chars.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextSpan {
    pub text: String,
    pub start_index: usize,
    pub end_index: usize,
    pub token_count: usize,
}

/// A span of a document mapped back onto its source pages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub filename: String,
    pub url: String,
    pub text: String,
    pub start_page: usize,
    pub end_page: usize,
    pub start_index: usize,
    pub end_index: usize,
    pub token_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

/// Document shape uploaded to the search index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchDocument {
    pub id: String,
    pub content: String,
    pub sourcepages: String,
    pub sourcefile: String,
    #[serde(rename = "storageUrl")]
    pub storage_url: String,
    pub embedding: Vec<f32>,
}
