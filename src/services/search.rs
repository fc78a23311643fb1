//! Search-index publishing: deterministic document ids, batching, and a
//! directory-backed reference index.

use super::SearchIndex;
use crate::constants::MAX_PUBLISH_BATCH_SIZE;
use crate::error::{IndexerError, Result};
use crate::models::{Chunk, SearchDocument};
use async_trait::async_trait;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

const SERVICE: &str = "search";

/// `file-{sanitized}-{HEX}`: chars outside `[0-9A-Za-z_-]` become `_`, and
/// the hex part is the upper-case base16 of the UTF-8 filename
pub fn filename_to_id(filename: &str) -> String {
    let sanitized: String = filename
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let mut hex = String::with_capacity(filename.len() * 2);
    for byte in filename.as_bytes() {
        let _ = write!(hex, "{byte:02X}");
    }

    format!("file-{sanitized}-{hex}")
}

/// Id of the chunk at `ordinal` in the document's full chunk list
pub fn document_id(filename: &str, ordinal: usize) -> String {
    format!("{}-chunk-{ordinal}", filename_to_id(filename))
}

/// `"{filename}#pages=p1,p2,..."` with 1-based page numbers
pub fn source_pages(chunk: &Chunk) -> String {
    let pages: Vec<String> = (chunk.start_page + 1..=chunk.end_page + 1)
        .map(|page| page.to_string())
        .collect();
    format!("{}#pages={}", chunk.filename, pages.join(","))
}

/// The URL with its query string removed
pub fn strip_query(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut parsed) => {
            parsed.set_query(None);
            parsed.to_string()
        }
        Err(_) => raw.split('?').next().unwrap_or(raw).to_string(),
    }
}

/// Converts embedded chunks into search documents and uploads them in
/// batches of at most [`MAX_PUBLISH_BATCH_SIZE`]
#[derive(Clone)]
pub struct IndexPublisher {
    search_index: Arc<dyn SearchIndex>,
}

impl IndexPublisher {
    pub fn new(search_index: Arc<dyn SearchIndex>) -> Self {
        Self { search_index }
    }

    /// Build the upload batches without sending them
    pub fn build_batches(chunks: &[Chunk]) -> Result<Vec<Vec<SearchDocument>>> {
        let documents = chunks
            .iter()
            .enumerate()
            .map(|(ordinal, chunk)| {
                let embedding = chunk.embedding.clone().ok_or_else(|| {
                    IndexerError::service(
                        SERVICE,
                        format!("chunk {ordinal} of {} has no embedding", chunk.filename),
                    )
                })?;
                Ok(SearchDocument {
                    id: document_id(&chunk.filename, ordinal),
                    content: chunk.text.clone(),
                    sourcepages: source_pages(chunk),
                    sourcefile: chunk.filename.clone(),
                    storage_url: strip_query(&chunk.url),
                    embedding,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(documents
            .chunks(MAX_PUBLISH_BATCH_SIZE)
            .map(<[SearchDocument]>::to_vec)
            .collect())
    }

    /// Upload every chunk; returns the number of batches sent
    pub async fn publish(&self, index_name: &str, chunks: &[Chunk]) -> Result<usize> {
        let batches = Self::build_batches(chunks)?;
        for batch in &batches {
            self.search_index.upload_documents(index_name, batch).await?;
        }
        debug!(
            index = %index_name,
            chunks = chunks.len(),
            batches = batches.len(),
            "Published chunks"
        );
        Ok(batches.len())
    }
}

/// One directory per index, one JSON file per document id.
///
/// Uploading an existing id overwrites it.
#[derive(Debug, Clone)]
pub struct FsSearchIndex {
    root: PathBuf,
}

impl FsSearchIndex {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn index_dir(&self, index_name: &str) -> Result<PathBuf> {
        let valid = !index_name.is_empty()
            && index_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(IndexerError::service(
                SERVICE,
                format!("invalid index name: {index_name:?}"),
            ));
        }
        Ok(self.root.join(index_name))
    }

    /// Read back one stored document
    pub async fn get_document(&self, index_name: &str, id: &str) -> Result<SearchDocument> {
        let path = self.index_dir(index_name)?.join(format!("{id}.json"));
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|_| IndexerError::NotFound(format!("{index_name}/{id}")))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Number of documents stored in an index
    pub async fn document_count(&self, index_name: &str) -> Result<usize> {
        let mut entries = tokio::fs::read_dir(self.index_dir(index_name)?).await?;
        let mut count = 0;
        while let Some(entry) = entries.next_entry().await? {
            if entry.path().extension().map_or(false, |ext| ext == "json") {
                count += 1;
            }
        }
        Ok(count)
    }
}

#[async_trait]
impl SearchIndex for FsSearchIndex {
    async fn ensure_index(&self, index_name: &str) -> Result<()> {
        let dir = self.index_dir(index_name)?;
        if tokio::fs::try_exists(&dir).await? {
            debug!(index = %index_name, "Search index already exists");
            return Ok(());
        }
        tokio::fs::create_dir_all(&dir).await?;
        info!(index = %index_name, "Created search index");
        Ok(())
    }

    async fn upload_documents(
        &self,
        index_name: &str,
        documents: &[SearchDocument],
    ) -> Result<()> {
        let dir = self.index_dir(index_name)?;
        if !tokio::fs::try_exists(&dir).await? {
            return Err(IndexerError::service(
                SERVICE,
                format!("index {index_name} does not exist"),
            ));
        }

        for document in documents {
            let path = dir.join(format!("{}.json", document.id));
            tokio::fs::write(&path, serde_json::to_vec(document)?).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn embedded_chunk(filename: &str, text: &str) -> Chunk {
        Chunk {
            filename: filename.to_string(),
            url: "https://acct.blob.core.windows.net/source/a.pdf?sig=abc".to_string(),
            text: text.to_string(),
            start_page: 0,
            end_page: 2,
            start_index: 0,
            end_index: text.len(),
            token_count: 1,
            embedding: Some(vec![0.5, 0.5]),
        }
    }

    #[test]
    fn test_filename_to_id_sanitizes_and_hex_encodes() {
        assert_eq!(filename_to_id("a.pdf"), "file-a_pdf-612E706466");
        assert_eq!(document_id("a b", 3), "file-a_b-612062-chunk-3");
        assert_eq!(filename_to_id("é"), "file-_-C3A9");
    }

    #[test]
    fn test_source_pages_are_one_based_and_inclusive() {
        let chunk = embedded_chunk("a.pdf", "text");
        assert_eq!(source_pages(&chunk), "a.pdf#pages=1,2,3");
    }

    #[test]
    fn test_strip_query_keeps_path() {
        assert_eq!(
            strip_query("https://acct.blob.core.windows.net/source/a.pdf?sig=abc"),
            "https://acct.blob.core.windows.net/source/a.pdf"
        );
        assert_eq!(strip_query("not a url?x=1"), "not a url");
    }

    #[test]
    fn test_batches_use_document_wide_ordinals() {
        let chunks: Vec<Chunk> = (0..2500)
            .map(|i| embedded_chunk("a.pdf", &format!("chunk {i}")))
            .collect();

        let batches = IndexPublisher::build_batches(&chunks).unwrap();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].len(), 1000);
        assert_eq!(batches[2].len(), 500);
        assert_eq!(batches[1][0].id, document_id("a.pdf", 1000));
        assert_eq!(batches[2][499].id, document_id("a.pdf", 2499));

        let mut ids: Vec<_> = batches.iter().flatten().map(|d| d.id.clone()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 2500);
    }

    #[test]
    fn test_missing_embedding_is_rejected() {
        let mut chunk = embedded_chunk("a.pdf", "x");
        chunk.embedding = None;
        assert!(IndexPublisher::build_batches(&[chunk]).is_err());
    }

    #[tokio::test]
    async fn test_fs_index_upload_is_idempotent() {
        let dir = tempfile::TempDir::new().unwrap();
        let index = Arc::new(FsSearchIndex::new(dir.path()));
        index.ensure_index("docs").await.unwrap();
        index.ensure_index("docs").await.unwrap();

        let publisher = IndexPublisher::new(index.clone());
        let chunks = vec![embedded_chunk("a.pdf", "one"), embedded_chunk("a.pdf", "two")];
        assert_eq!(publisher.publish("docs", &chunks).await.unwrap(), 1);
        assert_eq!(publisher.publish("docs", &chunks).await.unwrap(), 1);

        assert_eq!(index.document_count("docs").await.unwrap(), 2);
        let stored = index
            .get_document("docs", &document_id("a.pdf", 1))
            .await
            .unwrap();
        assert_eq!(stored.content, "two");
        assert_eq!(stored.storage_url, "https://acct.blob.core.windows.net/source/a.pdf");
    }

    #[tokio::test]
    async fn test_upload_to_missing_index_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let index = FsSearchIndex::new(dir.path());
        assert!(index.upload_documents("missing", &[]).await.is_err());
    }
}
