//! # Client Factory
//!
//! Builds the collaborator set and the checkpoint store once per process
//! from [`IndexerSettings`]. Components receive them explicitly at
//! construction; nothing is cached in globals.

use crate::checkpoint::{CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};
use crate::config::IndexerSettings;
use crate::constants::defaults;
use crate::error::{IndexerError, Result};
use crate::services::{
    Collaborators, Embedder, FsBlobLister, FsSearchIndex, HashingEmbedder, OpenAiEmbedder,
    SentenceChunker, TextFileCracker,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone)]
pub struct ClientFactory {
    settings: Arc<IndexerSettings>,
}

impl ClientFactory {
    pub fn new(settings: Arc<IndexerSettings>) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &Arc<IndexerSettings> {
        &self.settings
    }

    /// Build the reference collaborators: filesystem source and index,
    /// sentence chunker, and either a remote or a hashing embedder.
    pub fn build_collaborators(&self) -> Result<Collaborators> {
        let source_root = self
            .settings
            .source_root
            .clone()
            .ok_or_else(|| IndexerError::configuration("SOURCE_ROOT is required"))?;
        let index_root = self
            .settings
            .search_index_root
            .clone()
            .ok_or_else(|| IndexerError::configuration("SEARCH_INDEX_ROOT is required"))?;

        info!(
            source_root = %source_root.display(),
            index_root = %index_root.display(),
            "Building collaborators"
        );

        Ok(Collaborators {
            lister: Arc::new(FsBlobLister::new(
                source_root.clone(),
                self.settings.source_storage_account_name.clone(),
            )),
            cracker: Arc::new(TextFileCracker::new(source_root)),
            chunker: Arc::new(SentenceChunker::new(
                defaults::CHUNK_SIZE_TOKENS,
                defaults::CHUNK_OVERLAP_TOKENS,
                defaults::MIN_SENTENCES_PER_CHUNK,
            )?),
            embedder: self.build_embedder()?,
            search_index: Arc::new(FsSearchIndex::new(index_root)),
        })
    }

    fn build_embedder(&self) -> Result<Arc<dyn Embedder>> {
        match &self.settings.embedding_endpoint {
            Some(endpoint) => {
                info!(endpoint = %endpoint, model = %self.settings.embedding_model, "Using remote embedder");
                Ok(Arc::new(OpenAiEmbedder::new(
                    endpoint,
                    self.settings.embedding_api_key.as_deref(),
                    self.settings.embedding_model.clone(),
                    self.settings.embedding_dimensions,
                    Duration::from_secs(defaults::EMBEDDING_TIMEOUT_SECONDS),
                    defaults::EMBEDDING_BATCH_SIZE,
                )?))
            }
            None => {
                let dimensions = self
                    .settings
                    .embedding_dimensions
                    .unwrap_or(defaults::HASHING_EMBEDDING_DIMENSIONS);
                info!(dimensions, "No EMBEDDING_ENDPOINT, using hashing embedder");
                Ok(Arc::new(HashingEmbedder::new(dimensions)?))
            }
        }
    }

    /// `DATABASE_URL` selects Postgres, `CHECKPOINT_DIR` the file store,
    /// otherwise checkpoints live in memory for the life of the process.
    pub async fn build_checkpoint_store(&self) -> Result<Arc<dyn CheckpointStore>> {
        if let Some(url) = &self.settings.database_url {
            return self.postgres_store(url).await;
        }
        if let Some(dir) = &self.settings.checkpoint_dir {
            info!(dir = %dir.display(), "Using file checkpoint store");
            return Ok(Arc::new(FileCheckpointStore::open(dir.clone()).await?));
        }
        info!("Using in-memory checkpoint store");
        Ok(Arc::new(MemoryCheckpointStore::new()))
    }

    #[cfg(feature = "postgres")]
    async fn postgres_store(&self, url: &str) -> Result<Arc<dyn CheckpointStore>> {
        info!("Using Postgres checkpoint store");
        Ok(Arc::new(
            crate::checkpoint::PostgresCheckpointStore::connect(url).await?,
        ))
    }

    #[cfg(not(feature = "postgres"))]
    async fn postgres_store(&self, _url: &str) -> Result<Arc<dyn CheckpointStore>> {
        Err(IndexerError::configuration(
            "DATABASE_URL is set but the postgres feature is disabled",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Cursor, WorkflowCheckpoint};
    use uuid::Uuid;

    #[test]
    fn test_collaborators_require_roots() {
        let factory = ClientFactory::new(Arc::new(IndexerSettings::with_container("source")));
        let err = factory.build_collaborators().unwrap_err();
        assert!(err.to_string().contains("SOURCE_ROOT"));
    }

    #[test]
    fn test_builds_local_collaborators() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = IndexerSettings::with_container("source");
        settings.source_root = Some(dir.path().join("source"));
        settings.search_index_root = Some(dir.path().join("index"));

        let factory = ClientFactory::new(Arc::new(settings));
        assert!(factory.build_collaborators().is_ok());
    }

    #[tokio::test]
    async fn test_checkpoint_dir_selects_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = IndexerSettings::with_container("source");
        settings.checkpoint_dir = Some(dir.path().to_path_buf());

        let store = ClientFactory::new(Arc::new(settings))
            .build_checkpoint_store()
            .await
            .unwrap();
        let run_id = Uuid::new_v4();
        store
            .save(&WorkflowCheckpoint::new(run_id, "docs", "source", Cursor::default()))
            .await
            .unwrap();

        assert!(dir.path().join(format!("{run_id}.json")).exists());
    }

    #[cfg(not(feature = "postgres"))]
    #[tokio::test]
    async fn test_database_url_needs_postgres_feature() {
        let mut settings = IndexerSettings::with_container("source");
        settings.database_url = Some("postgres://localhost/indexer".to_string());

        let err = ClientFactory::new(Arc::new(settings))
            .build_checkpoint_store()
            .await
            .err()
            .unwrap();
        assert!(matches!(err, IndexerError::Configuration(_)));
    }
}
