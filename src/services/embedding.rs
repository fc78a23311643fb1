//! Embedding collaborators: an OpenAI-compatible HTTP client and a local
//! feature-hashing embedder for offline runs.

use super::Embedder;
use crate::constants::defaults;
use crate::error::{IndexerError, Result};
use crate::models::Chunk;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::debug;

const SERVICE: &str = "embedding";

/// Async embeddings client for OpenAI-compatible `/embeddings` endpoints.
///
/// Throttling, server errors and connection failures surface as transient
/// errors so the stage retry policy applies; no retrying happens in here.
#[derive(Debug, Clone)]
pub struct OpenAiEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    dimensions: Option<usize>,
    batch_size: usize,
}

impl OpenAiEmbedder {
    pub fn new(
        base_url: &str,
        api_key: Option<&str>,
        model: impl Into<String>,
        dimensions: Option<usize>,
        timeout: Duration,
        batch_size: usize,
    ) -> Result<Self> {
        let model = model.into();
        if model.trim().is_empty() {
            return Err(IndexerError::configuration("missing embedding model name"));
        }
        if batch_size == 0 {
            return Err(IndexerError::configuration(
                "embedding batch size must be at least 1",
            ));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = api_key.map(str::trim).filter(|k| !k.is_empty()) {
            let auth = HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|_| IndexerError::configuration("invalid embedding API key"))?;
            headers.insert(AUTHORIZATION, auth);
        }

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| IndexerError::configuration(format!("embedding client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model,
            dimensions,
            batch_size,
        })
    }

    pub fn with_defaults(base_url: &str, api_key: Option<&str>) -> Result<Self> {
        Self::new(
            base_url,
            api_key,
            defaults::EMBEDDING_MODEL,
            Some(defaults::EMBEDDING_DIMENSIONS),
            Duration::from_secs(defaults::EMBEDDING_TIMEOUT_SECONDS),
            defaults::EMBEDDING_BATCH_SIZE,
        )
    }

    async fn embed_batch(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: inputs,
            dimensions: self.dimensions,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(classify_request_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            let message = format!("request failed ({status}): {body}");
            return Err(if is_retryable_status(status) {
                IndexerError::transient(SERVICE, message)
            } else {
                IndexerError::service(SERVICE, message)
            });
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| IndexerError::transient(SERVICE, format!("invalid response: {e}")))?;
        parsed.data.sort_by_key(|entry| entry.index);

        if parsed.data.len() != inputs.len() {
            return Err(IndexerError::service(
                SERVICE,
                format!(
                    "returned {} embeddings for {} inputs",
                    parsed.data.len(),
                    inputs.len()
                ),
            ));
        }

        Ok(parsed.data.into_iter().map(|entry| entry.embedding).collect())
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.batch_size) {
            let inputs: Vec<&str> = batch.iter().map(|chunk| chunk.text.as_str()).collect();
            embeddings.extend(self.embed_batch(&inputs).await?);
        }
        debug!(chunks = chunks.len(), model = %self.model, "Computed embeddings");
        Ok(embeddings)
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn classify_request_error(err: reqwest::Error) -> IndexerError {
    if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
        IndexerError::transient(SERVICE, err.to_string())
    } else {
        IndexerError::service(SERVICE, err.to_string())
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

/// Deterministic bag-of-words embedding using SHA-256 feature hashing.
///
/// Each lower-cased word adds ±1 to one bucket; vectors are L2-normalized.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Result<Self> {
        if dimensions == 0 {
            return Err(IndexerError::configuration(
                "embedding dimensions must be at least 1",
            ));
        }
        Ok(Self { dimensions })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];

        for word in text.split_whitespace() {
            let digest = Sha256::digest(word.to_lowercase().as_bytes());
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimensions as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self {
            dimensions: defaults::HASHING_EMBEDDING_DIMENSIONS,
        }
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>> {
        Ok(chunks.iter().map(|chunk| self.embed_text(&chunk.text)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str) -> Chunk {
        Chunk {
            filename: "doc.txt".to_string(),
            url: "file:///doc.txt".to_string(),
            text: text.to_string(),
            start_page: 0,
            end_page: 0,
            start_index: 0,
            end_index: text.chars().count(),
            token_count: text.split_whitespace().count(),
            embedding: None,
        }
    }

    #[tokio::test]
    async fn test_hashing_embedder_is_deterministic_and_normalized() {
        let embedder = HashingEmbedder::new(64).unwrap();
        let chunks = vec![chunk("the quick brown fox"), chunk("The QUICK brown fox")];

        let vectors = embedder.embed(&chunks).await.unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[0], vectors[1]);
        assert_eq!(vectors[0].len(), 64);

        let norm: f32 = vectors[0].iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_hashing_embedder_empty_text_is_zero_vector() {
        let embedder = HashingEmbedder::default();
        assert!(embedder.embed_text("").iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(StatusCode::BAD_GATEWAY));
        assert!(!is_retryable_status(StatusCode::BAD_REQUEST));
        assert!(!is_retryable_status(StatusCode::UNAUTHORIZED));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transient() {
        let embedder = OpenAiEmbedder::new(
            "http://127.0.0.1:9",
            None,
            "test-model",
            None,
            Duration::from_secs(2),
            8,
        )
        .unwrap();

        let err = embedder.embed(&[chunk("hello")]).await.unwrap_err();
        assert!(err.is_retryable(), "unexpected error: {err}");
    }

    #[test]
    fn test_rejects_empty_model() {
        assert!(OpenAiEmbedder::new("http://localhost", None, " ", None, Duration::from_secs(1), 1)
            .is_err());
    }
}
