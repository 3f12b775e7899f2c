//! Embedding client abstraction and adapters.
//!
//! Every adapter returns L2-normalized vectors so cosine similarity in the index reduces to
//! a dot product regardless of which provider produced them.

use crate::config::{EmbeddingProvider, EmbeddingSettings};
use async_trait::async_trait;
use ollama_rs::Ollama;
use ollama_rs::generation::embeddings::request::{EmbeddingsInput, GenerateEmbeddingsRequest};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// Provider was unable to produce embeddings for the supplied input.
    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),
    /// Provider answered with a different number of vectors than inputs.
    #[error("Embedding provider returned {actual} vectors for {expected} inputs")]
    CountMismatch {
        /// Number of texts submitted.
        expected: usize,
        /// Number of vectors received.
        actual: usize,
    },
    /// Provider needs a credential that was not configured.
    #[error("Missing credential for embedding provider {0}")]
    MissingCredential(&'static str),
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Produce an embedding vector for each supplied chunk of text, in input order.
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError>;
}

/// Shared handle used by ingestion and retrieval.
pub type SharedEmbedder = Arc<dyn EmbeddingClient>;

/// Deterministic embedding client that hashes bytes into vector slots.
///
/// Useful offline and in tests; similarity between texts tracks shared byte content only.
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    /// Construct a new deterministic embedding client producing `dimension`-wide vectors.
    pub const fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn encode(text: &str, dimension: usize) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; dimension];

        if text.is_empty() {
            return embedding;
        }

        for (idx, byte) in text.bytes().enumerate() {
            let position = idx % dimension;
            embedding[position] += f32::from(byte) / 255.0;
        }

        l2_normalize(embedding)
    }
}

#[async_trait]
impl EmbeddingClient for HashEmbedder {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if self.dimension == 0 {
            return Err(EmbeddingClientError::GenerationFailed(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }

        if texts.is_empty() {
            return Err(EmbeddingClientError::GenerationFailed(
                "no texts provided".to_string(),
            ));
        }

        Ok(texts
            .into_iter()
            .map(|text| Self::encode(&text, self.dimension))
            .collect())
    }
}

/// Embedding client backed by a local Ollama runtime.
pub struct OllamaEmbedder {
    ollama: Ollama,
    model: String,
}

impl OllamaEmbedder {
    /// Connect to the Ollama runtime at `base_url`.
    pub fn new(base_url: &str, model: impl Into<String>) -> Result<Self, EmbeddingClientError> {
        let ollama = Ollama::try_new(base_url).map_err(|error| {
            EmbeddingClientError::GenerationFailed(format!(
                "invalid Ollama URL {base_url}: {error}"
            ))
        })?;
        Ok(Self {
            ollama,
            model: model.into(),
        })
    }
}

#[async_trait]
impl EmbeddingClient for OllamaEmbedder {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        let expected = texts.len();
        tracing::debug!(model = %self.model, inputs = expected, "Requesting Ollama embeddings");
        let request =
            GenerateEmbeddingsRequest::new(self.model.clone(), EmbeddingsInput::Multiple(texts));
        let response = self
            .ollama
            .generate_embeddings(request)
            .await
            .map_err(|error| EmbeddingClientError::GenerationFailed(error.to_string()))?;

        finish_batch(expected, response.embeddings)
    }
}

/// Embedding client for the hosted OpenAI `/embeddings` endpoint.
pub struct OpenAiEmbedder {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiEmbedder {
    /// Build a client; fails fast when no API key is configured.
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
    ) -> Result<Self, EmbeddingClientError> {
        let api_key = api_key
            .filter(|key| !key.trim().is_empty())
            .ok_or(EmbeddingClientError::MissingCredential("openai"))?;
        let http = Client::builder()
            .user_agent("groundwork/embed")
            .build()
            .map_err(|error| EmbeddingClientError::GenerationFailed(error.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            api_key,
            model: model.into(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/embeddings", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Deserialize)]
struct OpenAiEmbeddingResponse {
    data: Vec<OpenAiEmbeddingItem>,
}

#[derive(Deserialize)]
struct OpenAiEmbeddingItem {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbedder {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        let expected = texts.len();
        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&json!({ "model": self.model, "input": texts }))
            .send()
            .await
            .map_err(|error| EmbeddingClientError::GenerationFailed(error.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingClientError::GenerationFailed(format!(
                "OpenAI returned {status}: {body}"
            )));
        }

        let mut body: OpenAiEmbeddingResponse = response
            .json()
            .await
            .map_err(|error| EmbeddingClientError::GenerationFailed(error.to_string()))?;
        body.data.sort_by_key(|item| item.index);
        finish_batch(
            expected,
            body.data.into_iter().map(|item| item.embedding).collect(),
        )
    }
}

fn finish_batch(
    expected: usize,
    vectors: Vec<Vec<f32>>,
) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
    if vectors.len() != expected {
        return Err(EmbeddingClientError::CountMismatch {
            expected,
            actual: vectors.len(),
        });
    }
    Ok(vectors.into_iter().map(l2_normalize).collect())
}

/// Scale a vector to unit length; zero vectors are returned unchanged.
pub fn l2_normalize(mut vector: Vec<f32>) -> Vec<f32> {
    let norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in &mut vector {
            *value /= norm;
        }
    }
    vector
}

/// Build an embedding client suitable for the supplied settings.
pub fn build_embedding_client(
    settings: &EmbeddingSettings,
) -> Result<SharedEmbedder, EmbeddingClientError> {
    tracing::info!(
        provider = ?settings.provider,
        model = %settings.model,
        dimension = settings.dimension,
        "Initializing embedding client"
    );
    let client: SharedEmbedder = match settings.provider {
        EmbeddingProvider::Hash => Arc::new(HashEmbedder::new(settings.dimension)),
        EmbeddingProvider::Ollama => Arc::new(OllamaEmbedder::new(
            &settings.ollama_url,
            settings.model.clone(),
        )?),
        EmbeddingProvider::OpenAI => Arc::new(OpenAiEmbedder::new(
            settings.openai_base_url.clone(),
            settings.openai_api_key.clone(),
            settings.model.clone(),
        )?),
    };
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    #[tokio::test]
    async fn hash_embeddings_are_deterministic_and_normalized() {
        let client = HashEmbedder::new(16);
        let first = client
            .generate_embeddings(vec!["Paris is the capital of France.".into()])
            .await
            .expect("embeddings");
        let second = client
            .generate_embeddings(vec!["Paris is the capital of France.".into()])
            .await
            .expect("embeddings");
        assert_eq!(first, second);
        let norm: f32 = first[0].iter().map(|value| value * value).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn hash_embedder_rejects_empty_batches() {
        let error = HashEmbedder::new(8)
            .generate_embeddings(Vec::new())
            .await
            .expect_err("empty batch");
        assert!(matches!(error, EmbeddingClientError::GenerationFailed(_)));
    }

    #[test]
    fn openai_embedder_requires_key() {
        let error = OpenAiEmbedder::new("http://localhost", Some("  ".into()), "m")
            .err()
            .expect("missing key");
        assert!(matches!(error, EmbeddingClientError::MissingCredential("openai")));
    }

    #[tokio::test]
    async fn openai_embedder_orders_and_normalizes_vectors() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/embeddings")
                    .header("authorization", "Bearer sk-test");
                then.status(200).json_body(json!({
                    "data": [
                        { "index": 1, "embedding": [0.0, 2.0] },
                        { "index": 0, "embedding": [3.0, 4.0] }
                    ]
                }));
            })
            .await;

        let client = OpenAiEmbedder::new(server.base_url(), Some("sk-test".into()), "small")
            .expect("client");
        let vectors = client
            .generate_embeddings(vec!["a".into(), "b".into()])
            .await
            .expect("vectors");

        mock.assert();
        assert_eq!(vectors, vec![vec![0.6, 0.8], vec![0.0, 1.0]]);
    }

    #[tokio::test]
    async fn openai_embedder_flags_count_mismatch() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/embeddings");
                then.status(200).json_body(json!({
                    "data": [{ "index": 0, "embedding": [1.0] }]
                }));
            })
            .await;

        let client =
            OpenAiEmbedder::new(server.base_url(), Some("sk".into()), "small").expect("client");
        let error = client
            .generate_embeddings(vec!["a".into(), "b".into()])
            .await
            .expect_err("mismatch");
        assert!(matches!(
            error,
            EmbeddingClientError::CountMismatch {
                expected: 2,
                actual: 1
            }
        ));
    }
}
