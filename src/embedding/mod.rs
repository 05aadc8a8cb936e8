//! Embedding client abstraction and adapters.
//!
//! Segments and questions are vectorized through the [`EmbeddingClient`]
//! trait. The production backend calls an OpenAI-compatible `/embeddings`
//! endpoint; the hashed backend is a deterministic local encoder that needs
//! no network and doubles as the test client.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::config::{EmbeddingBackend, get_config};

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbedError {
    /// Provider could not be reached or refused the request.
    #[error("Embedding provider unavailable: {0}")]
    Unavailable(String),
    /// Provider returned a vector of the wrong length.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension the index was configured for.
        expected: usize,
        /// Dimension actually returned by the provider.
        actual: usize,
    },
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Produce a fixed-length vector for the supplied text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;

    /// Length of the vectors this client produces.
    fn dimension(&self) -> usize;

    /// Model identifier recorded alongside index artifacts.
    fn model(&self) -> &str;
}

/// Deterministic local encoder folding input bytes into a normalized vector.
pub struct HashedEmbeddingClient {
    dimension: usize,
    model: String,
}

impl HashedEmbeddingClient {
    /// Construct an encoder producing vectors of the given dimension.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            model: "hashed-bytefold".to_string(),
        }
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

        let norm = embedding
            .iter()
            .map(|value| value * value)
            .sum::<f32>()
            .sqrt();

        if norm > 0.0 {
            for value in &mut embedding {
                *value /= norm;
            }
        }

        embedding
    }
}

#[async_trait]
impl EmbeddingClient for HashedEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        if self.dimension == 0 {
            return Err(EmbedError::Unavailable(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }
        Ok(Self::encode(text, self.dimension))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Embedding backend speaking an OpenAI-compatible `/embeddings` API.
pub struct HttpEmbeddingClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    dimension: usize,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Deserialize)]
struct EmbeddingRow {
    embedding: Vec<f32>,
}

impl HttpEmbeddingClient {
    /// Construct a client against an explicit endpoint.
    pub fn new(
        base_url: String,
        api_key: Option<String>,
        model: String,
        dimension: usize,
    ) -> Result<Self, EmbedError> {
        let client = Client::builder()
            .user_agent("docqa/0.1")
            .build()
            .map_err(|error| EmbedError::Unavailable(error.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            dimension,
        })
    }
}

#[async_trait]
impl EmbeddingClient for HttpEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let url = format!("{}/embeddings", self.base_url);
        let mut request = self.client.post(&url).json(&json!({
            "model": self.model,
            "input": text,
        }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|error| EmbedError::Unavailable(error.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbedError::Unavailable(format!(
                "{status}: {}",
                body.chars().take(300).collect::<String>()
            )));
        }

        let payload: EmbeddingResponse = response
            .json()
            .await
            .map_err(|error| EmbedError::Unavailable(error.to_string()))?;
        let vector = payload
            .data
            .into_iter()
            .next()
            .map(|row| row.embedding)
            .ok_or_else(|| {
                EmbedError::Unavailable("provider returned no embeddings".to_string())
            })?;

        if vector.len() != self.dimension {
            return Err(EmbedError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }

        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Build the embedding client named by the process configuration.
pub fn client_from_config() -> Arc<dyn EmbeddingClient> {
    let config = get_config();
    match config.embedding_backend {
        EmbeddingBackend::Http => {
            let base_url = config
                .embedding_url
                .clone()
                .expect("EMBEDDING_URL is validated at startup");
            let client = HttpEmbeddingClient::new(
                base_url,
                config.embedding_api_key.clone(),
                config.embedding_model.clone(),
                config.embedding_dimension,
            )
            .expect("Failed to build embedding HTTP client");
            Arc::new(client)
        }
        EmbeddingBackend::Hashed => Arc::new(HashedEmbeddingClient::new(config.embedding_dimension)),
    }
}
