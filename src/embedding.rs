//! Embedding provider abstraction and implementations.
//!
//! Defines the [`EmbeddingProvider`] trait and concrete implementations:
//! - **[`DisabledProvider`]**: returns errors, used when embeddings are not configured.
//! - **[`OpenAIProvider`]**: calls the OpenAI or Azure OpenAI embeddings API.
//!
//! Also provides vector utilities for the SQLite store:
//! - [`cosine_similarity`]: compute similarity between two embedding vectors
//! - [`vec_to_blob`]: encode a `Vec<f32>` as little-endian bytes for SQLite BLOB storage
//! - [`blob_to_vec`]: decode a SQLite BLOB back into a `Vec<f32>`
//!
//! # Provider Selection
//!
//! Use [`create_provider`] to instantiate the appropriate provider based
//! on the configuration:
//!
//! ```rust,no_run
//! # use pdfchat::config::ProviderConfig;
//! # use pdfchat::embedding::create_provider;
//! let config = ProviderConfig::default(); // provider = "disabled"
//! let provider = create_provider(&config).unwrap();
//! assert_eq!(provider.model_name(), "disabled");
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::ProviderConfig;
use crate::openai::{ApiClient, ApiError};

/// Environment variables holding the Azure embedding key, in lookup order.
const AZURE_EMBEDDING_KEY_VARS: &[&str] =
    &["TEXT_EMBEDDING_AZURE_OPENAI_API_KEY", "AZURE_OPENAI_API_KEY"];

/// Failure to turn text into a vector.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding provider is disabled")]
    Disabled,
    #[error("embedding request failed: {0}")]
    Api(#[from] ApiError),
    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),
}

/// Trait for embedding providers.
///
/// `embed` is a single-text call. `embed_batch` issues one call per text in
/// order and aborts the whole batch on the first failure.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model (or deployment) identifier.
    fn model_name(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}

// ============ Disabled Provider ============

/// A no-op embedding provider that always returns errors.
///
/// Used when `embedding.provider = "disabled"` in the configuration.
pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Err(EmbeddingError::Disabled)
    }
}

// ============ OpenAI / Azure Provider ============

/// Embedding provider using the OpenAI or Azure OpenAI embeddings API.
///
/// Calls `POST .../embeddings` with a single input and returns the first
/// embedding in the response. The HTTP client is created once, when the
/// provider is built.
pub struct OpenAIProvider {
    client: ApiClient,
}

impl OpenAIProvider {
    /// Create a new provider from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if `model` is not set, the Azure endpoint settings are
    /// incomplete, or the API key is missing from the environment.
    pub fn new(config: &ProviderConfig) -> Result<Self, EmbeddingError> {
        Ok(Self {
            client: ApiClient::from_config(config, AZURE_EMBEDDING_KEY_VARS)?,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        self.client.model()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let body = serde_json::json!({
            "model": self.client.model(),
            "input": text,
        });
        let json = self.client.post_json("embeddings", &body).await?;
        parse_first_embedding(&json)
    }
}

/// Extract `data[0].embedding` from an embeddings API response.
fn parse_first_embedding(json: &serde_json::Value) -> Result<Vec<f32>, EmbeddingError> {
    let first = json
        .get("data")
        .and_then(|d| d.as_array())
        .and_then(|d| d.first())
        .ok_or_else(|| EmbeddingError::InvalidResponse("missing data array".to_string()))?;

    let embedding = first
        .get("embedding")
        .and_then(|e| e.as_array())
        .ok_or_else(|| EmbeddingError::InvalidResponse("missing embedding".to_string()))?;

    embedding
        .iter()
        .map(|v| {
            v.as_f64().map(|x| x as f32).ok_or_else(|| {
                EmbeddingError::InvalidResponse(format!("non-numeric embedding element: {}", v))
            })
        })
        .collect()
}

/// Create the appropriate [`EmbeddingProvider`] based on configuration.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledProvider`] |
/// | `"openai"` | [`OpenAIProvider`] (public endpoint) |
/// | `"azure"` | [`OpenAIProvider`] (Azure deployment) |
pub fn create_provider(
    config: &ProviderConfig,
) -> Result<Arc<dyn EmbeddingProvider>, EmbeddingError> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledProvider)),
        _ => Ok(Arc::new(OpenAIProvider::new(config)?)),
    }
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors or vectors
/// of different lengths.
///
/// ```text
///            a · b
/// cos(θ) = ─────────
///          ‖a‖ × ‖b‖
/// ```
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// Cosine distance used to order query results (smaller is closer).
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}
