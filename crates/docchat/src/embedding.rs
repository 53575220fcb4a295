//! Embedding provider implementations.
//!
//! Concrete [`EmbeddingProvider`]s selected by `[embedding] provider`:
//! - **[`DisabledProvider`]**: fails every call; used when embeddings are not configured.
//! - **[`OpenAIProvider`]**: calls the OpenAI embeddings API with retry and backoff.
//! - **[`HashProvider`]**: local feature-hashing bag-of-words vectors; no network,
//!   deterministic, good enough for keyword-ish retrieval and offline tests.
//!
//! # Retry Strategy
//!
//! The OpenAI provider uses exponential backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)
//!
//! Every failure surfaces as [`RagError::EmbeddingUnavailable`].

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use sha2::{Digest, Sha256};

use docchat_core::embedding::EmbeddingProvider;
use docchat_core::error::{RagError, Result};

use crate::config::EmbeddingConfig;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

// ============ Disabled Provider ============

/// A no-op embedding provider that always returns errors.
pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(RagError::EmbeddingUnavailable(
            "embedding provider is disabled; set [embedding] provider in config".to_string(),
        ))
    }
}

// ============ OpenAI Provider ============

/// Embedding provider using the OpenAI API (`POST /v1/embeddings`).
///
/// Requires the `OPENAI_API_KEY` environment variable. `base_url` may point
/// at any OpenAI-compatible endpoint.
pub struct OpenAIProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    dims: usize,
    max_retries: u32,
}

impl OpenAIProvider {
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for OpenAI provider"))?;
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            api_key,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
            model,
            dims,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let url = format!("{}/embeddings", self.base_url.trim_end_matches('/'));

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tracing::debug!(attempt, ?delay, "retrying embedding request");
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await.map_err(|e| {
                            RagError::EmbeddingUnavailable(format!("invalid response body: {}", e))
                        })?;
                        let vectors = parse_openai_response(&json)?;
                        return check_shape(vectors, texts.len(), self.dims);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    let err = format!("OpenAI API error {}: {}", status, body_text);

                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(err);
                        continue;
                    }
                    return Err(RagError::EmbeddingUnavailable(err));
                }
                Err(e) => {
                    last_err = Some(e.to_string());
                    continue;
                }
            }
        }

        Err(RagError::EmbeddingUnavailable(
            last_err.unwrap_or_else(|| "embedding failed after retries".to_string()),
        ))
    }
}

/// Extract `data[].embedding`, ordered by `data[].index`.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| {
            RagError::EmbeddingUnavailable("invalid OpenAI response: missing data array".into())
        })?;

    let mut indexed = Vec::with_capacity(data.len());
    for (pos, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| {
                RagError::EmbeddingUnavailable("invalid OpenAI response: missing embedding".into())
            })?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(pos);
        let vec = embedding
            .iter()
            .map(|v| {
                v.as_f64().map(|f| f as f32).ok_or_else(|| {
                    RagError::EmbeddingUnavailable(
                        "invalid OpenAI response: non-numeric embedding value".into(),
                    )
                })
            })
            .collect::<Result<Vec<f32>>>()?;
        indexed.push((index, vec));
    }

    indexed.sort_by_key(|(i, _)| *i);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

fn check_shape(vectors: Vec<Vec<f32>>, expected: usize, dims: usize) -> Result<Vec<Vec<f32>>> {
    if vectors.len() != expected {
        return Err(RagError::EmbeddingUnavailable(format!(
            "expected {} embeddings, got {}",
            expected,
            vectors.len()
        )));
    }
    if let Some(v) = vectors.iter().find(|v| v.len() != dims) {
        return Err(RagError::DimensionMismatch {
            expected: dims,
            actual: v.len(),
        });
    }
    Ok(vectors)
}

// ============ Hash Provider ============

/// Feature-hashing embedder.
///
/// Lowercased alphanumeric tokens are hashed with SHA-256 into `dims`
/// buckets with a ±1 sign taken from the hash, then the vector is
/// L2-normalized. Texts sharing words land close under cosine distance.
pub struct HashProvider {
    dims: usize,
}

impl HashProvider {
    pub fn new(dims: usize) -> anyhow::Result<Self> {
        if dims == 0 {
            bail!("embedding.dims must be > 0 for the hash provider");
        }
        Ok(Self { dims })
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dims];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let digest = Sha256::digest(token.to_lowercase().as_bytes());
            let mut bucket = [0u8; 8];
            bucket.copy_from_slice(&digest[..8]);
            let idx = (u64::from_le_bytes(bucket) % self.dims as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            v[idx] += sign;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        v
    }
}

#[async_trait]
impl EmbeddingProvider for HashProvider {
    fn model_name(&self) -> &str {
        "hash"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

// ============ Factory ============

/// Instantiate the provider named by `config.provider`.
pub fn create_provider(config: &EmbeddingConfig) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledProvider)),
        "openai" => Ok(Arc::new(OpenAIProvider::new(config)?)),
        "hash" => Ok(Arc::new(HashProvider::new(config.dims.unwrap_or(0))?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docchat_core::embedding::cosine_similarity;

    #[test]
    fn test_parse_openai_response_orders_by_index() {
        let json = serde_json::json!({
            "data": [
                {"index": 1, "embedding": [0.0, 1.0]},
                {"index": 0, "embedding": [1.0, 0.0]}
            ]
        });
        let vecs = parse_openai_response(&json).unwrap();
        assert_eq!(vecs, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_parse_openai_response_missing_data() {
        let err = parse_openai_response(&serde_json::json!({"error": "nope"})).unwrap_err();
        assert!(matches!(err, RagError::EmbeddingUnavailable(_)));
    }

    #[test]
    fn test_parse_openai_response_non_numeric_value() {
        let json = serde_json::json!({
            "data": [{"index": 0, "embedding": [0.5, "oops"]}]
        });
        let err = parse_openai_response(&json).unwrap_err();
        assert!(matches!(err, RagError::EmbeddingUnavailable(ref m) if m.contains("non-numeric")));
    }

    #[test]
    fn test_check_shape_dims() {
        let err = check_shape(vec![vec![1.0, 2.0]], 1, 3).unwrap_err();
        assert!(matches!(err, RagError::DimensionMismatch { expected: 3, actual: 2 }));
    }

    #[tokio::test]
    async fn test_hash_provider_deterministic_and_normalized() {
        let p = HashProvider::new(64).unwrap();
        let texts = vec!["Annual leave policy".to_string(), "annual LEAVE policy".to_string()];
        let v = p.embed(&texts).await.unwrap();
        assert_eq!(v[0], v[1]);
        let norm: f32 = v[0].iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_hash_provider_shared_words_are_closer() {
        let p = HashProvider::new(256).unwrap();
        let texts = vec![
            "employees receive annual leave".to_string(),
            "how much annual leave do employees get".to_string(),
            "the server runs on port eight thousand".to_string(),
        ];
        let v = p.embed(&texts).await.unwrap();
        assert!(cosine_similarity(&v[0], &v[1]) > cosine_similarity(&v[0], &v[2]));
    }

    #[tokio::test]
    async fn test_disabled_provider_fails() {
        let err = DisabledProvider.embed(&["x".to_string()]).await.unwrap_err();
        assert!(matches!(err, RagError::EmbeddingUnavailable(_)));
    }

    #[test]
    fn test_create_provider_unknown() {
        let config = EmbeddingConfig {
            provider: "word2vec".into(),
            ..Default::default()
        };
        assert!(create_provider(&config).is_err());
    }
}
