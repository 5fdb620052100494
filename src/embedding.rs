//! Embedding client abstraction and remote implementations.
//!
//! Defines the [`EmbeddingClient`] trait and two concrete adapters:
//! - **[`OpenAiEmbeddings`]** — calls the OpenAI embeddings API.
//! - **[`OllamaEmbeddings`]** — calls a local Ollama instance's `/api/embed`.
//!
//! Both batch their inputs up to the configured batch size and retry
//! transient failures with exponential backoff:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors and timeouts → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)
//!
//! Also provides the vector utilities shared by the index:
//! [`cosine_similarity`], [`vec_to_blob`], [`blob_to_vec`].

use async_trait::async_trait;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::{Result, WikiqaError};

/// A remote service turning text into fixed-dimension vectors.
///
/// Implementations must preserve input order: output vector `i` embeds
/// input text `i`. Injected into the pipeline so tests can substitute a
/// deterministic double.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;

    /// Vector dimensionality produced by this model.
    fn dims(&self) -> usize;

    /// Largest number of texts sent in one remote call.
    fn batch_size(&self) -> usize;

    /// Embed one batch in a single remote call (with retries). Callers
    /// must keep `texts` within [`batch_size`](Self::batch_size).
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed an arbitrary number of texts, batching internally.
    /// Order-preserving across batches.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size().max(1)) {
            out.extend(self.embed_batch(batch).await?);
        }
        Ok(out)
    }

    /// Embed a single query text.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors.pop().ok_or_else(|| WikiqaError::EmbeddingService {
            chunk_ids: Vec::new(),
            attempts: 1,
            reason: "empty embedding response".into(),
        })
    }
}

/// Build the configured embedding client.
pub fn create_embedding_client(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingClient>> {
    match config.provider.as_str() {
        "openai" => Ok(Box::new(OpenAiEmbeddings::new(config)?)),
        "ollama" => Ok(Box::new(OllamaEmbeddings::new(config)?)),
        other => Err(WikiqaError::Config(format!(
            "unknown embedding provider: '{}'",
            other
        ))),
    }
}

// ============ Retry policy ============

/// True when an HTTP status is worth retrying: rate limits and server errors.
pub(crate) fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

/// Exponential backoff before retry `attempt` (1-based): 1s, 2s, 4s, ... 32s.
pub(crate) fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(1 << attempt.saturating_sub(1).min(5))
}

// ============ OpenAI ============

/// Embedding client for the OpenAI API (`POST /v1/embeddings`).
///
/// Requires the `OPENAI_API_KEY` environment variable.
pub struct OpenAiEmbeddings {
    model: String,
    dims: usize,
    batch_size: usize,
    max_retries: u32,
    http: reqwest::Client,
}

impl OpenAiEmbeddings {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        if std::env::var("OPENAI_API_KEY").is_err() {
            return Err(WikiqaError::Config(
                "OPENAI_API_KEY environment variable not set".into(),
            ));
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| WikiqaError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            model: config.model.clone(),
            dims: config.dims,
            batch_size: config.batch_size,
            max_retries: config.max_retries,
            http,
        })
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbeddings {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            WikiqaError::Config("OPENAI_API_KEY environment variable not set".into())
        })?;

        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut last_err: Option<String> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(backoff_delay(attempt)).await;
            }

            let resp = self
                .http
                .post("https://api.openai.com/v1/embeddings")
                .header("Authorization", format!("Bearer {}", api_key))
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let json: serde_json::Value =
                            response.json().await.map_err(|e| embed_error(1, e))?;
                        return parse_openai_embeddings(&json, texts.len());
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if is_retryable_status(status.as_u16()) {
                        last_err = Some(format!("OpenAI API error {}: {}", status, body_text));
                        continue;
                    }

                    // Client error other than 429: retrying cannot help.
                    return Err(embed_error(
                        attempt + 1,
                        format!("OpenAI API error {}: {}", status, body_text),
                    ));
                }
                Err(e) => {
                    last_err = Some(e.to_string());
                    continue;
                }
            }
        }

        Err(embed_error(
            self.max_retries + 1,
            last_err.unwrap_or_else(|| "embedding failed after retries".into()),
        ))
    }
}

fn embed_error(attempts: u32, reason: impl ToString) -> WikiqaError {
    WikiqaError::EmbeddingService {
        chunk_ids: Vec::new(),
        attempts,
        reason: reason.to_string(),
    }
}

/// Extract `data[].embedding` in input order. OpenAI tags each entry with
/// its input index; sort on it rather than trusting response order.
fn parse_openai_embeddings(json: &serde_json::Value, expected: usize) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| embed_error(1, "invalid response: missing data array"))?;

    let mut indexed: Vec<(usize, Vec<f32>)> = Vec::with_capacity(data.len());
    for (pos, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(pos);
        let vector: Vec<f32> = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| embed_error(1, "invalid response: missing embedding"))?
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        indexed.push((index, vector));
    }
    indexed.sort_by_key(|(i, _)| *i);

    if indexed.len() != expected {
        return Err(embed_error(
            1,
            format!(
                "embedding count mismatch: sent {}, received {}",
                expected,
                indexed.len()
            ),
        ));
    }

    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Ollama ============

/// Embedding client for a local Ollama instance (`POST /api/embed`).
pub struct OllamaEmbeddings {
    model: String,
    dims: usize,
    batch_size: usize,
    max_retries: u32,
    url: String,
    http: reqwest::Client,
}

impl OllamaEmbeddings {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| WikiqaError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            model: config.model.clone(),
            dims: config.dims,
            batch_size: config.batch_size,
            max_retries: config.max_retries,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
            http,
        })
    }
}

#[async_trait]
impl EmbeddingClient for OllamaEmbeddings {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut last_err: Option<String> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(backoff_delay(attempt)).await;
            }

            let resp = self
                .http
                .post(format!("{}/api/embed", self.url))
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let json: serde_json::Value =
                            response.json().await.map_err(|e| embed_error(1, e))?;
                        return parse_ollama_embeddings(&json, texts.len());
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if is_retryable_status(status.as_u16()) {
                        last_err = Some(format!("Ollama API error {}: {}", status, body_text));
                        continue;
                    }

                    return Err(embed_error(
                        attempt + 1,
                        format!("Ollama API error {}: {}", status, body_text),
                    ));
                }
                Err(e) => {
                    last_err = Some(format!(
                        "Ollama connection error (is Ollama running at {}?): {}",
                        self.url, e
                    ));
                    continue;
                }
            }
        }

        Err(embed_error(
            self.max_retries + 1,
            last_err.unwrap_or_else(|| "embedding failed after retries".into()),
        ))
    }
}

fn parse_ollama_embeddings(json: &serde_json::Value, expected: usize) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| embed_error(1, "invalid response: missing embeddings array"))?;

    if embeddings.len() != expected {
        return Err(embed_error(
            1,
            format!(
                "embedding count mismatch: sent {}, received {}",
                expected,
                embeddings.len()
            ),
        ));
    }

    embeddings
        .iter()
        .map(|value| {
            value
                .as_array()
                .ok_or_else(|| embed_error(1, "invalid response: embedding is not an array"))
                .map(|arr| arr.iter().map(|v| v.as_f64().unwrap_or(0.0) as f32).collect())
        })
        .collect()
}

// ============ Vector utilities ============

/// Encode a float vector as little-endian f32 bytes for BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB written by [`vec_to_blob`] back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1, 1]`. Returns `0.0` for empty or
/// length-mismatched vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    let denom = norm_a * norm_b;
    if denom < f32::EPSILON {
        0.0
    } else {
        dot / denom
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_statuses() {
        assert!(is_retryable_status(429));
        assert!(is_retryable_status(500));
        assert!(is_retryable_status(503));
        assert!(!is_retryable_status(400));
        assert!(!is_retryable_status(401));
        assert!(!is_retryable_status(404));
        assert!(!is_retryable_status(200));
    }

    #[test]
    fn backoff_doubles_then_caps() {
        assert_eq!(backoff_delay(1), Duration::from_secs(1));
        assert_eq!(backoff_delay(2), Duration::from_secs(2));
        assert_eq!(backoff_delay(3), Duration::from_secs(4));
        assert_eq!(backoff_delay(6), Duration::from_secs(32));
        assert_eq!(backoff_delay(12), Duration::from_secs(32));
    }

    #[test]
    fn blob_roundtrip_preserves_values() {
        let vec = vec![0.25f32, -1.5, 3.0, 0.0, f32::MIN_POSITIVE];
        assert_eq!(blob_to_vec(&vec_to_blob(&vec)), vec);
    }

    #[test]
    fn cosine_basics() {
        let v = vec![0.5, 0.5, 0.1];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[2.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn openai_response_reordered_by_index() {
        let json = serde_json::json!({
            "data": [
                { "index": 1, "embedding": [0.0, 1.0] },
                { "index": 0, "embedding": [1.0, 0.0] }
            ]
        });
        let vectors = parse_openai_embeddings(&json, 2).unwrap();
        assert_eq!(vectors[0], vec![1.0, 0.0]);
        assert_eq!(vectors[1], vec![0.0, 1.0]);
    }

    #[test]
    fn openai_count_mismatch_is_an_error() {
        let json = serde_json::json!({
            "data": [ { "index": 0, "embedding": [1.0] } ]
        });
        assert!(parse_openai_embeddings(&json, 2).is_err());
    }

    #[test]
    fn ollama_response_parsed_in_order() {
        let json = serde_json::json!({
            "embeddings": [[0.1, 0.2], [0.3, 0.4]]
        });
        let vectors = parse_ollama_embeddings(&json, 2).unwrap();
        assert_eq!(vectors.len(), 2);
        assert!((vectors[1][0] - 0.3).abs() < 1e-6);
    }
}
