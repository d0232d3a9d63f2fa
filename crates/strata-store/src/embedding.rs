//! Embedding backends.
//!
//! [`OllamaEmbeddingBackend`] talks to a local Ollama server; the
//! [`MockEmbeddingBackend`] generates deterministic vectors for tests and
//! offline development.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use strata_core::{defaults, EmbeddingBackend, Error, Result};

/// Ollama embedding backend.
pub struct OllamaEmbeddingBackend {
    client: Client,
    base_url: String,
    model: String,
    dimension: usize,
    timeout_secs: u64,
}

impl OllamaEmbeddingBackend {
    /// Create a backend with default settings.
    pub fn new() -> Self {
        Self::with_config(
            defaults::OLLAMA_URL.to_string(),
            defaults::EMBED_MODEL.to_string(),
            defaults::EMBED_DIMENSION,
        )
    }

    /// Create a backend with custom configuration.
    pub fn with_config(base_url: String, model: String, dimension: usize) -> Self {
        let timeout_secs = std::env::var("STRATA_EMBED_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::EMBED_TIMEOUT_SECS);

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        info!("Initializing Ollama embedding backend: url={base_url}, model={model}");

        Self {
            client,
            base_url,
            model,
            dimension,
            timeout_secs,
        }
    }

    /// Create from environment variables.
    pub fn from_env() -> Self {
        let base_url =
            std::env::var("OLLAMA_BASE").unwrap_or_else(|_| defaults::OLLAMA_URL.to_string());
        let model = std::env::var("OLLAMA_EMBED_MODEL")
            .unwrap_or_else(|_| defaults::EMBED_MODEL.to_string());
        let dimension = std::env::var("OLLAMA_EMBED_DIM")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults::EMBED_DIMENSION);

        Self::with_config(base_url, model, dimension)
    }
}

impl Default for OllamaEmbeddingBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
struct EmbeddingRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embeddings: Vec<Vec<f32>>,
}

#[async_trait]
impl EmbeddingBackend for OllamaEmbeddingBackend {
    #[instrument(skip(self, texts), fields(subsystem = "store", component = "ollama", op = "embed_texts", model = %self.model, input_count = texts.len()))]
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let start = Instant::now();
        let request = EmbeddingRequest {
            model: self.model.clone(),
            input: texts.to_vec(),
        };

        let response = self
            .client
            .post(format!("{}/api/embed", self.base_url))
            .timeout(Duration::from_secs(self.timeout_secs))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Embedding(format!("Request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Embedding(format!("Ollama returned {status}: {body}")));
        }

        let result: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| Error::Embedding(format!("Failed to parse response: {e}")))?;

        let elapsed = start.elapsed().as_millis() as u64;
        debug!(
            result_count = result.embeddings.len(),
            duration_ms = elapsed,
            "Embedding complete"
        );
        if elapsed > 5000 {
            warn!(
                duration_ms = elapsed,
                input_count = texts.len(),
                slow = true,
                "Slow embedding operation"
            );
        }

        Ok(result.embeddings)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Deterministic mock embedding backend.
///
/// The same text always produces the same unit vector, so similarity
/// assertions in tests are stable across runs. An optional failure switch
/// exercises degraded-path handling.
pub struct MockEmbeddingBackend {
    dimension: usize,
    latency_ms: u64,
    failure_rate: f64,
    calls: AtomicUsize,
}

impl MockEmbeddingBackend {
    pub fn new() -> Self {
        Self {
            dimension: 384,
            latency_ms: 0,
            failure_rate: 0.0,
            calls: AtomicUsize::new(0),
        }
    }

    /// Set the embedding dimension.
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    /// Simulate per-call latency.
    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    /// Set failure rate (0.0 - 1.0) for testing error handling.
    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        self.failure_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Number of embed calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    /// Generate a deterministic embedding from text.
    ///
    /// Character-position hashing keeps the output reproducible; vectors
    /// are normalized to unit length.
    pub fn generate(text: &str, dimension: usize) -> Vec<f32> {
        let mut vec = vec![0.0_f32; dimension];
        for (i, token) in text.split_whitespace().enumerate() {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let idx = (hasher.finish() as usize).wrapping_add(i / 8) % dimension;
            vec[idx] += 1.0;
        }
        // Fall back to char hashing for whitespace-free input.
        if vec.iter().all(|v| *v == 0.0) {
            for (i, c) in text.chars().enumerate() {
                let idx = (c as usize + i) % dimension;
                vec[idx] += 0.1;
            }
        }
        normalize(&mut vec);
        vec
    }

    fn should_fail(&self) -> bool {
        use rand::Rng;
        self.failure_rate > 0.0 && rand::thread_rng().gen::<f64>() < self.failure_rate
    }
}

impl Default for MockEmbeddingBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingBackend for MockEmbeddingBackend {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if self.latency_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.latency_ms)).await;
        }
        if self.should_fail() {
            return Err(Error::Embedding("simulated failure".into()));
        }
        Ok(texts
            .iter()
            .map(|t| Self::generate(t, self.dimension))
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "mock-embedding"
    }
}

fn normalize(vec: &mut [f32]) {
    let magnitude: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        vec.iter_mut().for_each(|x| *x /= magnitude);
    }
}

/// Cosine similarity between two vectors of equal dimension.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Vectors must have same dimension");

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if mag_a > 0.0 && mag_b > 0.0 {
        dot / (mag_a * mag_b)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_backend_dimension() {
        let backend = MockEmbeddingBackend::new().with_dimension(128);
        let vectors = backend.embed_texts(&["test".to_string()]).await.unwrap();
        assert_eq!(vectors.len(), 1);
        assert_eq!(vectors[0].len(), 128);
    }

    #[tokio::test]
    async fn test_mock_backend_deterministic() {
        let backend = MockEmbeddingBackend::new();
        let a = backend
            .embed_texts(&["quantum computing".to_string()])
            .await
            .unwrap();
        let b = backend
            .embed_texts(&["quantum computing".to_string()])
            .await
            .unwrap();
        assert_eq!(a, b, "Embeddings should be deterministic");
    }

    #[tokio::test]
    async fn test_mock_backend_similar_texts_score_higher() {
        let backend = MockEmbeddingBackend::new();
        let texts = vec![
            "rust memory cache tiers".to_string(),
            "rust memory cache layers".to_string(),
            "gardening tips for spring".to_string(),
        ];
        let vectors = backend.embed_texts(&texts).await.unwrap();

        let close = cosine_similarity(&vectors[0], &vectors[1]);
        let far = cosine_similarity(&vectors[0], &vectors[2]);
        assert!(close > far, "related texts should be closer: {close} vs {far}");
    }

    #[tokio::test]
    async fn test_mock_backend_empty_batch() {
        let backend = MockEmbeddingBackend::new();
        let vectors = backend.embed_texts(&[]).await.unwrap();
        assert!(vectors.is_empty());
    }

    #[tokio::test]
    async fn test_mock_backend_failure_simulation() {
        let backend = MockEmbeddingBackend::new().with_failure_rate(1.0);
        let result = backend.embed_texts(&["test".to_string()]).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_mock_backend_call_counting() {
        let backend = MockEmbeddingBackend::new();
        backend.embed_texts(&["a".to_string()]).await.unwrap();
        backend.embed_texts(&["b".to_string()]).await.unwrap();
        assert_eq!(backend.call_count(), 2);
    }

    #[test]
    fn test_generate_normalized() {
        let vec = MockEmbeddingBackend::generate("some text to embed", 128);
        let magnitude: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((magnitude - 1.0).abs() < 0.01, "should be unit length");
    }

    #[test]
    fn test_generate_no_whitespace_input() {
        let vec = MockEmbeddingBackend::generate("unbrokenrun", 64);
        let magnitude: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((magnitude - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_cosine_similarity_bounds() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        let c = vec![0.0, 1.0, 0.0];

        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 0.01);
        assert!(cosine_similarity(&a, &c).abs() < 0.01);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[0.0, 0.0]), 0.0);
    }

    #[test]
    fn test_embedding_request_serialization() {
        let request = EmbeddingRequest {
            model: "nomic-embed-text".to_string(),
            input: vec!["hello".to_string()],
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"model\":\"nomic-embed-text\""));
        assert!(json.contains("\"input\":[\"hello\"]"));
    }

    #[test]
    fn test_embedding_response_deserialization() {
        let json = r#"{"embeddings": [[0.1, 0.2, 0.3], [0.4, 0.5, 0.6]]}"#;
        let response: EmbeddingResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.embeddings.len(), 2);
        assert_eq!(response.embeddings[0], vec![0.1, 0.2, 0.3]);
    }
}
