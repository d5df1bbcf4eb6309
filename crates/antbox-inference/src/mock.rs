//! Mock model backends for deterministic testing.
//!
//! [`MockEmbedding`] derives each vector from a hash of the input
//! text, so equal inputs always embed identically and similarity is
//! reproducible without a model server. Fixed per-input vectors can be
//! pinned for precise score assertions.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use antbox_core::{EmbeddingModel, Error, OcrModel, Result};

/// Deterministic mock [`EmbeddingModel`].
#[derive(Clone)]
pub struct MockEmbedding {
    dimension: usize,
    fixed: HashMap<String, Vec<f32>>,
    fail: bool,
    calls: Arc<Mutex<Vec<String>>>,
}

impl Default for MockEmbedding {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEmbedding {
    pub fn new() -> Self {
        Self {
            dimension: 8,
            fixed: HashMap::new(),
            fail: false,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Set the embedding dimension.
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    /// Pin the vector returned for a specific input.
    pub fn with_fixed_vector(mut self, input: impl Into<String>, vector: Vec<f32>) -> Self {
        self.fixed.insert(input.into(), vector);
        self
    }

    /// Make every call fail, for error-path testing.
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Inputs seen so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        if let Some(pinned) = self.fixed.get(text) {
            return pinned.clone();
        }
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        let mut rng = StdRng::seed_from_u64(hasher.finish());
        let mut vector: Vec<f32> = (0..self.dimension).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingModel for MockEmbedding {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if self.fail {
            return Err(Error::Embedding("mock embedding failure".to_string()));
        }
        let mut calls = self.calls.lock().unwrap();
        calls.extend(texts.iter().cloned());
        Ok(texts.iter().map(|text| self.vector_for(text)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Mock [`OcrModel`] returning a fixed text per mimetype.
#[derive(Clone, Default)]
pub struct MockOcr {
    texts: HashMap<String, String>,
    fallback: String,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockOcr {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the text returned for any mimetype without a mapping.
    pub fn with_fallback(mut self, text: impl Into<String>) -> Self {
        self.fallback = text.into();
        self
    }

    /// Pin the text returned for a specific mimetype.
    pub fn with_text(mut self, mimetype: impl Into<String>, text: impl Into<String>) -> Self {
        self.texts.insert(mimetype.into(), text.into());
        self
    }

    /// Mimetypes seen so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl OcrModel for MockOcr {
    async fn ocr(&self, _content: &[u8], mimetype: &str) -> Result<String> {
        self.calls.lock().unwrap().push(mimetype.to_string());
        Ok(self
            .texts
            .get(mimetype)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_embeddings_are_deterministic() {
        let backend = MockEmbedding::new().with_dimension(16);
        let a = backend.embed(&["hello world".to_string()]).await.unwrap();
        let b = backend.embed(&["hello world".to_string()]).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a[0].len(), 16);
    }

    #[tokio::test]
    async fn test_distinct_inputs_embed_differently() {
        let backend = MockEmbedding::new();
        let vectors = backend
            .embed(&["alpha".to_string(), "beta".to_string()])
            .await
            .unwrap();
        assert_ne!(vectors[0], vectors[1]);
    }

    #[tokio::test]
    async fn test_vectors_are_unit_norm() {
        let backend = MockEmbedding::new().with_dimension(32);
        let vectors = backend.embed(&["anything".to_string()]).await.unwrap();
        let norm: f32 = vectors[0].iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn test_fixed_vector_mapping() {
        let backend = MockEmbedding::new().with_fixed_vector("query", vec![1.0, 0.0]);
        let vectors = backend.embed(&["query".to_string()]).await.unwrap();
        assert_eq!(vectors[0], vec![1.0, 0.0]);
    }

    #[tokio::test]
    async fn test_call_log() {
        let backend = MockEmbedding::new();
        backend.embed(&["a".to_string(), "b".to_string()]).await.unwrap();
        assert_eq!(backend.calls(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn test_failing_backend() {
        let backend = MockEmbedding::new().failing();
        let err = backend.embed(&["a".to_string()]).await.unwrap_err();
        assert!(matches!(err, Error::Embedding(_)));
    }

    #[tokio::test]
    async fn test_mock_ocr_mapping_and_fallback() {
        let ocr = MockOcr::new()
            .with_fallback("generic text")
            .with_text("application/pdf", "invoice total 100");

        let pdf = ocr.ocr(b"%PDF", "application/pdf").await.unwrap();
        assert_eq!(pdf, "invoice total 100");

        let png = ocr.ocr(b"\x89PNG", "image/png").await.unwrap();
        assert_eq!(png, "generic text");

        assert_eq!(ocr.calls(), vec!["application/pdf", "image/png"]);
    }
}
