//! Deterministic offline provider implementations.
//!
//! These keep the pipeline total when no service is configured. The
//! generation stub echoes a bounded prompt prefix; the embedder hashes
//! tokens into signed buckets and normalizes, so texts sharing vocabulary
//! land near each other in vector space. Both are pure functions of their
//! input, which the test suites rely on.

use crate::{CompletionRequest, EmbeddingProvider, GenerationProvider, ProviderError};
use async_trait::async_trait;

/// Echoes the first `max_tokens` characters of the prompt.
pub struct StubGeneration;

#[async_trait]
impl GenerationProvider for StubGeneration {
    async fn complete(&self, request: CompletionRequest) -> Result<String, ProviderError> {
        let limit = request.max_tokens as usize;
        Ok(request.prompt.chars().take(limit).collect())
    }
}

/// Token-hash embeddings: each token lands in an FNV-chosen bucket with an
/// FNV-chosen sign, and the vector is L2-normalized.
pub struct TokenHashEmbedder {
    dimension: usize,
}

impl TokenHashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in tokenize(text) {
            let hash = fnv1a64(&token);
            let idx = (hash % self.dimension as u64) as usize;
            let sign = if ((hash >> 32) & 1) == 0 { 1.0 } else { -1.0 };
            vector[idx] += sign;
        }
        let norm2: f32 = vector.iter().map(|x| x * x).sum();
        if norm2 > 0.0 {
            let inv = 1.0 / norm2.sqrt();
            for x in vector.iter_mut() {
                *x *= inv;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for TokenHashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        Ok(self.embed_sync(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn fnv1a64(s: &str) -> u64 {
    let mut hash: u64 = 14695981039346656037;
    for byte in s.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(1099511628211);
    }
    hash
}
