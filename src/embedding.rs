use crate::error::{JournalError, Result};
use crate::similarity::tokens;
use async_trait::async_trait;

/// Source of embedding vectors for the embedding-similarity gate
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn name(&self) -> &'static str;
    fn dimension(&self) -> usize;

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| JournalError::Embedding(format!("{} returned no vector", self.name())))
    }
}

/// Zero-config embedding provider.
///
/// Hashed bag of normalized tokens, L2-normalized. Deterministic with no
/// network or model download; it catches reworded duplicates that share
/// vocabulary, not paraphrases.
#[derive(Debug, Clone)]
pub struct HashEmbeddingProvider {
    dimension: usize,
}

impl HashEmbeddingProvider {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vec = vec![0.0f32; self.dimension];

        for token in tokens(text) {
            // FNV-1a
            let mut hash = 1469598103934665603u64;
            for b in token.as_bytes() {
                hash ^= *b as u64;
                hash = hash.wrapping_mul(1099511628211u64);
            }
            vec[(hash as usize) % self.dimension] += 1.0;
        }

        let norm = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vec {
                *v /= norm;
            }
        }

        vec
    }
}

impl Default for HashEmbeddingProvider {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddingProvider {
    fn name(&self) -> &'static str {
        "hash"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::similarity::cosine;

    #[tokio::test]
    async fn test_hash_embedding_is_normalized_and_stable() {
        let provider = HashEmbeddingProvider::new(64);
        let a = provider.embed_one("Who helped you grow?").await.unwrap();
        let b = provider.embed_one("who HELPED you grow").await.unwrap();

        assert_eq!(a.len(), 64);
        assert_eq!(a, b);
        let norm = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_empty_text_embeds_to_zero_vector() {
        let provider = HashEmbeddingProvider::default();
        let v = provider.embed_one("?!").await.unwrap();
        assert!(v.iter().all(|x| *x == 0.0));
        assert_eq!(cosine(&v, &v), 0.0);
    }

    #[tokio::test]
    async fn test_shared_vocabulary_scores_high() {
        let provider = HashEmbeddingProvider::default();
        let a = provider.embed_one("What fear still shapes your choices").await.unwrap();
        let b = provider.embed_one("What fear still shapes your choices now").await.unwrap();
        assert!(cosine(&a, &b) > 0.85);
    }
}
