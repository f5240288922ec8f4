use crate::error::RetrievalError;
use async_trait::async_trait;
use tracing::debug;

const DEFAULT: usize = 128;

pub const NGRAM_EMBEDDING_DIMENSIONS: usize = DEFAULT;

/// One vector from a batch, tagged with the position of its input text.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedEmbedding {
    pub index: usize,
    pub embedding: Vec<f32>,
}

/// A remote or local service turning text into fixed-length vectors.
///
/// Providers may return batch items in any order as long as each item
/// carries the index of the input it belongs to.
#[async_trait]
pub trait EmbeddingProvider {
    fn model(&self) -> &str;

    fn dimensions(&self) -> usize;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<IndexedEmbedding>, RetrievalError>;
}

/// Order-preserving front for an [`EmbeddingProvider`].
pub struct EmbeddingGateway<P> {
    provider: P,
}

impl<P> EmbeddingGateway<P>
where
    P: EmbeddingProvider + Send + Sync,
{
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn model(&self) -> &str {
        self.provider.model()
    }

    pub fn dimensions(&self) -> usize {
        self.provider.dimensions()
    }

    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>, RetrievalError> {
        let mut vectors = self.embed_many(&[text.to_string()]).await?;
        vectors.pop().ok_or_else(|| {
            RetrievalError::provider(self.provider.model(), "empty embedding response")
        })
    }

    /// Embeds all texts in one provider call; output `i` belongs to input `i`.
    pub async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RetrievalError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            model = self.provider.model(),
            batch_size = texts.len(),
            "embedding batch"
        );

        let mut items = self.provider.embed_batch(texts).await?;
        if items.len() != texts.len() {
            return Err(RetrievalError::provider(
                self.provider.model(),
                format!(
                    "embedding count {} doesn't match input count {}",
                    items.len(),
                    texts.len()
                ),
            ));
        }

        items.sort_by_key(|item| item.index);

        let expected = self.provider.dimensions();
        items
            .into_iter()
            .enumerate()
            .map(|(position, item)| {
                if item.index != position {
                    return Err(RetrievalError::provider(
                        self.provider.model(),
                        format!("missing embedding for input {position}"),
                    ));
                }
                if item.embedding.len() != expected {
                    return Err(RetrievalError::provider(
                        self.provider.model(),
                        format!("embedding dimension {} != {}", item.embedding.len(), expected),
                    ));
                }
                Ok(item.embedding)
            })
            .collect()
    }
}

/// Offline embedder hashing character trigrams into a normalised vector.
#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: NGRAM_EMBEDDING_DIMENSIONS,
        }
    }
}

impl CharacterNgramEmbedder {
    pub const MODEL: &'static str = "char-trigram-hash";

    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return vector;
        }

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

#[async_trait]
impl EmbeddingProvider for CharacterNgramEmbedder {
    fn model(&self) -> &str {
        Self::MODEL
    }

    fn dimensions(&self) -> usize {
        self.dimensions.max(1)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<IndexedEmbedding>, RetrievalError> {
        Ok(texts
            .iter()
            .enumerate()
            .map(|(index, text)| IndexedEmbedding {
                index,
                embedding: self.embed(text),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Answers batches in reverse order, encoding each input's length.
    struct ReversingProvider;

    #[async_trait]
    impl EmbeddingProvider for ReversingProvider {
        fn model(&self) -> &str {
            "reversing"
        }

        fn dimensions(&self) -> usize {
            1
        }

        async fn embed_batch(
            &self,
            texts: &[String],
        ) -> Result<Vec<IndexedEmbedding>, RetrievalError> {
            Ok(texts
                .iter()
                .enumerate()
                .rev()
                .map(|(index, text)| IndexedEmbedding {
                    index,
                    embedding: vec![text.len() as f32],
                })
                .collect())
        }
    }

    struct ShortProvider;

    #[async_trait]
    impl EmbeddingProvider for ShortProvider {
        fn model(&self) -> &str {
            "short"
        }

        fn dimensions(&self) -> usize {
            4
        }

        async fn embed_batch(
            &self,
            texts: &[String],
        ) -> Result<Vec<IndexedEmbedding>, RetrievalError> {
            Ok(texts
                .iter()
                .enumerate()
                .map(|(index, _)| IndexedEmbedding {
                    index,
                    embedding: vec![0.0; 2],
                })
                .collect())
        }
    }

    #[test]
    fn embedder_is_deterministic() {
        let embedder = CharacterNgramEmbedder::default();
        let first = embedder.embed("Here's looking at you, kid.");
        let second = embedder.embed("Here's looking at you, kid.");
        assert_eq!(first, second);
    }

    #[test]
    fn embedder_outputs_expected_length() {
        let embedder = CharacterNgramEmbedder { dimensions: 32 };
        let vector = embedder.embed("abc");
        assert_eq!(vector.len(), 32);
    }

    #[tokio::test]
    async fn embed_many_restores_input_order() {
        let gateway = EmbeddingGateway::new(ReversingProvider);
        let texts = vec!["a".to_string(), "bbb".to_string(), "cc".to_string()];
        let vectors = gateway.embed_many(&texts).await.unwrap();
        assert_eq!(vectors, vec![vec![1.0], vec![3.0], vec![2.0]]);
    }

    #[tokio::test]
    async fn embed_one_returns_single_vector() {
        let gateway = EmbeddingGateway::new(CharacterNgramEmbedder { dimensions: 16 });
        let vector = gateway.embed_one("you talking to me?").await.unwrap();
        assert_eq!(vector.len(), 16);
    }

    #[tokio::test]
    async fn dimension_mismatch_is_a_provider_error() {
        let gateway = EmbeddingGateway::new(ShortProvider);
        let error = gateway.embed_one("hello").await.unwrap_err();
        assert!(error.is_provider_failure());
    }

    #[tokio::test]
    async fn empty_batch_skips_provider() {
        let gateway = EmbeddingGateway::new(ShortProvider);
        assert!(gateway.embed_many(&[]).await.unwrap().is_empty());
    }
}
