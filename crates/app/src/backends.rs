use async_trait::async_trait;
use quote_retrieval_core::{
    CharacterNgramEmbedder, EmbeddingProvider, IndexedEmbedding, IndexedRecord, LocalStore,
    Neighbor, OpenAiEmbeddingProvider, QdrantStore, RetrievalError, VectorIndex,
};

/// Embedding backend chosen on the command line.
pub enum Embedder {
    OpenAi(OpenAiEmbeddingProvider),
    Ngram(CharacterNgramEmbedder),
}

#[async_trait]
impl EmbeddingProvider for Embedder {
    fn model(&self) -> &str {
        match self {
            Self::OpenAi(provider) => provider.model(),
            Self::Ngram(provider) => provider.model(),
        }
    }

    fn dimensions(&self) -> usize {
        match self {
            Self::OpenAi(provider) => provider.dimensions(),
            Self::Ngram(provider) => provider.dimensions(),
        }
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<IndexedEmbedding>, RetrievalError> {
        match self {
            Self::OpenAi(provider) => provider.embed_batch(texts).await,
            Self::Ngram(provider) => provider.embed_batch(texts).await,
        }
    }
}

/// Vector store chosen on the command line.
pub enum Store {
    Local(LocalStore),
    Qdrant(QdrantStore),
}

#[async_trait]
impl VectorIndex for Store {
    async fn upsert(
        &self,
        records: &[IndexedRecord],
        embedding_model: &str,
    ) -> Result<(), RetrievalError> {
        match self {
            Self::Local(store) => store.upsert(records, embedding_model).await,
            Self::Qdrant(store) => store.upsert(records, embedding_model).await,
        }
    }

    async fn count(&self) -> Result<usize, RetrievalError> {
        match self {
            Self::Local(store) => store.count().await,
            Self::Qdrant(store) => store.count().await,
        }
    }

    async fn delete_all(&self) -> Result<(), RetrievalError> {
        match self {
            Self::Local(store) => store.delete_all().await,
            Self::Qdrant(store) => store.delete_all().await,
        }
    }

    async fn nearest(
        &self,
        query_vector: &[f32],
        k: usize,
    ) -> Result<Vec<Neighbor>, RetrievalError> {
        match self {
            Self::Local(store) => store.nearest(query_vector, k).await,
            Self::Qdrant(store) => store.nearest(query_vector, k).await,
        }
    }

    async fn embedding_model(&self) -> Result<Option<String>, RetrievalError> {
        match self {
            Self::Local(store) => store.embedding_model().await,
            Self::Qdrant(store) => store.embedding_model().await,
        }
    }

    fn location(&self) -> String {
        match self {
            Self::Local(store) => store.location(),
            Self::Qdrant(store) => store.location(),
        }
    }

    async fn close(&self) -> Result<(), RetrievalError> {
        match self {
            Self::Local(store) => store.close().await,
            Self::Qdrant(store) => store.close().await,
        }
    }
}
