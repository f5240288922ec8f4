use crate::{Document, IndexedRecord, Neighbor, RetrievalError};
use async_trait::async_trait;

/// Durable store of embedded records queried by nearest-neighbour search.
#[async_trait]
pub trait VectorIndex {
    /// Adds records built with `embedding_model` to the collection.
    async fn upsert(
        &self,
        records: &[IndexedRecord],
        embedding_model: &str,
    ) -> Result<(), RetrievalError>;

    async fn count(&self) -> Result<usize, RetrievalError>;

    async fn delete_all(&self) -> Result<(), RetrievalError>;

    /// Up to `k` records ordered by ascending distance.
    async fn nearest(&self, query_vector: &[f32], k: usize)
        -> Result<Vec<Neighbor>, RetrievalError>;

    /// Model the stored vectors were produced with, if known.
    async fn embedding_model(&self) -> Result<Option<String>, RetrievalError>;

    /// Where the collection lives, for reporting.
    fn location(&self) -> String;

    async fn close(&self) -> Result<(), RetrievalError> {
        Ok(())
    }
}

pub trait CorpusSource {
    fn load_corpus(&self) -> Result<Vec<Document>, RetrievalError>;
}
