pub mod chunking;
pub mod config;
pub mod dataset;
pub mod embeddings;
pub mod error;
pub mod models;
pub mod openai;
pub mod orchestrator;
pub mod similarity;
pub mod stores;
pub mod traits;

pub use chunking::{chunk_document, chunk_documents, split_text, ChunkingConfig};
pub use config::RetrievalConfig;
pub use dataset::{format_quote_for_embedding, read_quotes, CsvQuoteCorpus, MovieQuote};
pub use embeddings::{
    CharacterNgramEmbedder, EmbeddingGateway, EmbeddingProvider, IndexedEmbedding,
    NGRAM_EMBEDDING_DIMENSIONS,
};
pub use error::{Result, RetrievalError};
pub use models::{
    Chunk, CollectionStats, Document, HealthReport, IndexedRecord, InitializeReport,
    InitializeStatus, Metadata, MetadataValue, Neighbor, SearchParams, SearchResult, MAX_TOP_K,
};
pub use openai::OpenAiEmbeddingProvider;
pub use orchestrator::RetrievalEngine;
pub use similarity::{round_score, DistanceMetric};
pub use stores::{LocalStore, QdrantStore};
pub use traits::{CorpusSource, VectorIndex};
