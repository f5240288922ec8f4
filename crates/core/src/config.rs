use crate::error::RetrievalError;
use crate::similarity::DistanceMetric;
use serde::{Deserialize, Serialize};

pub const DEFAULT_CHUNK_SIZE: usize = 500;
pub const DEFAULT_CHUNK_OVERLAP: usize = 50;
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 1536;
pub const DEFAULT_TOP_K: usize = 5;
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.3;
pub const DEFAULT_COLLECTION_NAME: &str = "movie_quotes";
pub const DEFAULT_PERSIST_DIRECTORY: &str = "./vector_db";

/// Settings handed to each component when it is constructed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalConfig {
    /// Characters per chunk.
    pub chunk_size: usize,
    /// Characters shared by consecutive chunks.
    pub chunk_overlap: usize,
    pub embedding_model: String,
    pub embedding_dimensions: usize,
    pub top_k: usize,
    pub similarity_threshold: f64,
    pub collection_name: String,
    pub persist_directory: String,
    pub distance_metric: DistanceMetric,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            embedding_dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
            top_k: DEFAULT_TOP_K,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            collection_name: DEFAULT_COLLECTION_NAME.to_string(),
            persist_directory: DEFAULT_PERSIST_DIRECTORY.to_string(),
            distance_metric: DistanceMetric::Cosine,
        }
    }
}

impl RetrievalConfig {
    pub fn validate(&self) -> Result<(), RetrievalError> {
        if self.chunk_size == 0 {
            return Err(RetrievalError::Configuration(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.embedding_dimensions == 0 {
            return Err(RetrievalError::Configuration(
                "embedding_dimensions must be greater than zero".to_string(),
            ));
        }
        if self.collection_name.trim().is_empty() {
            return Err(RetrievalError::Configuration(
                "collection_name must not be empty".to_string(),
            ));
        }
        if self.embedding_model.trim().is_empty() {
            return Err(RetrievalError::Configuration(
                "embedding_model must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
