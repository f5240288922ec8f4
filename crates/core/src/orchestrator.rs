use crate::chunking::{chunk_documents, ChunkingConfig};
use crate::config::RetrievalConfig;
use crate::embeddings::{EmbeddingGateway, EmbeddingProvider};
use crate::similarity::round_score;
use crate::traits::{CorpusSource, VectorIndex};
use crate::{
    CollectionStats, HealthReport, IndexedRecord, InitializeReport, InitializeStatus,
    RetrievalError, SearchParams, SearchResult,
};
use tracing::{debug, info, warn};

/// Loads the corpus into a vector index and answers similarity queries over it.
pub struct RetrievalEngine<P, V, C> {
    config: RetrievalConfig,
    gateway: EmbeddingGateway<P>,
    index: V,
    corpus: C,
}

impl<P, V, C> RetrievalEngine<P, V, C>
where
    P: EmbeddingProvider + Send + Sync,
    V: VectorIndex + Send + Sync,
    C: CorpusSource + Send + Sync,
{
    pub fn new(
        config: RetrievalConfig,
        provider: P,
        index: V,
        corpus: C,
    ) -> Result<Self, RetrievalError> {
        config.validate()?;
        if provider.dimensions() != config.embedding_dimensions {
            return Err(RetrievalError::Configuration(format!(
                "provider {} produces {} dimensions, configured for {}",
                provider.model(),
                provider.dimensions(),
                config.embedding_dimensions
            )));
        }

        Ok(Self {
            config,
            gateway: EmbeddingGateway::new(provider),
            index,
            corpus,
        })
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    pub fn gateway(&self) -> &EmbeddingGateway<P> {
        &self.gateway
    }

    pub fn index(&self) -> &V {
        &self.index
    }

    /// Populates the index unless it already holds data.
    ///
    /// With `force_rebuild` the existing records are dropped and the corpus
    /// is embedded again in a single batch.
    pub async fn initialize(
        &self,
        force_rebuild: bool,
    ) -> Result<InitializeReport, RetrievalError> {
        let existing = self.index.count().await?;

        if existing > 0 && !force_rebuild {
            self.ensure_same_model().await?;
            info!(count = existing, "collection already initialized");
            return Ok(InitializeReport {
                status: InitializeStatus::Exists,
                message: format!("Collection already initialized with {existing} documents"),
                count: existing,
            });
        }

        if force_rebuild && existing > 0 {
            info!(count = existing, "dropping collection for rebuild");
            self.index.delete_all().await?;
        }

        let documents = self.corpus.load_corpus()?;
        let chunks = chunk_documents(&documents, ChunkingConfig::from(&self.config));
        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();

        info!(
            documents = documents.len(),
            chunks = chunks.len(),
            model = self.gateway.model(),
            "generating embeddings"
        );
        let vectors = self.gateway.embed_many(&texts).await?;

        let records: Vec<IndexedRecord> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexedRecord {
                id: chunk.id,
                vector,
                text: chunk.text,
                metadata: chunk.metadata,
            })
            .collect();

        self.index.upsert(&records, self.gateway.model()).await?;

        let count = records.len();
        info!(count, "collection initialized");
        Ok(InitializeReport {
            status: InitializeStatus::Created,
            message: format!("Successfully initialized collection with {count} documents"),
            count,
        })
    }

    /// Returns up to `top_k` nearest records whose similarity reaches the threshold.
    ///
    /// Records below the threshold are dropped without fetching replacements,
    /// so fewer than `top_k` results is normal.
    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        similarity_threshold: f64,
    ) -> Result<Vec<SearchResult>, RetrievalError> {
        if query.trim().is_empty() {
            return Err(RetrievalError::Validation("query is empty".to_string()));
        }

        if self.index.count().await? == 0 {
            debug!("search on empty collection");
            return Ok(Vec::new());
        }
        self.ensure_same_model().await?;

        debug!(top_k, similarity_threshold, "searching collection");
        let query_vector = self.gateway.embed_one(query).await?;
        let neighbors = self.index.nearest(&query_vector, top_k).await?;

        let metric = self.config.distance_metric;
        Ok(neighbors
            .into_iter()
            .filter_map(|neighbor| {
                let similarity = round_score(metric.similarity_from_distance(neighbor.distance));
                if similarity < similarity_threshold {
                    return None;
                }
                Some(SearchResult {
                    id: neighbor.id,
                    document_text: neighbor.text,
                    metadata: neighbor.metadata,
                    similarity_score: similarity,
                    distance: round_score(neighbor.distance),
                })
            })
            .collect())
    }

    pub async fn search_with(
        &self,
        params: SearchParams,
    ) -> Result<Vec<SearchResult>, RetrievalError> {
        let params = params.validate()?;
        self.search(&params.query, params.top_k, params.similarity_threshold)
            .await
    }

    /// Searches with the configured `top_k` and threshold.
    pub async fn search_with_defaults(
        &self,
        query: &str,
    ) -> Result<Vec<SearchResult>, RetrievalError> {
        self.search(query, self.config.top_k, self.config.similarity_threshold)
            .await
    }

    pub async fn stats(&self) -> Result<CollectionStats, RetrievalError> {
        Ok(CollectionStats {
            collection_name: self.config.collection_name.clone(),
            document_count: self.index.count().await?,
            persist_directory: self.index.location(),
        })
    }

    pub async fn health(&self) -> HealthReport {
        match self.index.count().await {
            Ok(count) => HealthReport {
                status: "healthy".to_string(),
                documents_loaded: Some(count),
                error: None,
            },
            Err(error) => HealthReport {
                status: "unhealthy".to_string(),
                documents_loaded: None,
                error: Some(error.to_string()),
            },
        }
    }

    /// Releases the index handle.
    pub async fn shutdown(self) -> Result<(), RetrievalError> {
        self.index.close().await
    }

    async fn ensure_same_model(&self) -> Result<(), RetrievalError> {
        if let Some(stored) = self.index.embedding_model().await? {
            if stored != self.gateway.model() {
                warn!(
                    stored = %stored,
                    configured = self.gateway.model(),
                    "embedding model mismatch"
                );
                return Err(RetrievalError::Configuration(format!(
                    "collection was built with {stored}, not {}; rebuild with force_rebuild",
                    self.gateway.model()
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::{CharacterNgramEmbedder, IndexedEmbedding};
    use crate::models::{Document, Metadata, Neighbor};
    use crate::similarity::DistanceMetric;
    use crate::stores::LocalStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;

    const DIMENSIONS: usize = 64;

    #[derive(Clone)]
    struct CountingEmbedder {
        inner: CharacterNgramEmbedder,
        calls: Arc<AtomicUsize>,
        model: &'static str,
    }

    impl CountingEmbedder {
        fn new(model: &'static str) -> Self {
            Self {
                inner: CharacterNgramEmbedder {
                    dimensions: DIMENSIONS,
                },
                calls: Arc::new(AtomicUsize::new(0)),
                model,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EmbeddingProvider for CountingEmbedder {
        fn model(&self) -> &str {
            self.model
        }

        fn dimensions(&self) -> usize {
            DIMENSIONS
        }

        async fn embed_batch(
            &self,
            texts: &[String],
        ) -> Result<Vec<IndexedEmbedding>, RetrievalError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.embed_batch(texts).await
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FailingEmbedder {
        fn model(&self) -> &str {
            "failing"
        }

        fn dimensions(&self) -> usize {
            DIMENSIONS
        }

        async fn embed_batch(
            &self,
            _texts: &[String],
        ) -> Result<Vec<IndexedEmbedding>, RetrievalError> {
            Err(RetrievalError::provider("failing", "quota exceeded"))
        }
    }

    /// Index returning fixed neighbours regardless of the query.
    struct ScriptedIndex {
        neighbors: Vec<Neighbor>,
        requested_k: Mutex<Option<usize>>,
    }

    impl ScriptedIndex {
        fn with_distances(distances: &[f64]) -> Self {
            Self {
                neighbors: distances
                    .iter()
                    .enumerate()
                    .map(|(position, distance)| Neighbor {
                        id: format!("{}_chunk_0", position + 1),
                        text: format!("quote {}", position + 1),
                        metadata: Metadata::new(),
                        distance: *distance,
                    })
                    .collect(),
                requested_k: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl VectorIndex for ScriptedIndex {
        async fn upsert(
            &self,
            _records: &[IndexedRecord],
            _embedding_model: &str,
        ) -> Result<(), RetrievalError> {
            Ok(())
        }

        async fn count(&self) -> Result<usize, RetrievalError> {
            Ok(self.neighbors.len())
        }

        async fn delete_all(&self) -> Result<(), RetrievalError> {
            Ok(())
        }

        async fn nearest(
            &self,
            _query_vector: &[f32],
            k: usize,
        ) -> Result<Vec<Neighbor>, RetrievalError> {
            if let Ok(mut requested) = self.requested_k.lock() {
                *requested = Some(k);
            }
            Ok(self.neighbors.iter().take(k).cloned().collect())
        }

        async fn embedding_model(&self) -> Result<Option<String>, RetrievalError> {
            Ok(None)
        }

        fn location(&self) -> String {
            "memory".to_string()
        }
    }

    struct VecCorpus(Vec<Document>);

    impl CorpusSource for VecCorpus {
        fn load_corpus(&self) -> Result<Vec<Document>, RetrievalError> {
            Ok(self.0.clone())
        }
    }

    fn quote(id: &str, text: &str) -> Document {
        let mut metadata = Metadata::new();
        metadata.insert("movie".to_string(), format!("Movie {id}").into());
        Document {
            id: id.to_string(),
            text: text.to_string(),
            metadata,
        }
    }

    fn corpus() -> VecCorpus {
        VecCorpus(vec![
            quote("1", "May the Force be with you."),
            quote("2", "Here's looking at you, kid."),
            quote("3", "I'll be back."),
            quote("4", "You talking to me?"),
        ])
    }

    fn config(directory: &std::path::Path) -> RetrievalConfig {
        RetrievalConfig {
            embedding_model: "counting".to_string(),
            embedding_dimensions: DIMENSIONS,
            persist_directory: directory.display().to_string(),
            ..RetrievalConfig::default()
        }
    }

    async fn local_engine(
        directory: &std::path::Path,
        embedder: CountingEmbedder,
    ) -> Result<RetrievalEngine<CountingEmbedder, LocalStore, VecCorpus>, RetrievalError> {
        let config = config(directory);
        let store =
            LocalStore::open(directory, &config.collection_name, DistanceMetric::Cosine).await?;
        RetrievalEngine::new(config, embedder, store, corpus())
    }

    #[tokio::test]
    async fn initialize_is_idempotent_without_force() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let embedder = CountingEmbedder::new("counting");
        let engine = local_engine(dir.path(), embedder.clone()).await?;

        let first = engine.initialize(false).await?;
        assert_eq!(first.status, InitializeStatus::Created);
        assert_eq!(first.count, 4);
        assert_eq!(embedder.calls(), 1);

        let second = engine.initialize(false).await?;
        assert_eq!(second.status, InitializeStatus::Exists);
        assert_eq!(second.count, 4);
        assert_eq!(embedder.calls(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn force_rebuild_never_duplicates() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let embedder = CountingEmbedder::new("counting");
        let engine = local_engine(dir.path(), embedder.clone()).await?;

        engine.initialize(false).await?;
        let rebuilt = engine.initialize(true).await?;
        assert_eq!(rebuilt.status, InitializeStatus::Created);
        assert_eq!(rebuilt.count, 4);
        assert_eq!(engine.stats().await?.document_count, 4);
        assert_eq!(embedder.calls(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn long_documents_become_several_records() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let mut config = config(dir.path());
        config.chunk_size = 10;
        config.chunk_overlap = 2;
        let store =
            LocalStore::open(dir.path(), &config.collection_name, DistanceMetric::Cosine).await?;
        let engine = RetrievalEngine::new(
            config,
            CountingEmbedder::new("counting"),
            store,
            VecCorpus(vec![quote("long", "abcdefghijklmnopqrstuvwxyz")]),
        )?;

        let report = engine.initialize(false).await?;
        assert_eq!(report.count, 3);
        Ok(())
    }

    #[tokio::test]
    async fn empty_index_search_skips_embedding() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let embedder = CountingEmbedder::new("counting");
        let engine = local_engine(dir.path(), embedder.clone()).await?;

        let results = engine.search("force", 5, 0.0).await?;
        assert!(results.is_empty());
        assert_eq!(embedder.calls(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn search_finds_exact_quote_first() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let engine = local_engine(dir.path(), CountingEmbedder::new("counting")).await?;
        engine.initialize(false).await?;

        let results = engine.search("I'll be back.", 3, 0.0).await?;
        assert_eq!(results[0].id, "3_chunk_0");
        assert_eq!(results[0].similarity_score, 1.0);
        assert_eq!(results[0].distance, 0.0);
        assert!(results.len() <= 3);
        for pair in results.windows(2) {
            assert!(pair[0].similarity_score >= pair[1].similarity_score);
        }
        Ok(())
    }

    #[tokio::test]
    async fn scores_are_rounded_and_thresholded() -> Result<(), Box<dyn std::error::Error>> {
        let index = ScriptedIndex::with_distances(&[0.1, 0.23456, 0.5, 0.9]);
        let engine = RetrievalEngine::new(
            config(std::path::Path::new("unused")),
            CountingEmbedder::new("counting"),
            index,
            corpus(),
        )?;

        let results = engine.search("quote", 4, 0.3).await?;
        let scores: Vec<f64> = results.iter().map(|result| result.similarity_score).collect();
        assert_eq!(scores, vec![0.9, 0.7654, 0.5]);
        assert_eq!(results[1].distance, 0.2346);
        assert!(results.iter().all(|result| result.similarity_score >= 0.3));
        Ok(())
    }

    #[tokio::test]
    async fn threshold_does_not_backfill() -> Result<(), Box<dyn std::error::Error>> {
        let index = ScriptedIndex::with_distances(&[0.8, 0.85, 0.05]);
        let engine = RetrievalEngine::new(
            config(std::path::Path::new("unused")),
            CountingEmbedder::new("counting"),
            index,
            corpus(),
        )?;

        let results = engine.search("quote", 2, 0.5).await?;
        assert!(results.is_empty());
        assert_eq!(*engine.index().requested_k.lock().unwrap(), Some(2));
        Ok(())
    }

    #[tokio::test]
    async fn empty_query_is_a_validation_error() -> Result<(), Box<dyn std::error::Error>> {
        let engine = RetrievalEngine::new(
            config(std::path::Path::new("unused")),
            CountingEmbedder::new("counting"),
            ScriptedIndex::with_distances(&[0.1]),
            corpus(),
        )?;

        let error = engine.search("", 5, 0.3).await.unwrap_err();
        assert!(error.is_client_fault());

        let params = SearchParams {
            query: "   ".to_string(),
            top_k: 5,
            similarity_threshold: 0.3,
        };
        assert!(engine.search_with(params).await.unwrap_err().is_client_fault());
        Ok(())
    }

    #[tokio::test]
    async fn provider_failures_propagate() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let config = config(dir.path());
        let store =
            LocalStore::open(dir.path(), &config.collection_name, DistanceMetric::Cosine).await?;
        let engine = RetrievalEngine::new(config, FailingEmbedder, store, corpus())?;

        let error = engine.initialize(false).await.unwrap_err();
        assert!(error.is_provider_failure());
        assert_eq!(engine.stats().await?.document_count, 0);
        Ok(())
    }

    #[tokio::test]
    async fn model_change_requires_rebuild() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let engine = local_engine(dir.path(), CountingEmbedder::new("model-a")).await?;
        engine.initialize(false).await?;
        engine.shutdown().await?;

        let engine = local_engine(dir.path(), CountingEmbedder::new("model-b")).await?;
        assert!(matches!(
            engine.initialize(false).await,
            Err(RetrievalError::Configuration(_))
        ));
        assert!(matches!(
            engine.search("back", 5, 0.0).await,
            Err(RetrievalError::Configuration(_))
        ));

        let rebuilt = engine.initialize(true).await?;
        assert_eq!(rebuilt.status, InitializeStatus::Created);
        assert!(!engine.search("I'll be back.", 5, 0.0).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn dimension_mismatch_is_rejected_at_construction() {
        let config = RetrievalConfig::default();
        let result = RetrievalEngine::new(
            config,
            CountingEmbedder::new("counting"),
            ScriptedIndex::with_distances(&[]),
            corpus(),
        );
        assert!(matches!(result, Err(RetrievalError::Configuration(_))));
    }

    #[tokio::test]
    async fn stats_and_health_report_collection() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let engine = local_engine(dir.path(), CountingEmbedder::new("counting")).await?;
        engine.initialize(false).await?;

        let stats = engine.stats().await?;
        assert_eq!(stats.collection_name, "movie_quotes");
        assert_eq!(stats.persist_directory, dir.path().display().to_string());

        let health = engine.health().await;
        assert_eq!(health.status, "healthy");
        assert_eq!(health.documents_loaded, Some(4));
        Ok(())
    }
}
