mod backends;

use backends::{Embedder, Store};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use quote_retrieval_core::config::{
    DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE, DEFAULT_COLLECTION_NAME, DEFAULT_EMBEDDING_MODEL,
    DEFAULT_PERSIST_DIRECTORY, DEFAULT_SIMILARITY_THRESHOLD, DEFAULT_TOP_K,
};
use quote_retrieval_core::openai::OPENAI_API_BASE;
use quote_retrieval_core::{
    CharacterNgramEmbedder, CsvQuoteCorpus, DistanceMetric, LocalStore, OpenAiEmbeddingProvider,
    QdrantStore, RetrievalConfig, RetrievalEngine, RetrievalError, SearchParams,
    NGRAM_EMBEDDING_DIMENSIONS,
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const OPENAI_EMBEDDING_DIMENSIONS: usize = 1536;

#[derive(Parser)]
#[command(name = "quote-retrieval", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// CSV file with quote,movie,year,type columns
    #[arg(long, env = "QUOTE_RETRIEVAL_DATASET", default_value = "data/movie_quotes.csv")]
    dataset: String,

    /// Vector store backend
    #[arg(long, env = "QUOTE_RETRIEVAL_BACKEND", value_enum, default_value_t = Backend::Local)]
    backend: Backend,

    /// Directory holding the local collection file
    #[arg(
        long,
        env = "QUOTE_RETRIEVAL_PERSIST_DIRECTORY",
        default_value = DEFAULT_PERSIST_DIRECTORY
    )]
    persist_directory: String,

    /// Qdrant base URL
    #[arg(long, env = "QUOTE_RETRIEVAL_QDRANT_URL", default_value = "http://localhost:6333")]
    qdrant_url: String,

    /// Collection name
    #[arg(long, env = "QUOTE_RETRIEVAL_COLLECTION", default_value = DEFAULT_COLLECTION_NAME)]
    collection: String,

    /// Embedding backend
    #[arg(
        long,
        env = "QUOTE_RETRIEVAL_EMBEDDER",
        value_enum,
        default_value_t = EmbedderKind::OpenAi
    )]
    embedder: EmbedderKind,

    /// OpenAI API key
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: Option<String>,

    /// OpenAI-compatible API base URL
    #[arg(long, env = "QUOTE_RETRIEVAL_OPENAI_BASE_URL", default_value = OPENAI_API_BASE)]
    openai_base_url: String,

    /// Embedding model identifier
    #[arg(long, env = "QUOTE_RETRIEVAL_EMBEDDING_MODEL", default_value = DEFAULT_EMBEDDING_MODEL)]
    embedding_model: String,

    /// Embedding dimensions; defaults to the embedder's native size
    #[arg(long, env = "QUOTE_RETRIEVAL_EMBEDDING_DIMENSIONS")]
    embedding_dimensions: Option<usize>,

    /// Characters per chunk
    #[arg(long, env = "QUOTE_RETRIEVAL_CHUNK_SIZE", default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,

    /// Characters shared between consecutive chunks
    #[arg(long, env = "QUOTE_RETRIEVAL_CHUNK_OVERLAP", default_value_t = DEFAULT_CHUNK_OVERLAP)]
    chunk_overlap: usize,

    /// Default number of results per search
    #[arg(long, env = "QUOTE_RETRIEVAL_TOP_K", default_value_t = DEFAULT_TOP_K)]
    top_k: usize,

    /// Default minimum similarity per search
    #[arg(
        long,
        env = "QUOTE_RETRIEVAL_SIMILARITY_THRESHOLD",
        default_value_t = DEFAULT_SIMILARITY_THRESHOLD
    )]
    similarity_threshold: f64,

    /// Print results as JSON
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Backend {
    Local,
    Qdrant,
}

#[derive(Clone, Copy, ValueEnum)]
enum EmbedderKind {
    #[value(name = "openai")]
    OpenAi,
    Ngram,
}

#[derive(Subcommand)]
enum Command {
    /// Embed the dataset into the collection.
    Initialize {
        /// Drop existing records and rebuild.
        #[arg(long, default_value_t = false)]
        force_rebuild: bool,
    },
    /// Return the quotes most similar to a query.
    Search {
        /// Search query
        #[arg(long)]
        query: String,
        /// Number of candidates to return.
        #[arg(long)]
        top_k: Option<usize>,
        /// Minimum similarity score between 0 and 1.
        #[arg(long)]
        similarity_threshold: Option<f64>,
    },
    /// Show collection statistics.
    Stats,
    /// Show the effective configuration.
    Config,
    /// Check that the collection is reachable.
    Health,
}

impl Cli {
    fn retrieval_config(&self) -> RetrievalConfig {
        let (embedding_model, native_dimensions) = match self.embedder {
            EmbedderKind::OpenAi => (self.embedding_model.clone(), OPENAI_EMBEDDING_DIMENSIONS),
            EmbedderKind::Ngram => (
                CharacterNgramEmbedder::MODEL.to_string(),
                NGRAM_EMBEDDING_DIMENSIONS,
            ),
        };

        RetrievalConfig {
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
            embedding_model,
            embedding_dimensions: self.embedding_dimensions.unwrap_or(native_dimensions),
            top_k: self.top_k,
            similarity_threshold: self.similarity_threshold,
            collection_name: self.collection.clone(),
            persist_directory: self.persist_directory.clone(),
            distance_metric: DistanceMetric::Cosine,
        }
    }

    fn embedder(&self, config: &RetrievalConfig) -> Result<Embedder, RetrievalError> {
        Ok(match self.embedder {
            EmbedderKind::OpenAi => Embedder::OpenAi(OpenAiEmbeddingProvider::with_base_url(
                self.openai_api_key.clone(),
                config.embedding_model.clone(),
                config.embedding_dimensions,
                &self.openai_base_url,
            )?),
            EmbedderKind::Ngram => Embedder::Ngram(CharacterNgramEmbedder {
                dimensions: config.embedding_dimensions,
            }),
        })
    }

    async fn store(&self, config: &RetrievalConfig) -> Result<Store, RetrievalError> {
        Ok(match self.backend {
            Backend::Local => Store::Local(
                LocalStore::open(
                    &config.persist_directory,
                    &config.collection_name,
                    config.distance_metric,
                )
                .await?,
            ),
            Backend::Qdrant => Store::Qdrant(QdrantStore::new(
                &self.qdrant_url,
                &config.collection_name,
                config.embedding_dimensions,
                config.distance_metric,
            )?),
        })
    }
}

/// Prefixes the failure class so client faults read differently from outages.
fn describe(error: RetrievalError) -> anyhow::Error {
    let class = if error.is_client_fault() {
        "invalid request"
    } else if matches!(error, RetrievalError::Configuration(_)) {
        "configuration error"
    } else if error.is_provider_failure() {
        "provider failure"
    } else {
        "internal error"
    };
    anyhow::anyhow!("{class}: {error}")
}

/// A failed command is reported ahead of a failed shutdown.
fn finish(outcome: anyhow::Result<()>, closed: Result<(), RetrievalError>) -> anyhow::Result<()> {
    match (outcome, closed) {
        (Err(error), Err(close_error)) => {
            warn!(error = %close_error, "shutdown failed after command error");
            Err(error)
        }
        (Err(error), Ok(())) => Err(error),
        (Ok(()), closed) => closed.map_err(describe),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = cli.retrieval_config();
    config.validate().map_err(describe)?;

    if let Command::Config = cli.command {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let embedder = cli.embedder(&config).map_err(describe)?;
    let store = cli.store(&config).await.map_err(describe)?;
    let corpus = CsvQuoteCorpus::new(&cli.dataset);
    let engine = RetrievalEngine::new(config, embedder, store, corpus).map_err(describe)?;

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        collection = %engine.config().collection_name,
        "quote-retrieval boot"
    );

    let outcome = run(&cli, &engine).await;
    finish(outcome, engine.shutdown().await)
}

async fn run(
    cli: &Cli,
    engine: &RetrievalEngine<Embedder, Store, CsvQuoteCorpus>,
) -> anyhow::Result<()> {
    match &cli.command {
        Command::Initialize { force_rebuild } => {
            let report = engine.initialize(*force_rebuild).await.map_err(describe)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("status={} count={}", report.status.as_str(), report.count);
                println!("{}", report.message);
            }
        }
        Command::Search {
            query,
            top_k,
            similarity_threshold,
        } => {
            let params = SearchParams {
                query: query.clone(),
                top_k: top_k.unwrap_or(engine.config().top_k),
                similarity_threshold: similarity_threshold
                    .unwrap_or(engine.config().similarity_threshold),
            }
            .validate()
            .map_err(describe)?;

            let results = engine
                .search(&params.query, params.top_k, params.similarity_threshold)
                .await
                .map_err(describe)?;

            if cli.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "query": params.query,
                        "results": results,
                        "total_results": results.len(),
                        "parameters": {
                            "top_k": params.top_k,
                            "similarity_threshold": params.similarity_threshold,
                        },
                    }))?
                );
                return Ok(());
            }

            println!("query: {}", params.query);
            if results.is_empty() {
                println!("no results above similarity {:.2}", params.similarity_threshold);
            }
            for result in results {
                println!(
                    "[{}] similarity={:.4} distance={:.4}",
                    result.id, result.similarity_score, result.distance
                );
                println!("{}", result.document_text);
            }
        }
        Command::Stats => {
            let stats = engine.stats().await.map_err(describe)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!(
                    "collection={} documents={} location={}",
                    stats.collection_name, stats.document_count, stats.persist_directory
                );
            }
        }
        Command::Health => {
            let health = engine.health().await;
            println!("{}", serde_json::to_string_pretty(&health)?);
        }
        Command::Config => {}
    }

    Ok(())
}
