use crate::similarity::DistanceMetric;
use crate::traits::VectorIndex;
use crate::{IndexedRecord, Neighbor, RetrievalError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::debug;

const BACKEND: &str = "local";
const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedCollection {
    version: u32,
    metric: DistanceMetric,
    embedding_model: Option<String>,
    dimensions: Option<usize>,
    records: Vec<IndexedRecord>,
}

impl PersistedCollection {
    fn empty(metric: DistanceMetric) -> Self {
        Self {
            version: FORMAT_VERSION,
            metric,
            embedding_model: None,
            dimensions: None,
            records: Vec::new(),
        }
    }
}

/// File-backed collection searched exhaustively.
///
/// The whole collection lives in `<directory>/<collection>.json` and is
/// rewritten through a temporary file on every mutation. Nothing is written
/// on close, so a reader handle never clobbers another handle's rebuild.
pub struct LocalStore {
    directory: PathBuf,
    path: PathBuf,
    state: RwLock<PersistedCollection>,
}

impl LocalStore {
    /// Opens the collection, creating the directory when needed.
    ///
    /// An existing file must have been created with the same metric.
    pub async fn open(
        directory: impl AsRef<Path>,
        collection: &str,
        metric: DistanceMetric,
    ) -> Result<Self, RetrievalError> {
        let directory = directory.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&directory).await?;
        let path = directory.join(format!("{collection}.json"));

        let state = if tokio::fs::try_exists(&path).await? {
            let data = tokio::fs::read_to_string(&path).await?;
            let persisted: PersistedCollection = serde_json::from_str(&data)?;
            if persisted.metric != metric {
                return Err(RetrievalError::Configuration(format!(
                    "collection {collection} uses {} distance, not {metric}",
                    persisted.metric
                )));
            }
            debug!(path = %path.display(), records = persisted.records.len(), "loaded collection");
            persisted
        } else {
            PersistedCollection::empty(metric)
        };

        Ok(Self {
            directory,
            path,
            state: RwLock::new(state),
        })
    }

    async fn persist(&self, state: &PersistedCollection) -> Result<(), RetrievalError> {
        let data = serde_json::to_vec(state)?;
        let staging = self.path.with_extension("json.tmp");
        tokio::fs::write(&staging, data).await?;
        tokio::fs::rename(&staging, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for LocalStore {
    async fn upsert(
        &self,
        records: &[IndexedRecord],
        embedding_model: &str,
    ) -> Result<(), RetrievalError> {
        if records.is_empty() {
            return Ok(());
        }

        let mut state = self.state.write().await;

        if !state.records.is_empty() {
            if let Some(existing) = state.embedding_model.as_deref() {
                if existing != embedding_model {
                    return Err(RetrievalError::Configuration(format!(
                        "collection holds {existing} embeddings, refusing {embedding_model}"
                    )));
                }
            }
        }

        let dimensions = match state.dimensions.filter(|_| !state.records.is_empty()) {
            Some(dimensions) => dimensions,
            None => records[0].vector.len(),
        };
        if let Some(record) = records.iter().find(|record| record.vector.len() != dimensions) {
            return Err(RetrievalError::provider(
                BACKEND,
                format!(
                    "record {} has dimension {} != {}",
                    record.id,
                    record.vector.len(),
                    dimensions
                ),
            ));
        }

        let mut next = state.clone();
        for record in records {
            match next.records.iter_mut().find(|stored| stored.id == record.id) {
                Some(stored) => *stored = record.clone(),
                None => next.records.push(record.clone()),
            }
        }
        next.embedding_model = Some(embedding_model.to_string());
        next.dimensions = Some(dimensions);

        self.persist(&next).await?;
        *state = next;
        Ok(())
    }

    async fn count(&self) -> Result<usize, RetrievalError> {
        Ok(self.state.read().await.records.len())
    }

    async fn delete_all(&self) -> Result<(), RetrievalError> {
        let mut state = self.state.write().await;
        let next = PersistedCollection::empty(state.metric);
        self.persist(&next).await?;
        *state = next;
        Ok(())
    }

    async fn nearest(
        &self,
        query_vector: &[f32],
        k: usize,
    ) -> Result<Vec<Neighbor>, RetrievalError> {
        let state = self.state.read().await;
        if let Some(dimensions) = state.dimensions {
            if !state.records.is_empty() && query_vector.len() != dimensions {
                return Err(RetrievalError::provider(
                    BACKEND,
                    format!("query vector dim {} is not {}", query_vector.len(), dimensions),
                ));
            }
        }

        let mut scored: Vec<(f64, &IndexedRecord)> = state
            .records
            .iter()
            .map(|record| (state.metric.distance(query_vector, &record.vector), record))
            .collect();
        scored.sort_by(|left, right| left.0.total_cmp(&right.0));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(distance, record)| Neighbor {
                id: record.id.clone(),
                text: record.text.clone(),
                metadata: record.metadata.clone(),
                distance,
            })
            .collect())
    }

    async fn embedding_model(&self) -> Result<Option<String>, RetrievalError> {
        Ok(self.state.read().await.embedding_model.clone())
    }

    fn location(&self) -> String {
        self.directory.display().to_string()
    }
}
