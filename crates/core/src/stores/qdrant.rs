use crate::models::Metadata;
use crate::similarity::DistanceMetric;
use crate::traits::VectorIndex;
use crate::{IndexedRecord, Neighbor, RetrievalError};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

const BACKEND: &str = "qdrant";

pub struct QdrantStore {
    endpoint: String,
    collection: String,
    client: Client,
    vector_size: usize,
    metric: DistanceMetric,
}

impl QdrantStore {
    pub fn new(
        endpoint: impl Into<String>,
        collection: impl Into<String>,
        vector_size: usize,
        metric: DistanceMetric,
    ) -> Result<Self, RetrievalError> {
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        url::Url::parse(&endpoint)?;

        Ok(Self {
            endpoint,
            collection: collection.into(),
            client: Client::new(),
            vector_size,
            metric,
        })
    }

    fn collection_url(&self) -> String {
        format!("{}/collections/{}", self.endpoint, self.collection)
    }

    pub async fn ensure_collection(&self) -> Result<(), RetrievalError> {
        let response = self.client.get(self.collection_url()).send().await?;
        if response.status().is_success() {
            return Ok(());
        }
        if response.status() != StatusCode::NOT_FOUND {
            return Err(backend_error(response.status()));
        }

        let response = self
            .client
            .put(self.collection_url())
            .json(&json!({
                "vectors": {
                    "size": self.vector_size,
                    "distance": qdrant_distance(self.metric),
                }
            }))
            .send()
            .await?;
        check(response)?;
        debug!(collection = %self.collection, "created qdrant collection");
        Ok(())
    }
}

fn qdrant_distance(metric: DistanceMetric) -> &'static str {
    match metric {
        DistanceMetric::Cosine => "Cosine",
        DistanceMetric::Euclidean => "Euclid",
        DistanceMetric::InnerProduct => "Dot",
    }
}

/// Qdrant reports similarity for cosine and dot, and the raw distance for euclid.
fn distance_from_score(metric: DistanceMetric, score: f64) -> f64 {
    match metric {
        DistanceMetric::Cosine => (1.0 - score).clamp(0.0, 2.0),
        DistanceMetric::InnerProduct => (1.0 - score).max(0.0),
        DistanceMetric::Euclidean => score,
    }
}

/// Qdrant only accepts integers or UUIDs as point ids.
fn point_id(record_id: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, record_id.as_bytes())
}

fn backend_error(status: StatusCode) -> RetrievalError {
    RetrievalError::provider(BACKEND, status.to_string())
}

fn check(response: Response) -> Result<Response, RetrievalError> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(backend_error(response.status()))
    }
}

fn malformed(details: impl Into<String>) -> RetrievalError {
    RetrievalError::provider(BACKEND, details)
}

fn neighbor_from_hit(metric: DistanceMetric, hit: &Value) -> Result<Neighbor, RetrievalError> {
    let id = hit
        .pointer("/payload/record_id")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("search hit without payload.record_id"))?;
    let text = hit
        .pointer("/payload/text")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed(format!("search hit {id} without payload.text")))?;
    let score = hit
        .pointer("/score")
        .and_then(Value::as_f64)
        .ok_or_else(|| malformed(format!("search hit {id} without score")))?;
    let metadata = match hit.pointer("/payload/metadata") {
        None | Some(Value::Null) => Metadata::new(),
        Some(value) => serde_json::from_value::<Metadata>(value.clone()).map_err(|err| {
            malformed(format!("search hit {id} has unreadable metadata: {err}"))
        })?,
    };

    Ok(Neighbor {
        id: id.to_string(),
        text: text.to_string(),
        metadata,
        distance: distance_from_score(metric, score),
    })
}

fn parse_count(body: &Value) -> Result<usize, RetrievalError> {
    body.pointer("/result/count")
        .and_then(Value::as_u64)
        .map(|count| count as usize)
        .ok_or_else(|| malformed("count missing from response"))
}

fn parse_neighbors(
    metric: DistanceMetric,
    body: &Value,
) -> Result<Vec<Neighbor>, RetrievalError> {
    body.pointer("/result")
        .and_then(Value::as_array)
        .ok_or_else(|| malformed("search result missing from response"))?
        .iter()
        .map(|hit| neighbor_from_hit(metric, hit))
        .collect()
}

/// Points written before the model was recorded carry no `embedding_model`.
fn parse_embedding_model(body: &Value) -> Result<Option<String>, RetrievalError> {
    let points = body
        .pointer("/result/points")
        .and_then(Value::as_array)
        .ok_or_else(|| malformed("scroll points missing from response"))?;

    Ok(points
        .first()
        .and_then(|point| point.pointer("/payload/embedding_model"))
        .and_then(Value::as_str)
        .map(str::to_string))
}

#[async_trait]
impl VectorIndex for QdrantStore {
    async fn upsert(
        &self,
        records: &[IndexedRecord],
        embedding_model: &str,
    ) -> Result<(), RetrievalError> {
        let points = records
            .iter()
            .map(|record| {
                if record.vector.len() != self.vector_size {
                    return Err(RetrievalError::provider(
                        BACKEND,
                        format!(
                            "embedding dimension {} != {}",
                            record.vector.len(),
                            self.vector_size
                        ),
                    ));
                }

                Ok(json!({
                    "id": point_id(&record.id).to_string(),
                    "vector": record.vector,
                    "payload": {
                        "record_id": record.id,
                        "text": record.text,
                        "metadata": record.metadata,
                        "embedding_model": embedding_model,
                    },
                }))
            })
            .collect::<Result<Vec<_>, RetrievalError>>()?;

        if points.is_empty() {
            return Ok(());
        }

        self.ensure_collection().await?;

        let response = self
            .client
            .put(format!("{}/points?wait=true", self.collection_url()))
            .json(&json!({ "points": points }))
            .send()
            .await?;
        check(response)?;
        Ok(())
    }

    async fn count(&self) -> Result<usize, RetrievalError> {
        let response = self
            .client
            .post(format!("{}/points/count", self.collection_url()))
            .json(&json!({ "exact": true }))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(0);
        }

        let parsed: Value = check(response)?.json().await?;
        parse_count(&parsed)
    }

    async fn delete_all(&self) -> Result<(), RetrievalError> {
        let response = self.client.delete(self.collection_url()).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        check(response)?;
        Ok(())
    }

    async fn nearest(
        &self,
        query_vector: &[f32],
        k: usize,
    ) -> Result<Vec<Neighbor>, RetrievalError> {
        if query_vector.len() != self.vector_size {
            return Err(RetrievalError::provider(
                BACKEND,
                format!(
                    "query vector dim {} is not {}",
                    query_vector.len(),
                    self.vector_size
                ),
            ));
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .post(format!("{}/points/search", self.collection_url()))
            .json(&json!({
                "vector": query_vector,
                "limit": k,
                "with_payload": true,
            }))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }

        let parsed: Value = check(response)?.json().await?;
        parse_neighbors(self.metric, &parsed)
    }

    async fn embedding_model(&self) -> Result<Option<String>, RetrievalError> {
        let response = self
            .client
            .post(format!("{}/points/scroll", self.collection_url()))
            .json(&json!({
                "limit": 1,
                "with_payload": ["embedding_model"],
                "with_vector": false,
            }))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let parsed: Value = check(response)?.json().await?;
        parse_embedding_model(&parsed)
    }

    fn location(&self) -> String {
        self.collection_url()
    }
}
