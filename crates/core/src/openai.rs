//! Embedding provider backed by the OpenAI embeddings API.

use crate::embeddings::{EmbeddingProvider, IndexedEmbedding};
use crate::error::RetrievalError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::error;
use url::Url;

pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1/";

const BACKEND: &str = "openai";

pub struct OpenAiEmbeddingProvider {
    client: Client,
    endpoint: Url,
    api_key: String,
    model: String,
    dimensions: usize,
}

impl OpenAiEmbeddingProvider {
    /// Fails with a configuration error when no API key is supplied.
    pub fn new(
        api_key: Option<String>,
        model: impl Into<String>,
        dimensions: usize,
    ) -> Result<Self, RetrievalError> {
        Self::with_base_url(api_key, model, dimensions, OPENAI_API_BASE)
    }

    pub fn with_base_url(
        api_key: Option<String>,
        model: impl Into<String>,
        dimensions: usize,
        base_url: &str,
    ) -> Result<Self, RetrievalError> {
        let api_key = api_key
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                RetrievalError::Configuration(
                    "OpenAI API key not found; set OPENAI_API_KEY".to_string(),
                )
            })?;

        let base = if base_url.ends_with('/') {
            Url::parse(base_url)?
        } else {
            Url::parse(&format!("{base_url}/"))?
        };

        Ok(Self {
            client: Client::new(),
            endpoint: base.join("embeddings")?,
            api_key,
            model: model.into(),
            dimensions,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    fn model(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<IndexedEmbedding>, RetrievalError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await
            .map_err(|err| {
                error!(backend = BACKEND, error = %err, "embedding request failed");
                RetrievalError::provider(BACKEND, format!("request failed: {err}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorResponse>(&body)
                .map(|parsed| parsed.error.message)
                .unwrap_or(body);
            error!(backend = BACKEND, %status, "embedding API error");
            return Err(RetrievalError::provider(
                BACKEND,
                format!("API returned {status}: {detail}"),
            ));
        }

        let parsed: EmbeddingResponse = response.json().await.map_err(|err| {
            RetrievalError::provider(BACKEND, format!("failed to parse response: {err}"))
        })?;

        Ok(parsed
            .data
            .into_iter()
            .map(|item| IndexedEmbedding {
                index: item.index,
                embedding: item.embedding,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_is_a_configuration_error() {
        for key in [None, Some(String::new()), Some("   ".to_string())] {
            let result = OpenAiEmbeddingProvider::new(key, "text-embedding-3-small", 1536);
            assert!(matches!(result, Err(RetrievalError::Configuration(_))));
        }
    }

    #[test]
    fn endpoint_is_joined_onto_base_url() {
        let provider = OpenAiEmbeddingProvider::with_base_url(
            Some("sk-test".to_string()),
            "text-embedding-3-small",
            1536,
            "http://localhost:8080/v1",
        )
        .unwrap();
        assert_eq!(
            provider.endpoint().as_str(),
            "http://localhost:8080/v1/embeddings"
        );
        assert_eq!(provider.model(), "text-embedding-3-small");
    }

    #[test]
    fn response_items_keep_their_index() {
        let body = r#"{"data":[{"index":1,"embedding":[0.5]},{"index":0,"embedding":[0.25]}]}"#;
        let parsed: EmbeddingResponse = serde_json::from_str(body).unwrap();
        let indices: Vec<usize> = parsed.data.iter().map(|item| item.index).collect();
        assert_eq!(indices, vec![1, 0]);
    }
}
