use thiserror::Error;

#[derive(Debug, Error)]
pub enum RetrievalError {
    /// A required credential, endpoint, or setting is missing or unusable.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The embedding provider or the vector store failed or answered badly.
    #[error("invalid response from {backend}: {details}")]
    Provider { backend: String, details: String },

    /// Caller-supplied parameters are outside the accepted contract.
    #[error("validation error: {0}")]
    Validation(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

impl RetrievalError {
    pub fn provider(backend: impl Into<String>, details: impl Into<String>) -> Self {
        Self::Provider {
            backend: backend.into(),
            details: details.into(),
        }
    }

    pub fn is_client_fault(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    pub fn is_provider_failure(&self) -> bool {
        matches!(self, Self::Provider { .. } | Self::Http(_))
    }
}

pub type Result<T, E = RetrievalError> = std::result::Result<T, E>;
