//! Worker client error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerClientError>;

#[derive(Debug, Error)]
pub enum WorkerClientError {
    #[error("No worker endpoints configured")]
    NoEndpoints,

    #[error("Invalid worker endpoint {0}: {1}")]
    InvalidEndpoint(String, String),

    #[error("Failed to read workers file {0}: {1}")]
    WorkersFile(String, String),

    #[error("Worker {worker} rejected job: {status} {body}")]
    Rejected {
        worker: String,
        status: u16,
        body: String,
    },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WorkerClientError {
    pub fn invalid_endpoint(endpoint: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidEndpoint(endpoint.into(), reason.to_string())
    }

    /// Only failures where the request never reached the worker are retried,
    /// so a job is never handed over twice.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkerClientError::Network(e) => e.is_connect(),
            _ => false,
        }
    }
}
