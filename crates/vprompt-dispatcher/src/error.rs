//! Dispatcher error types.

use thiserror::Error;

pub type DispatchResult<T> = Result<T, DispatchError>;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Store error: {0}")]
    Store(#[from] vprompt_store::StoreError),

    #[error("Blob error: {0}")]
    Blob(#[from] vprompt_storage::BlobError),

    #[error("Worker error: {0}")]
    Worker(#[from] vprompt_worker_client::WorkerClientError),
}

impl DispatchError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }
}
