//! Store configuration and backend selection.

use std::str::FromStr;
use std::sync::Arc;

use tracing::info;

use crate::error::{StoreError, StoreResult};
use crate::partitioned::PartitionedTaskStore;
use crate::sqlite::SqliteTaskStore;
use crate::traits::SharedStore;

/// Which backend persists tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    /// One SQL table with a status column
    #[default]
    Sqlite,
    /// Three in-process state partitions
    Partitioned,
}

impl StoreBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreBackend::Sqlite => "sqlite",
            StoreBackend::Partitioned => "partitioned",
        }
    }

    /// Whether separate processes opening this backend see the same tasks.
    pub fn is_shared(&self) -> bool {
        matches!(self, StoreBackend::Sqlite)
    }
}

impl FromStr for StoreBackend {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "sql" => Ok(StoreBackend::Sqlite),
            "partitioned" | "memory" => Ok(StoreBackend::Partitioned),
            other => Err(StoreError::config(format!("unknown STORE_BACKEND: {}", other))),
        }
    }
}

/// Task store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// sqlx SQLite URL, used by the sqlite backend
    pub database_url: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Sqlite,
            database_url: "sqlite://vprompt.db".to_string(),
        }
    }
}

impl StoreConfig {
    /// Create config from environment variables.
    pub fn from_env() -> StoreResult<Self> {
        let defaults = Self::default();
        let backend = match std::env::var("STORE_BACKEND") {
            Ok(raw) => raw.parse()?,
            Err(_) => defaults.backend,
        };
        Ok(Self {
            backend,
            database_url: std::env::var("DATABASE_URL").unwrap_or(defaults.database_url),
        })
    }
}

/// Open the configured backend for a binary that cooperates with others
/// through the store. The partitioned backend is refused: each process would
/// get its own empty copy.
pub async fn connect_shared_store(config: &StoreConfig) -> StoreResult<SharedStore> {
    if !config.backend.is_shared() {
        return Err(StoreError::config(format!(
            "STORE_BACKEND={} lives in one process and cannot be shared between the gateway and dispatcher",
            config.backend.as_str()
        )));
    }
    connect_store(config).await
}

/// Open the configured backend.
pub async fn connect_store(config: &StoreConfig) -> StoreResult<SharedStore> {
    info!(backend = config.backend.as_str(), "Opening task store");
    let store: SharedStore = match config.backend {
        StoreBackend::Sqlite => Arc::new(SqliteTaskStore::connect(&config.database_url).await?),
        StoreBackend::Partitioned => Arc::new(PartitionedTaskStore::new()),
    };
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::TaskStore;

    #[test]
    fn test_backend_parsing() {
        assert_eq!("SQLite".parse::<StoreBackend>().unwrap(), StoreBackend::Sqlite);
        assert_eq!(
            "partitioned".parse::<StoreBackend>().unwrap(),
            StoreBackend::Partitioned
        );
        assert!("mongo".parse::<StoreBackend>().is_err());
    }

    #[tokio::test]
    async fn test_connect_partitioned() {
        let config = StoreConfig {
            backend: StoreBackend::Partitioned,
            ..Default::default()
        };
        let store = connect_store(&config).await.unwrap();
        store.ping().await.unwrap();
    }

    #[tokio::test]
    async fn test_shared_store_refuses_partitioned() {
        let config = StoreConfig {
            backend: StoreBackend::Partitioned,
            ..Default::default()
        };
        let err = match connect_shared_store(&config).await {
            Ok(_) => panic!("expected an error"),
            Err(e) => e,
        };
        assert!(matches!(err, StoreError::Config(_)));

        let config = StoreConfig {
            backend: StoreBackend::Sqlite,
            database_url: "sqlite::memory:".to_string(),
        };
        let store = connect_shared_store(&config).await.unwrap();
        store.ping().await.unwrap();
    }
}
