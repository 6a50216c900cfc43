//! Application state.

use std::sync::Arc;

use vprompt_storage::{BlobConfig, BlobStore};
use vprompt_store::{connect_shared_store, SharedStore, StoreConfig};

use crate::config::ApiConfig;
use crate::error::ApiResult;
use crate::middleware::RateLimiterCache;
use crate::services::Notifier;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub store: SharedStore,
    pub blobs: BlobStore,
    pub notifier: Notifier,
    pub rate_limiter: Arc<RateLimiterCache>,
}

impl AppState {
    /// Assemble state from already-opened stores.
    pub fn new(config: ApiConfig, store: SharedStore, blobs: BlobStore) -> ApiResult<Self> {
        let notifier = Notifier::new(config.notify_timeout)?;
        let rate_limiter = Arc::new(RateLimiterCache::new(
            config.rate_limit_rps,
            config.rate_limit_burst,
        ));
        Ok(Self {
            config,
            store,
            blobs,
            notifier,
            rate_limiter,
        })
    }

    /// Open the configured task store and blob root.
    pub async fn from_env(config: ApiConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let store_config = StoreConfig::from_env()?;
        let store = connect_shared_store(&store_config).await?;
        let blobs = BlobStore::from_config(&BlobConfig::from_env());
        Ok(Self::new(config, store, blobs)?)
    }
}
