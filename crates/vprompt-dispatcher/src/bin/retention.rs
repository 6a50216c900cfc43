//! Deletes finished tasks older than `RETENTION_DAYS` and their blobs.
//!
//! Meant to be run from cron, e.g. `0 2 * * * vprompt-retention`.

use tracing::info;

use vprompt_dispatcher::logging::init_tracing;
use vprompt_dispatcher::{retention, DispatcherConfig};
use vprompt_storage::{BlobConfig, BlobStore};
use vprompt_store::{connect_shared_store, StoreConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = DispatcherConfig::from_env();
    let store_config = StoreConfig::from_env()?;
    let store = connect_shared_store(&store_config).await?;
    let blobs = BlobStore::from_config(&BlobConfig::from_env());

    let removed = retention::sweep(&store, &blobs, config.retention_days).await?;
    info!(
        deleted = removed.len(),
        days = config.retention_days,
        "vprompt-retention finished"
    );
    Ok(())
}
