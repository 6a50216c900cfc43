//! Retention sweep over finished tasks.

use chrono::{Duration, Utc};
use tracing::info;
use vprompt_models::TaskId;
use vprompt_storage::BlobStore;
use vprompt_store::{SharedStore, TaskStore};

use crate::error::{DispatchError, DispatchResult};
use crate::metrics;

/// Delete DONE tasks older than `days` along with their blob directories.
pub async fn sweep(store: &SharedStore, blobs: &BlobStore, days: i64) -> DispatchResult<Vec<TaskId>> {
    if days < 0 {
        return Err(DispatchError::config_error(format!(
            "RETENTION_DAYS must not be negative, got {}",
            days
        )));
    }

    let cutoff = Utc::now() - Duration::days(days);
    info!(cutoff = %cutoff, "Running retention sweep");

    let removed = store.delete_older_than(cutoff, blobs).await?;
    metrics::record_expired(removed.len());
    info!("Retention sweep complete: {} tasks deleted", removed.len());
    Ok(removed)
}
