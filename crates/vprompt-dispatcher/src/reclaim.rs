//! Background sweep returning expired leases to the waiting state.
//!
//! A task whose handover failed, or whose worker vanished, stays IN_PROGRESS.
//! Once its lease is older than the configured limit it is reverted to
//! WAITING and picked up again by the dispatcher.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{error, info, warn};
use vprompt_models::TaskId;
use vprompt_store::{SharedStore, TaskStore};

use crate::error::{DispatchError, DispatchResult};
use crate::metrics;

/// Reclaim sweep service.
pub struct ReclaimSweep {
    store: SharedStore,
    lease: Duration,
    every: Duration,
}

impl ReclaimSweep {
    pub fn new(store: SharedStore, lease: Duration, every: Duration) -> Self {
        Self { store, lease, every }
    }

    /// Run until the shutdown flag flips to true.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Starting reclaim sweep (lease: {:?}, interval: {:?})",
            self.lease, self.every
        );

        let mut ticker = interval(self.every);
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_once().await {
                        error!("Reclaim sweep error: {}", e);
                    }
                }
            }
        }
    }

    /// Run a single sweep.
    pub async fn sweep_once(&self) -> DispatchResult<Vec<TaskId>> {
        let lease = chrono::Duration::from_std(self.lease)
            .map_err(|e| DispatchError::config_error(format!("lease too long: {}", e)))?;
        let cutoff = Utc::now() - lease;

        let reclaimed = self.store.reclaim_stale(cutoff).await?;
        for task_id in &reclaimed {
            warn!(task_id = %task_id, "Lease expired, task returned to waiting");
        }
        if !reclaimed.is_empty() {
            info!("Reclaim sweep complete: {} tasks reclaimed", reclaimed.len());
            metrics::record_reclaimed(reclaimed.len());
        }
        Ok(reclaimed)
    }
}
