//! Store contracts shared by every backend.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{info, warn};
use vprompt_models::{NewTask, OwnerToken, Task, TaskId, TaskStatus};
use vprompt_storage::BlobStore;

use crate::error::StoreResult;

/// Durable task records and their state transitions.
///
/// Transitions are conditional: `mark_in_progress` only moves a WAITING task
/// and `mark_done` only moves an IN_PROGRESS task. When several callers race,
/// exactly one observes `true`.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Persist a new WAITING task. Fails with `Conflict` on a duplicate id.
    async fn create(&self, task: NewTask) -> StoreResult<TaskId>;

    /// Oldest WAITING task by creation time, ties broken by insertion order.
    async fn peek_oldest_waiting(&self) -> StoreResult<Option<Task>>;

    /// WAITING -> IN_PROGRESS, stamping the lease start with `at`.
    async fn mark_in_progress_at(
        &self,
        task_id: &TaskId,
        worker_id: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// IN_PROGRESS -> DONE, stamping `done_at` with `at`.
    async fn mark_done_at(
        &self,
        task_id: &TaskId,
        result_path: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<bool>;

    async fn get(&self, task_id: &TaskId) -> StoreResult<Option<Task>>;

    /// Tasks in ascending creation order, optionally restricted to one state.
    async fn list(&self, status: Option<TaskStatus>) -> StoreResult<Vec<Task>>;

    /// Remove a task record in whatever state it is in.
    async fn delete(&self, task_id: &TaskId) -> StoreResult<bool>;

    /// Revert IN_PROGRESS tasks whose lease started before `cutoff` to WAITING.
    async fn reclaim_stale(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<TaskId>>;

    /// Cheap connectivity check used by readiness probes.
    async fn ping(&self) -> StoreResult<()>;

    async fn mark_in_progress(&self, task_id: &TaskId, worker_id: &str) -> StoreResult<bool> {
        self.mark_in_progress_at(task_id, worker_id, Utc::now()).await
    }

    async fn mark_done(&self, task_id: &TaskId, result_path: &str) -> StoreResult<bool> {
        self.mark_done_at(task_id, result_path, Utc::now()).await
    }

    /// Tasks belonging to one owner, in ascending creation order.
    async fn list_for_owner(
        &self,
        owner: &OwnerToken,
        status: Option<TaskStatus>,
    ) -> StoreResult<Vec<Task>> {
        let tasks = self.list(status).await?;
        Ok(tasks
            .into_iter()
            .filter(|t| &t.owner_token == owner)
            .collect())
    }

    /// Delete DONE tasks finished before `cutoff` together with their blobs.
    ///
    /// The blob directory goes first; a failure there is logged and the
    /// record is still removed.
    async fn delete_older_than(
        &self,
        cutoff: DateTime<Utc>,
        blobs: &BlobStore,
    ) -> StoreResult<Vec<TaskId>> {
        let mut removed = Vec::new();
        for task in self.list(Some(TaskStatus::Done)).await? {
            let expired = task.done_at.map(|done| done < cutoff).unwrap_or(false);
            if !expired {
                continue;
            }

            if let Err(e) = blobs.remove_task_dir(&task.task_id).await {
                warn!(task_id = %task.task_id, error = %e, "Failed to remove blobs of expired task");
            }
            if self.delete(&task.task_id).await? {
                info!(task_id = %task.task_id, "Deleted expired task");
                removed.push(task.task_id);
            }
        }
        Ok(removed)
    }
}

/// Owner token registrations.
#[async_trait]
pub trait OwnerStore: Send + Sync {
    /// Register (or re-register) a notification target.
    ///
    /// With `token = None` a fresh token is minted; with an existing token
    /// the target is updated and the same token returned.
    async fn register(&self, token: Option<OwnerToken>, target: &str) -> StoreResult<OwnerToken>;

    async fn resolve(&self, token: &OwnerToken) -> StoreResult<Option<String>>;

    async fn is_registered(&self, token: &OwnerToken) -> StoreResult<bool> {
        Ok(self.resolve(token).await?.is_some())
    }
}

/// A backend that stores both tasks and owners.
pub trait Store: TaskStore + OwnerStore {}

impl<T: TaskStore + OwnerStore> Store for T {}

/// Store handle shared across the gateway and dispatcher.
pub type SharedStore = Arc<dyn Store>;
