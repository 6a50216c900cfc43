//! Partitioned implementation of [`TaskStore`] and [`OwnerStore`].
//!
//! Records live in one of three partitions named after their state. A
//! transition removes the record from its current partition and inserts it
//! into the next one while holding the single store lock, so no reader can
//! ever see a task in two partitions or in none.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::debug;
use vprompt_models::{NewTask, OwnerRegistration, OwnerToken, Task, TaskId, TaskStatus};

use crate::error::{StoreError, StoreResult};
use crate::traits::{OwnerStore, TaskStore};

#[derive(Debug, Clone)]
struct Entry {
    /// Insertion sequence, breaks `created_at` ties
    seq: u64,
    task: Task,
}

type Partition = HashMap<TaskId, Entry>;

#[derive(Debug, Default)]
struct Partitions {
    waiting: Partition,
    in_progress: Partition,
    done: Partition,
    owners: HashMap<OwnerToken, OwnerRegistration>,
    next_seq: u64,
}

impl Partitions {
    fn partition(&self, status: TaskStatus) -> &Partition {
        match status {
            TaskStatus::Waiting => &self.waiting,
            TaskStatus::InProgress => &self.in_progress,
            TaskStatus::Done => &self.done,
        }
    }

    fn partition_mut(&mut self, status: TaskStatus) -> &mut Partition {
        match status {
            TaskStatus::Waiting => &mut self.waiting,
            TaskStatus::InProgress => &mut self.in_progress,
            TaskStatus::Done => &mut self.done,
        }
    }

    fn find(&self, task_id: &TaskId) -> Option<&Entry> {
        TaskStatus::ALL
            .iter()
            .find_map(|status| self.partition(*status).get(task_id))
    }

    /// Find-and-remove from `from`, apply `update`, insert into the partition
    /// matching the updated status.
    fn relocate(
        &mut self,
        task_id: &TaskId,
        from: TaskStatus,
        update: impl FnOnce(&mut Task) -> bool,
    ) -> bool {
        let Some(mut entry) = self.partition_mut(from).remove(task_id) else {
            return false;
        };
        if !update(&mut entry.task) {
            self.partition_mut(from).insert(task_id.clone(), entry);
            return false;
        }
        let to = entry.task.status;
        self.partition_mut(to).insert(task_id.clone(), entry);
        true
    }

    fn sorted(entries: impl Iterator<Item = Entry>) -> Vec<Task> {
        let mut entries: Vec<Entry> = entries.collect();
        entries.sort_by(|a, b| {
            a.task
                .created_at
                .cmp(&b.task.created_at)
                .then(a.seq.cmp(&b.seq))
        });
        entries.into_iter().map(|e| e.task).collect()
    }
}

/// In-process store with one partition per task state.
#[derive(Debug, Default)]
pub struct PartitionedTaskStore {
    inner: Mutex<Partitions>,
}

impl PartitionedTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tasks currently held in one partition.
    pub async fn partition_len(&self, status: TaskStatus) -> usize {
        self.inner.lock().await.partition(status).len()
    }
}

#[async_trait]
impl TaskStore for PartitionedTaskStore {
    async fn create(&self, task: NewTask) -> StoreResult<TaskId> {
        let mut inner = self.inner.lock().await;
        if inner.find(&task.task_id).is_some() {
            return Err(StoreError::conflict(task.task_id.as_str()));
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;

        let task = task.into_task();
        let task_id = task.task_id.clone();
        inner.waiting.insert(task_id.clone(), Entry { seq, task });
        debug!(task_id = %task_id, "Inserted task into waiting partition");
        Ok(task_id)
    }

    async fn peek_oldest_waiting(&self) -> StoreResult<Option<Task>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .waiting
            .values()
            .min_by(|a, b| {
                a.task
                    .created_at
                    .cmp(&b.task.created_at)
                    .then(a.seq.cmp(&b.seq))
            })
            .map(|e| e.task.clone()))
    }

    async fn mark_in_progress_at(
        &self,
        task_id: &TaskId,
        worker_id: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut inner = self.inner.lock().await;
        Ok(inner.relocate(task_id, TaskStatus::Waiting, |task| task.assign(worker_id, at)))
    }

    async fn mark_done_at(
        &self,
        task_id: &TaskId,
        result_path: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut inner = self.inner.lock().await;
        Ok(inner.relocate(task_id, TaskStatus::InProgress, |task| {
            task.finish(result_path, at)
        }))
    }

    async fn get(&self, task_id: &TaskId) -> StoreResult<Option<Task>> {
        let inner = self.inner.lock().await;
        Ok(inner.find(task_id).map(|e| e.task.clone()))
    }

    async fn list(&self, status: Option<TaskStatus>) -> StoreResult<Vec<Task>> {
        let guard = self.inner.lock().await;
        let inner: &Partitions = &guard;
        let tasks = match status {
            Some(status) => Partitions::sorted(inner.partition(status).values().cloned()),
            None => Partitions::sorted(
                TaskStatus::ALL
                    .iter()
                    .flat_map(|s| inner.partition(*s).values().cloned()),
            ),
        };
        Ok(tasks)
    }

    async fn delete(&self, task_id: &TaskId) -> StoreResult<bool> {
        let mut inner = self.inner.lock().await;
        let removed = TaskStatus::ALL
            .iter()
            .any(|status| inner.partition_mut(*status).remove(task_id).is_some());
        Ok(removed)
    }

    async fn reclaim_stale(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<TaskId>> {
        let mut inner = self.inner.lock().await;
        let stale: Vec<TaskId> = inner
            .in_progress
            .values()
            .filter(|e| e.task.assigned_at.map(|at| at < cutoff).unwrap_or(false))
            .map(|e| e.task.task_id.clone())
            .collect();

        let mut reclaimed = Vec::with_capacity(stale.len());
        for task_id in stale {
            if inner.relocate(&task_id, TaskStatus::InProgress, Task::release) {
                reclaimed.push(task_id);
            }
        }
        Ok(reclaimed)
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[async_trait]
impl OwnerStore for PartitionedTaskStore {
    async fn register(&self, token: Option<OwnerToken>, target: &str) -> StoreResult<OwnerToken> {
        let token = token.unwrap_or_else(OwnerToken::generate);
        let mut inner = self.inner.lock().await;
        inner
            .owners
            .entry(token.clone())
            .and_modify(|reg| reg.notification_target = target.to_string())
            .or_insert_with(|| OwnerRegistration::new(token.clone(), target));
        Ok(token)
    }

    async fn resolve(&self, token: &OwnerToken) -> StoreResult<Option<String>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .owners
            .get(token)
            .map(|reg| reg.notification_target.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vprompt_models::ObjectMap;

    fn submission() -> NewTask {
        NewTask::new(ObjectMap::new(), "/s", "/c", OwnerToken::from("o"))
    }

    #[tokio::test]
    async fn test_record_occupies_one_partition() {
        let store = PartitionedTaskStore::new();
        let id = store.create(submission()).await.unwrap();
        assert_eq!(store.partition_len(TaskStatus::Waiting).await, 1);

        assert!(store.mark_in_progress(&id, "w").await.unwrap());
        assert_eq!(store.partition_len(TaskStatus::Waiting).await, 0);
        assert_eq!(store.partition_len(TaskStatus::InProgress).await, 1);

        assert!(store.mark_done(&id, "/r").await.unwrap());
        assert_eq!(store.partition_len(TaskStatus::InProgress).await, 0);
        assert_eq!(store.partition_len(TaskStatus::Done).await, 1);
    }

    #[tokio::test]
    async fn test_failed_transition_leaves_record_in_place() {
        let store = PartitionedTaskStore::new();
        let id = store.create(submission()).await.unwrap();

        assert!(!store.mark_done(&id, "/r").await.unwrap());
        assert_eq!(store.partition_len(TaskStatus::Waiting).await, 1);
        assert_eq!(store.get(&id).await.unwrap().unwrap().status, TaskStatus::Waiting);
    }
}
