//! SQLite implementation of [`TaskStore`] and [`OwnerStore`].
//!
//! Every task lives in one `tasks` row; its state is the `status` column.
//! Transitions are single conditional `UPDATE`s and `rows_affected` decides
//! whether the caller won. Timestamps are stored as fixed-width RFC3339 text
//! (microseconds, `Z`) so text order equals time order.
//!
//! Migrations under `./migrations` are embedded at compile time and applied
//! by [`SqliteTaskStore::connect`].

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};
use vprompt_models::{NewTask, ObjectMap, OwnerToken, Task, TaskId, TaskStatus};

use crate::error::{StoreError, StoreResult};
use crate::traits::{OwnerStore, TaskStore};

const TASK_COLUMNS: &str = "task_id, created_at, status, objects, source_video_path, config_path, \
     owner_token, assigned_worker, assigned_at, result_path, done_at";

/// SQLite-backed task store.
#[derive(Clone, Debug)]
pub struct SqliteTaskStore {
    pool: SqlitePool,
}

impl SqliteTaskStore {
    /// Open (or create) the database at `url` and run pending migrations.
    ///
    /// `url` is a sqlx SQLite URL such as `sqlite://vprompt.db` or
    /// `sqlite::memory:`. In-memory databases are held on a single pooled
    /// connection that is never recycled, otherwise each connection would
    /// see its own empty database.
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = if url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(8)
                .connect_with(options)
                .await?
        };

        sqlx::migrate!("./migrations").run(&pool).await?;
        info!(url = %url, "SQLite task store ready");
        Ok(Self { pool })
    }

    /// Fresh private in-memory database.
    pub async fn in_memory() -> StoreResult<Self> {
        Self::connect("sqlite::memory:").await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(id: &str, raw: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::corrupt(id, format!("bad timestamp {:?}: {}", raw, e)))
}

fn parse_opt_ts(id: &str, raw: Option<String>) -> StoreResult<Option<DateTime<Utc>>> {
    raw.map(|r| parse_ts(id, &r)).transpose()
}

fn task_from_row(row: &SqliteRow) -> StoreResult<Task> {
    let id: String = row.try_get("task_id")?;
    let created_at: String = row.try_get("created_at")?;
    let status: String = row.try_get("status")?;
    let objects: String = row.try_get("objects")?;

    let status = TaskStatus::from_str(&status).map_err(|e| StoreError::corrupt(&id, e.to_string()))?;
    let objects: ObjectMap = serde_json::from_str(&objects)
        .map_err(|e| StoreError::corrupt(&id, format!("bad objects: {}", e)))?;

    Ok(Task {
        created_at: parse_ts(&id, &created_at)?,
        status,
        objects,
        source_video_path: row.try_get("source_video_path")?,
        config_path: row.try_get("config_path")?,
        owner_token: OwnerToken::from(row.try_get::<String, _>("owner_token")?),
        assigned_worker: row.try_get("assigned_worker")?,
        assigned_at: parse_opt_ts(&id, row.try_get("assigned_at")?)?,
        result_path: row.try_get("result_path")?,
        done_at: parse_opt_ts(&id, row.try_get("done_at")?)?,
        task_id: TaskId::from(id),
    })
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn create(&self, task: NewTask) -> StoreResult<TaskId> {
        let objects = serde_json::to_string(&task.objects)?;
        let result = sqlx::query(
            "INSERT INTO tasks (task_id, created_at, status, objects, source_video_path, config_path, owner_token) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(task.task_id.as_str())
        .bind(ts(task.created_at))
        .bind(TaskStatus::Waiting.as_str())
        .bind(&objects)
        .bind(&task.source_video_path)
        .bind(&task.config_path)
        .bind(task.owner_token.as_str())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                debug!(task_id = %task.task_id, "Inserted task");
                Ok(task.task_id)
            }
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(StoreError::conflict(task.task_id.as_str()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn peek_oldest_waiting(&self) -> StoreResult<Option<Task>> {
        let row = sqlx::query(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE status = ?1 ORDER BY created_at ASC, rowid ASC LIMIT 1"
        ))
        .bind(TaskStatus::Waiting.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(task_from_row).transpose()
    }

    async fn mark_in_progress_at(
        &self,
        task_id: &TaskId,
        worker_id: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE tasks SET status = ?1, assigned_worker = ?2, assigned_at = ?3 \
             WHERE task_id = ?4 AND status = ?5",
        )
        .bind(TaskStatus::InProgress.as_str())
        .bind(worker_id)
        .bind(ts(at))
        .bind(task_id.as_str())
        .bind(TaskStatus::Waiting.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_done_at(
        &self,
        task_id: &TaskId,
        result_path: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE tasks SET status = ?1, result_path = ?2, done_at = ?3 \
             WHERE task_id = ?4 AND status = ?5",
        )
        .bind(TaskStatus::Done.as_str())
        .bind(result_path)
        .bind(ts(at))
        .bind(task_id.as_str())
        .bind(TaskStatus::InProgress.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn get(&self, task_id: &TaskId) -> StoreResult<Option<Task>> {
        let row = sqlx::query(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE task_id = ?1"))
            .bind(task_id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(task_from_row).transpose()
    }

    async fn list(&self, status: Option<TaskStatus>) -> StoreResult<Vec<Task>> {
        let rows = match status {
            Some(status) => {
                sqlx::query(&format!(
                    "SELECT {TASK_COLUMNS} FROM tasks WHERE status = ?1 ORDER BY created_at ASC, rowid ASC"
                ))
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {TASK_COLUMNS} FROM tasks ORDER BY created_at ASC, rowid ASC"
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter().map(task_from_row).collect()
    }

    async fn list_for_owner(
        &self,
        owner: &OwnerToken,
        status: Option<TaskStatus>,
    ) -> StoreResult<Vec<Task>> {
        let rows = match status {
            Some(status) => {
                sqlx::query(&format!(
                    "SELECT {TASK_COLUMNS} FROM tasks WHERE owner_token = ?1 AND status = ?2 \
                     ORDER BY created_at ASC, rowid ASC"
                ))
                .bind(owner.as_str())
                .bind(status.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {TASK_COLUMNS} FROM tasks WHERE owner_token = ?1 ORDER BY created_at ASC, rowid ASC"
                ))
                .bind(owner.as_str())
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter().map(task_from_row).collect()
    }

    async fn delete(&self, task_id: &TaskId) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM tasks WHERE task_id = ?1")
            .bind(task_id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn reclaim_stale(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<TaskId>> {
        let rows = sqlx::query(
            "UPDATE tasks SET status = ?1, assigned_worker = NULL, assigned_at = NULL \
             WHERE status = ?2 AND assigned_at < ?3 \
             RETURNING task_id",
        )
        .bind(TaskStatus::Waiting.as_str())
        .bind(TaskStatus::InProgress.as_str())
        .bind(ts(cutoff))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> StoreResult<TaskId> { Ok(TaskId::from(row.try_get::<String, _>("task_id")?)) })
            .collect()
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl OwnerStore for SqliteTaskStore {
    async fn register(&self, token: Option<OwnerToken>, target: &str) -> StoreResult<OwnerToken> {
        let token = token.unwrap_or_else(OwnerToken::generate);
        sqlx::query(
            "INSERT INTO owners (token, notification_target, created_at) VALUES (?1, ?2, ?3) \
             ON CONFLICT(token) DO UPDATE SET notification_target = excluded.notification_target",
        )
        .bind(token.as_str())
        .bind(target)
        .bind(ts(Utc::now()))
        .execute(&self.pool)
        .await?;
        Ok(token)
    }

    async fn resolve(&self, token: &OwnerToken) -> StoreResult<Option<String>> {
        let target: Option<(String,)> =
            sqlx::query_as("SELECT notification_target FROM owners WHERE token = ?1")
                .bind(token.as_str())
                .fetch_optional(&self.pool)
                .await?;
        Ok(target.map(|(t,)| t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamps_sort_as_text() {
        let early = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        let late = early + chrono::Duration::microseconds(1);
        assert!(ts(early) < ts(late));
        assert_eq!(ts(early).len(), ts(late).len());
        assert_eq!(parse_ts("t", &ts(late)).unwrap(), late);
    }

    #[tokio::test]
    async fn test_corrupt_status_is_reported() {
        let store = SqliteTaskStore::in_memory().await.unwrap();
        let id = store
            .create(NewTask::new(ObjectMap::new(), "/s", "/c", OwnerToken::from("o")))
            .await
            .unwrap();

        // Disable the CHECK constraint so an unknown status can be written.
        sqlx::query("PRAGMA ignore_check_constraints = ON")
            .execute(store.pool())
            .await
            .unwrap();
        sqlx::query("UPDATE tasks SET status = 'lost' WHERE task_id = ?1")
            .bind(id.as_str())
            .execute(store.pool())
            .await
            .unwrap();

        let err = store.get(&id).await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }
}
