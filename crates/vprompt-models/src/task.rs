//! Task record and lifecycle state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::{ObjectMap, OwnerToken};

/// Unique identifier for a task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    /// Generate a new random task ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the ID is safe to use as a single path component.
    ///
    /// Task IDs name blob directories, so anything that could escape the
    /// blob root is rejected before it reaches the filesystem.
    pub fn is_path_safe(&self) -> bool {
        !self.0.is_empty()
            && self.0.len() <= 128
            && self
                .0
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Task lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Submitted and waiting for a worker
    #[default]
    Waiting,
    /// Assigned to a worker
    InProgress,
    /// Result received
    Done,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 3] = [TaskStatus::Waiting, TaskStatus::InProgress, TaskStatus::Done];

    /// Get string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Waiting => "waiting",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Done => "done",
        }
    }

    /// Check if this is a terminal state (no more transitions expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Done)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Returned when a status string does not name a known state.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown task status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for TaskStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "waiting" | "wait" => Ok(TaskStatus::Waiting),
            "in_progress" | "processing" => Ok(TaskStatus::InProgress),
            "done" | "ready" => Ok(TaskStatus::Done),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// A unit of submitted work tracked through WAITING / IN_PROGRESS / DONE.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: TaskId,
    pub created_at: DateTime<Utc>,
    pub status: TaskStatus,
    pub objects: ObjectMap,
    pub source_video_path: String,
    pub config_path: String,
    pub owner_token: OwnerToken,
    /// Worker the task was handed to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_worker: Option<String>,
    /// When the current assignment started (lease start)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub done_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Check the field/state invariants of the record.
    ///
    /// `assigned_worker` is present iff the task left WAITING, and
    /// `result_path`/`done_at` are present iff the task is DONE.
    pub fn is_consistent(&self) -> bool {
        let assigned = self.assigned_worker.is_some();
        let finished = self.result_path.is_some() && self.done_at.is_some();
        let unfinished = self.result_path.is_none() && self.done_at.is_none();
        match self.status {
            TaskStatus::Waiting => !assigned && self.assigned_at.is_none() && unfinished,
            TaskStatus::InProgress => assigned && unfinished,
            TaskStatus::Done => assigned && finished,
        }
    }

    /// Transition WAITING -> IN_PROGRESS in place.
    ///
    /// Returns false and leaves the record untouched for any other state.
    pub fn assign(&mut self, worker_id: &str, at: DateTime<Utc>) -> bool {
        if self.status != TaskStatus::Waiting {
            return false;
        }
        self.status = TaskStatus::InProgress;
        self.assigned_worker = Some(worker_id.to_string());
        self.assigned_at = Some(at);
        true
    }

    /// Transition IN_PROGRESS -> DONE in place.
    pub fn finish(&mut self, result_path: &str, at: DateTime<Utc>) -> bool {
        if self.status != TaskStatus::InProgress {
            return false;
        }
        self.status = TaskStatus::Done;
        self.result_path = Some(result_path.to_string());
        self.done_at = Some(at);
        true
    }

    /// Revert IN_PROGRESS -> WAITING, dropping the assignment.
    pub fn release(&mut self) -> bool {
        if self.status != TaskStatus::InProgress {
            return false;
        }
        self.status = TaskStatus::Waiting;
        self.assigned_worker = None;
        self.assigned_at = None;
        true
    }
}

/// Everything needed to persist a freshly submitted task.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub task_id: TaskId,
    pub created_at: DateTime<Utc>,
    pub objects: ObjectMap,
    pub source_video_path: String,
    pub config_path: String,
    pub owner_token: OwnerToken,
}

impl NewTask {
    /// Mint a new identifier and creation time for a submission.
    pub fn new(
        objects: ObjectMap,
        source_video_path: impl Into<String>,
        config_path: impl Into<String>,
        owner_token: OwnerToken,
    ) -> Self {
        Self {
            task_id: TaskId::new(),
            created_at: Utc::now(),
            objects,
            source_video_path: source_video_path.into(),
            config_path: config_path.into(),
            owner_token,
        }
    }

    /// Override the minted identifier (the gateway picks it before writing blobs).
    pub fn with_id(mut self, task_id: TaskId) -> Self {
        self.task_id = task_id;
        self
    }

    /// Override the creation time.
    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Build the WAITING record this submission becomes.
    pub fn into_task(self) -> Task {
        Task {
            task_id: self.task_id,
            created_at: self.created_at,
            status: TaskStatus::Waiting,
            objects: self.objects,
            source_video_path: self.source_video_path,
            config_path: self.config_path,
            owner_token: self.owner_token,
            assigned_worker: None,
            assigned_at: None,
            result_path: None,
            done_at: None,
        }
    }
}
