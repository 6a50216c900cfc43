//! Payloads exchanged with workers and notification targets.

use serde::{Deserialize, Serialize};

use crate::{ObjectMap, TaskId};

/// Status string a worker reports when it can accept a job.
pub const WORKER_READY: &str = "ready";

/// Default message sent to owners when their result is in.
pub const COMPLETION_MESSAGE: &str = "Your video processed successfully, let's watch!!!";

/// Job configuration forwarded to a worker as the `config` multipart part.
///
/// Workers decode `objects` and `animate_config` a second time, so both are
/// carried as JSON-encoded strings inside the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSubmission {
    pub task_id: TaskId,
    #[serde(with = "json_string")]
    pub objects: ObjectMap,
    /// Opaque per-job settings supplied by the submitter
    #[serde(with = "json_string")]
    pub animate_config: serde_json::Value,
    /// Where the worker posts the finished video
    pub response_url: String,
}

impl JobSubmission {
    pub fn new(
        task_id: TaskId,
        objects: ObjectMap,
        animate_config: serde_json::Value,
        response_url: impl Into<String>,
    ) -> Self {
        Self {
            task_id,
            objects,
            animate_config,
            response_url: response_url.into(),
        }
    }
}

/// Serde adapter for a value nested as a JSON string.
mod json_string {
    use serde::de::{DeserializeOwned, Error as _};
    use serde::ser::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Serialize,
        S: Serializer,
    {
        let encoded = serde_json::to_string(value).map_err(S::Error::custom)?;
        serializer.serialize_str(&encoded)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        T: DeserializeOwned,
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        serde_json::from_str(&encoded).map_err(D::Error::custom)
    }
}

/// Body of a worker health response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerHealth {
    pub status: String,
}

impl WorkerHealth {
    pub fn is_ready(&self) -> bool {
        self.status == WORKER_READY
    }
}

/// Notification body POSTed to an owner's target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionNotice {
    pub message: String,
    pub task_id: TaskId,
}

impl CompletionNotice {
    pub fn for_task(task_id: TaskId) -> Self {
        Self {
            message: COMPLETION_MESSAGE.to_string(),
            task_id,
        }
    }
}
