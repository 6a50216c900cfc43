//! Worker result intake and owner result retrieval.

use axum::body::Body;
use axum::extract::{Multipart, Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::Response;
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;
use tracing::{info, warn};

use vprompt_models::{CompletionNotice, Task, TaskId, TaskStatus};
use vprompt_storage::content_type_for;
use vprompt_store::{OwnerStore, TaskStore};

use crate::auth::OwnerAuth;
use crate::error::{ApiError, ApiResult};
use crate::handlers::form::FormData;
use crate::metrics;
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct ResultAck {
    pub task_id: TaskId,
    pub status: TaskStatus,
}

impl ResultAck {
    fn done(task_id: TaskId) -> Self {
        Self {
            task_id,
            status: TaskStatus::Done,
        }
    }
}

/// Accept a finished video from a worker.
///
/// Multipart fields: `task_id` and `video` (file). A repeated callback for a
/// task that is already DONE is acknowledged without touching the stored
/// result.
pub async fn receive_result(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<ResultAck>> {
    let mut form = FormData::read(multipart).await?;

    let task_id = form
        .text("task_id")
        .map(TaskId::from)
        .ok_or_else(|| ApiError::bad_request("Missing task_id"))?;
    let video = form
        .take_file("video")
        .filter(|f| !f.data.is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing video file"))?;

    let Some(task) = state.store.get(&task_id).await? else {
        metrics::record_result_received("unknown");
        warn!(task_id = %task_id, "Result for unknown task");
        return Err(ApiError::not_found(format!("Task {} not found", task_id)));
    };

    match task.status {
        TaskStatus::Done => {
            metrics::record_result_received("duplicate");
            info!(task_id = %task_id, "Duplicate result ignored");
            return Ok(Json(ResultAck::done(task_id)));
        }
        TaskStatus::Waiting => {
            metrics::record_result_received("rejected");
            warn!(task_id = %task_id, "Result for task that is not assigned");
            return Err(ApiError::conflict(format!(
                "Task {} is not in progress",
                task_id
            )));
        }
        TaskStatus::InProgress => {}
    }

    let result_path = state
        .blobs
        .write_result(&task_id, video.filename.as_deref(), &video.data)
        .await?;

    let recorded = match state
        .store
        .mark_done(&task_id, &result_path.to_string_lossy())
        .await
    {
        Ok(recorded) => recorded,
        Err(e) => {
            discard_attempt(&state, &task_id, &result_path).await;
            return Err(e.into());
        }
    };

    if !recorded {
        // Lost a race with another callback or the reclaim sweep
        discard_attempt(&state, &task_id, &result_path).await;
        let current = state.store.get(&task_id).await?.map(|t| t.status);
        if current == Some(TaskStatus::Done) {
            metrics::record_result_received("duplicate");
            return Ok(Json(ResultAck::done(task_id)));
        }
        metrics::record_result_received("rejected");
        return Err(ApiError::conflict(format!(
            "Task {} is no longer in progress",
            task_id
        )));
    }

    metrics::record_result_received("accepted");
    info!(
        task_id = %task_id,
        worker = task.assigned_worker.as_deref().unwrap_or("unknown"),
        bytes = video.data.len(),
        "Task done"
    );

    notify_owner(&state, &task).await;

    Ok(Json(ResultAck::done(task_id)))
}

/// Remove the file written by an intake attempt that was not recorded.
async fn discard_attempt(state: &AppState, task_id: &TaskId, path: &std::path::Path) {
    if let Err(e) = state.blobs.remove_blob(path).await {
        warn!(task_id = %task_id, "Failed to remove unrecorded result upload: {}", e);
    }
}

/// Tell the task's owner the result is in. Never fails the request.
async fn notify_owner(state: &AppState, task: &Task) {
    let target = match state.store.resolve(&task.owner_token).await {
        Ok(Some(target)) => target,
        Ok(None) => {
            warn!(task_id = %task.task_id, "Owner has no registered notification target");
            return;
        }
        Err(e) => {
            warn!(task_id = %task.task_id, "Failed to resolve notification target: {}", e);
            return;
        }
    };

    let notice = CompletionNotice::for_task(task.task_id.clone());
    state.notifier.notify(&target, &notice).await;
}

/// Stream a finished result to its owner without buffering it in memory.
pub async fn get_result(
    State(state): State<AppState>,
    owner: OwnerAuth,
    Path(task_id): Path<String>,
) -> ApiResult<Response> {
    let task_id = TaskId::from(task_id);
    let task = state
        .store
        .get(&task_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Task {} not found", task_id)))?;

    if !owner.owns(&task.owner_token) {
        return Err(ApiError::forbidden("Task belongs to another owner"));
    }

    let result_path = match (&task.status, &task.result_path) {
        (TaskStatus::Done, Some(path)) => path,
        _ => return Err(ApiError::not_found("Result not ready")),
    };

    let file = match state.blobs.open(result_path).await {
        Ok(file) => file,
        Err(e) if e.is_not_found() => {
            warn!(task_id = %task_id, "Result file missing for finished task");
            return Err(ApiError::not_found("Result file missing"));
        }
        Err(e) => return Err(e.into()),
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, content_type_for(result_path))
        .body(Body::from_stream(ReaderStream::new(file)))
        .map_err(|e| ApiError::internal(format!("Failed to build response: {}", e)))
}
