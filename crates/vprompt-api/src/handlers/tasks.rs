//! Task submission and owner task management.

use axum::extract::{Multipart, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use vprompt_models::{parse_objects, NewTask, ObjectMap, OwnerToken, Task, TaskId, TaskStatus};
use vprompt_store::TaskStore;

use crate::auth::{authorize, bearer_token, OwnerAuth};
use crate::error::{ApiError, ApiResult};
use crate::handlers::form::{FormData, UploadedFile};
use crate::metrics;
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateTaskResponse {
    pub task_id: TaskId,
}

/// Task as shown to its owner. Blob paths and the token stay server-side.
#[derive(Debug, Serialize, Deserialize)]
pub struct TaskView {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub objects: ObjectMap,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub done_at: Option<DateTime<Utc>>,
    pub has_result: bool,
}

impl From<Task> for TaskView {
    fn from(task: Task) -> Self {
        Self {
            has_result: task.result_path.is_some(),
            task_id: task.task_id,
            status: task.status,
            created_at: task.created_at,
            objects: task.objects,
            assigned_at: task.assigned_at,
            done_at: task.done_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListTasksQuery {
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ListTasksResponse {
    pub tasks: Vec<TaskView>,
}

/// Parse the job configuration document; absent means `{}`.
fn parse_config(raw: Option<&str>) -> ApiResult<serde_json::Value> {
    let Some(raw) = raw else {
        return Ok(serde_json::Value::Object(Default::default()));
    };
    let value: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| ApiError::bad_request(format!("Invalid config JSON: {}", e)))?;
    if !value.is_object() {
        return Err(ApiError::bad_request("Config must be a JSON object"));
    }
    Ok(value)
}

/// Submit a video with its object prompts.
///
/// Multipart fields: `video` (file), `objects` (JSON), `config` (JSON,
/// optional), and `token` (or legacy `user_id`) unless a bearer token is sent.
pub async fn create_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> ApiResult<Json<CreateTaskResponse>> {
    // A bearer token is checked before the upload is read
    let header_owner = match bearer_token(&headers) {
        Some(token) => Some(authorize(&state, Some(token)).await?),
        None => None,
    };

    let mut form = FormData::read(multipart).await?;

    let owner = match header_owner {
        Some(owner) => owner,
        None => {
            let token = form
                .text("token")
                .or_else(|| form.text("user_id"))
                .map(OwnerToken::from);
            authorize(&state, token).await?
        }
    };

    let video = form
        .take_file("video")
        .filter(|f| !f.data.is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing video file"))?;
    let objects = parse_objects(
        form.text("objects")
            .ok_or_else(|| ApiError::bad_request("Missing objects"))?,
    )?;
    let config = parse_config(form.text("config"))?;

    let task_id = TaskId::new();

    let (source_path, config_path) = match write_inputs(&state, &task_id, &video, &config).await {
        Ok(paths) => paths,
        Err(e) => {
            discard_inputs(&state, &task_id).await;
            return Err(e);
        }
    };

    let new_task = NewTask::new(objects, source_path, config_path, owner.0).with_id(task_id.clone());
    let task_id = match state.store.create(new_task).await {
        Ok(id) => id,
        Err(e) => {
            discard_inputs(&state, &task_id).await;
            return Err(e.into());
        }
    };

    metrics::record_task_created();
    info!(task_id = %task_id, bytes = video.data.len(), "Task created");

    Ok(Json(CreateTaskResponse { task_id }))
}

async fn write_inputs(
    state: &AppState,
    task_id: &TaskId,
    video: &UploadedFile,
    config: &serde_json::Value,
) -> ApiResult<(String, String)> {
    let source = state
        .blobs
        .write_source(task_id, video.filename.as_deref(), &video.data)
        .await?;
    let config = state.blobs.write_config(task_id, config).await?;
    Ok((
        source.to_string_lossy().into_owned(),
        config.to_string_lossy().into_owned(),
    ))
}

async fn discard_inputs(state: &AppState, task_id: &TaskId) {
    if let Err(e) = state.blobs.remove_task_dir(task_id).await {
        warn!(task_id = %task_id, "Failed to discard blobs of aborted task: {}", e);
    }
}

/// List the caller's tasks, optionally filtered by `status`.
pub async fn list_tasks(
    State(state): State<AppState>,
    owner: OwnerAuth,
    Query(query): Query<ListTasksQuery>,
) -> ApiResult<Json<ListTasksResponse>> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<TaskStatus>)
        .transpose()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    let tasks = state.store.list_for_owner(owner.token(), status).await?;
    Ok(Json(ListTasksResponse {
        tasks: tasks.into_iter().map(TaskView::from).collect(),
    }))
}

/// Load a task and check the caller owns it.
async fn owned_task(state: &AppState, owner: &OwnerAuth, task_id: &TaskId) -> ApiResult<Task> {
    let task = state
        .store
        .get(task_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Task {} not found", task_id)))?;
    if !owner.owns(&task.owner_token) {
        return Err(ApiError::forbidden("Task belongs to another owner"));
    }
    Ok(task)
}

pub async fn get_task(
    State(state): State<AppState>,
    owner: OwnerAuth,
    Path(task_id): Path<String>,
) -> ApiResult<Json<TaskView>> {
    let task = owned_task(&state, &owner, &TaskId::from(task_id)).await?;
    Ok(Json(TaskView::from(task)))
}

/// Delete a task record and its blobs.
///
/// Tasks held by a worker cannot be deleted; their result would have
/// nowhere to land.
pub async fn delete_task(
    State(state): State<AppState>,
    owner: OwnerAuth,
    Path(task_id): Path<String>,
) -> ApiResult<StatusCode> {
    let task_id = TaskId::from(task_id);
    let task = owned_task(&state, &owner, &task_id).await?;
    if task.status == TaskStatus::InProgress {
        return Err(ApiError::conflict("Task is being processed"));
    }

    discard_inputs(&state, &task_id).await;
    if !state.store.delete(&task_id).await? {
        return Err(ApiError::not_found(format!("Task {} not found", task_id)));
    }

    info!(task_id = %task_id, "Task deleted by owner");
    Ok(StatusCode::NO_CONTENT)
}
