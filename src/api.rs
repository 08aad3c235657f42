use crate::assistant::{self, ChatReply, ChatRequest};
use crate::assistant::course::Course;
use crate::auth::{write_env_var, AdminCheck, ADMIN_TOKEN_HEADER, LLM_KEY_VAR};
use crate::errors::ApiError;
use crate::filter::{local_today, TaskFilter};
use crate::models::{
    BulkOperation, BulkRequest, BulkResponse, CreateTaskRequest, DeleteResponse, HealthResponse, ListTasksQuery,
    SetLlmKeyRequest, SetLlmKeyResponse, UpdateTaskRequest,
};
use crate::state::SharedState;
use crate::validation::ValidationErrors;
use crate::world::{Analytics, BulkAction, ClearScope, Command, Event, Selection, Task};
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::{HeaderMap, StatusCode},
    Json,
};

// ── Tasks ──────────────────────────────────────────────────────

// GET /api/tasks
pub async fn list_tasks(
    State(state): State<SharedState>,
    query: Result<Query<ListTasksQuery>, QueryRejection>,
) -> Result<Json<Vec<Task>>, ApiError> {
    let Query(query) = query?;
    let filter = TaskFilter::from(query);
    let world = state.read_world()?;
    Ok(Json(world.list(&filter, local_today()).into_iter().cloned().collect()))
}

// GET /api/tasks/:id
pub async fn get_task(State(state): State<SharedState>, Path(id): Path<String>) -> Result<Json<Task>, ApiError> {
    let world = state.read_world()?;
    world.get(&id).cloned().map(Json).ok_or(ApiError::NotFound(id))
}

// POST /api/tasks
pub async fn create_task(
    State(state): State<SharedState>,
    payload: Result<Json<CreateTaskRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    let Json(payload) = payload?;
    let new = payload.validate(None)?;
    let task = event_task(state.commit(Command::CreateTask(new))?)?;
    tracing::info!(id = %task.id, "task created");
    Ok((StatusCode::CREATED, Json(task)))
}

// PATCH /api/tasks/:id
pub async fn update_task(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateTaskRequest>, JsonRejection>,
) -> Result<Json<Task>, ApiError> {
    let Json(payload) = payload?;
    let patch = payload.validate()?;
    if patch.is_empty() {
        let world = state.read_world()?;
        return world.get(&id).cloned().map(Json).ok_or(ApiError::NotFound(id));
    }
    let task = event_task(state.commit(Command::UpdateTask { task_id: id, patch })?)?;
    Ok(Json(task))
}

// DELETE /api/tasks/:id
pub async fn delete_task(State(state): State<SharedState>, Path(id): Path<String>) -> Result<Json<DeleteResponse>, ApiError> {
    state.commit(Command::DeleteTask { task_id: id.clone() })?;
    tracing::info!(id = %id, "task deleted");
    Ok(Json(DeleteResponse { success: true, id }))
}

// POST /api/tasks/bulk
pub async fn bulk_tasks(
    State(state): State<SharedState>,
    payload: Result<Json<BulkRequest>, JsonRejection>,
) -> Result<Json<BulkResponse>, ApiError> {
    let Json(req) = payload?;
    let today = local_today();

    let command = match req.operation {
        BulkOperation::ClearCompleted => Command::Clear { scope: ClearScope::Completed, today },
        BulkOperation::ClearOverdue => Command::Clear { scope: ClearScope::Overdue, today },
        BulkOperation::ClearPending => Command::Clear { scope: ClearScope::Pending, today },
        BulkOperation::Delete | BulkOperation::Complete | BulkOperation::Star | BulkOperation::Update => {
            let action = match req.operation {
                BulkOperation::Delete => BulkAction::Delete,
                BulkOperation::Complete => BulkAction::Complete,
                BulkOperation::Star => BulkAction::Star(req.value.unwrap_or(true)),
                _ => {
                    let patch = req
                        .updates
                        .ok_or_else(|| ValidationErrors::field("updates", "Updates are required for update"))?
                        .validate()?;
                    if patch.is_empty() {
                        return Err(ValidationErrors::field("updates", "Updates must change at least one field").into());
                    }
                    BulkAction::Update(patch)
                }
            };
            let selection = match (req.task_ids, req.filter.map(TaskFilter::normalized)) {
                (Some(ids), _) => Selection::Ids(ids),
                (None, Some(filter)) if !filter.is_empty() => Selection::Filter { filter, today },
                _ => {
                    return Err(ValidationErrors::form("Provide taskIds or a non-empty filter").into());
                }
            };
            Command::Bulk { action, selection }
        }
    };

    let task_ids = match state.commit(command)? {
        Event::BulkApplied { affected, .. } => affected,
        Event::Cleared { removed, .. } => removed,
        other => return Err(ApiError::Internal(format!("unexpected event {other:?}"))),
    };
    tracing::info!(operation = ?req.operation, affected = task_ids.len(), "bulk operation applied");
    Ok(Json(BulkResponse { success: true, operation: req.operation, affected: task_ids.len(), task_ids }))
}

// GET /api/tasks/analytics
pub async fn analytics(State(state): State<SharedState>) -> Result<Json<Analytics>, ApiError> {
    let world = state.read_world()?;
    Ok(Json(world.analytics(local_today())))
}

fn event_task(event: Event) -> Result<Task, ApiError> {
    match event {
        Event::TaskCreated { task, .. } | Event::TaskUpdated { task, .. } => Ok(task),
        other => Err(ApiError::Internal(format!("unexpected event {other:?}"))),
    }
}

// ── Courses / assistant ────────────────────────────────────────

// GET /api/courses
pub async fn list_courses(State(state): State<SharedState>) -> Json<Vec<Course>> {
    Json(state.settings.courses.clone())
}

// POST /api/assistant/chat
pub async fn chat(
    State(state): State<SharedState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatReply>, ApiError> {
    let Json(req) = payload?;
    if req.message.trim().is_empty() {
        return Err(ValidationErrors::field("message", "Message is required").into());
    }
    let reply = assistant::handle_message(&state, req.session(), &req.message).await?;
    Ok(Json(reply))
}

// ── Ops ────────────────────────────────────────────────────────

// GET /api/health
pub async fn health(State(state): State<SharedState>) -> Result<Json<HealthResponse>, ApiError> {
    let world = state.read_world()?;
    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        tasks: world.tasks.len(),
        revision: world.revision,
        version: env!("CARGO_PKG_VERSION").to_string(),
    }))
}

// POST /api/admin/set-llm-key
pub async fn set_llm_key(
    State(state): State<SharedState>,
    headers: HeaderMap,
    payload: Result<Json<SetLlmKeyRequest>, JsonRejection>,
) -> Result<Json<SetLlmKeyResponse>, ApiError> {
    let presented = headers.get(ADMIN_TOKEN_HEADER).and_then(|v| v.to_str().ok());
    match state.admin.check(presented) {
        AdminCheck::Granted => {}
        AdminCheck::Denied => {
            tracing::warn!("rejected admin request");
            return Err(ApiError::Unauthorized);
        }
        AdminCheck::Disabled => return Err(ApiError::AdminDisabled),
    }

    let Json(req) = payload?;
    let key = req.key.as_deref().map(str::trim).unwrap_or_default();
    if key.is_empty() {
        return Err(ValidationErrors::field("key", "Key is required").into());
    }

    write_env_var(&state.settings.env_file, LLM_KEY_VAR, key)
        .map_err(|e| ApiError::Internal(format!("cannot write {}: {e}", state.settings.env_file.display())))?;
    state.set_llm_key(key)?;
    tracing::info!(env_file = %state.settings.env_file.display(), "llm api key updated");

    Ok(Json(SetLlmKeyResponse { success: true, assistant_enabled: true }))
}
