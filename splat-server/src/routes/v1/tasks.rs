//! Task status endpoints.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use utoipa::OpenApi;
use uuid::Uuid;

use crate::error::ServerError;
use crate::schemas::v1::task::TaskResponse;
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(paths(list_tasks, get_task), components(schemas(TaskResponse)))]
pub struct TasksApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tasks", get(list_tasks))
        .route("/tasks/{id}", get(get_task))
}

#[utoipa::path(
    get,
    path = "/v1/tasks",
    tag = "tasks",
    responses(
        (status = 200, description = "Task ids in submission order", body = [Uuid]),
    )
)]
pub async fn list_tasks(State(state): State<Arc<AppState>>) -> Json<Vec<Uuid>> {
    Json(state.orchestrator.task_ids().await)
}

#[utoipa::path(
    get,
    path = "/v1/tasks/{id}",
    tag = "tasks",
    params(
        ("id" = String, Path, description = "ID of the task to retrieve")
    ),
    responses(
        (status = 200, description = "Task retrieved", body = TaskResponse),
        (status = 404, description = "Task not found"),
    )
)]
pub async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TaskResponse>, ServerError> {
    let task_id =
        Uuid::parse_str(&id).map_err(|_| ServerError::NotFound(format!("task {id} not found")))?;
    let task = state.orchestrator.task(task_id).await?;
    Ok(Json(TaskResponse::from_task(&task, &state.config)))
}
