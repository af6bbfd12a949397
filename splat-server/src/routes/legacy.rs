//! Endpoints kept for clients of the original service.
//!
//! `/process_video` always runs the splat variant with default parameters and
//! `/get_task/{id}` reports the absolute point-cloud URL (or the failure
//! diagnostic) as `result`.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use splat_core::{PipelineRequest, RuntimeError};
use tracing::info;
use utoipa::OpenApi;
use uuid::Uuid;

use crate::error::ServerError;
use crate::schemas::legacy::{LegacyTaskResponse, ProcessVideoRequest, ProcessVideoResponse};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(test, process_video, get_task),
    components(schemas(ProcessVideoRequest, ProcessVideoResponse, LegacyTaskResponse))
)]
pub struct LegacyApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/test", get(test))
        .route("/process_video", post(process_video))
        .route("/get_task/{id}", get(get_task))
}

#[utoipa::path(
    get,
    path = "/test",
    tag = "legacy",
    responses((status = 200, description = "Server is up", body = Value))
)]
pub async fn test() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[utoipa::path(
    post,
    path = "/process_video",
    tag = "legacy",
    request_body = ProcessVideoRequest,
    responses(
        (status = 200, description = "Task queued", body = ProcessVideoResponse),
        (status = 400, description = "Missing or invalid video_url"),
        (status = 413, description = "Request body too large"),
        (status = 503, description = "Execution queue unavailable"),
    )
)]
pub async fn process_video(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ProcessVideoRequest>, JsonRejection>,
) -> Result<Json<ProcessVideoResponse>, ServerError> {
    let Json(req) = payload?;
    let video_url = req
        .video_url
        .ok_or_else(|| RuntimeError::Validation("video_url is required".into()))?;

    let task_id = state
        .orchestrator
        .submit(PipelineRequest::new(video_url))
        .await?;
    info!(%task_id, "legacy submission accepted");
    Ok(Json(ProcessVideoResponse { task_id }))
}

#[utoipa::path(
    get,
    path = "/get_task/{id}",
    tag = "legacy",
    params(("id" = String, Path, description = "Task id returned by /process_video")),
    responses(
        (status = 200, description = "Task status", body = LegacyTaskResponse),
        (status = 404, description = "Task not found"),
    )
)]
pub async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<LegacyTaskResponse>, ServerError> {
    let task_id =
        Uuid::parse_str(&id).map_err(|_| ServerError::NotFound("Task not found".into()))?;
    let task = state.orchestrator.task(task_id).await?;
    Ok(Json(LegacyTaskResponse::from_task(&task, &state.config)))
}
