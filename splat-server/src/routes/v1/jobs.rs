//! Job submission endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::routing::post;
use axum::{Json, Router};
use tracing::info;
use utoipa::OpenApi;

use crate::error::ServerError;
use crate::schemas::v1::job::{SubmitJobRequest, SubmitJobResponse};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(submit_job),
    components(schemas(SubmitJobRequest, SubmitJobResponse))
)]
pub struct JobsApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/jobs", post(submit_job))
}

#[utoipa::path(
    post,
    path = "/v1/jobs",
    tag = "jobs",
    request_body = SubmitJobRequest,
    responses(
        (status = 200, description = "Task queued", body = SubmitJobResponse),
        (status = 400, description = "Invalid video_url, variant or parameters"),
        (status = 413, description = "Request body too large"),
        (status = 415, description = "Body is not application/json"),
        (status = 503, description = "Execution queue full or stopped"),
    )
)]
pub async fn submit_job(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SubmitJobRequest>, JsonRejection>,
) -> Result<Json<SubmitJobResponse>, ServerError> {
    let Json(req) = payload?;
    let request = req.into_pipeline_request()?;
    let variant = request.variant;

    let task_id = state.orchestrator.submit(request).await?;
    info!(%task_id, %variant, "job accepted");
    Ok(Json(SubmitJobResponse { task_id }))
}
