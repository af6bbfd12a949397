//! Artifact download endpoint.
//!
//! Paths are resolved against the workspace root; anything that would leave
//! it (`..`, absolute paths, symlinks pointing outside) is refused with 403
//! before the filesystem is read.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, Request, State};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tracing::debug;
use utoipa::OpenApi;

use crate::error::ServerError;
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(paths(fetch_artifact))]
pub struct FilesApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/files/{*path}", get(fetch_artifact))
}

#[utoipa::path(
    get,
    path = "/files/{path}",
    tag = "files",
    params(
        ("path" = String, Path, description = "Artifact path relative to the workspace root")
    ),
    responses(
        (status = 200, description = "Artifact contents", content_type = "application/octet-stream"),
        (status = 403, description = "Path escapes the workspace root"),
        (status = 404, description = "Artifact not found"),
    )
)]
pub async fn fetch_artifact(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    req: Request,
) -> Result<Response, ServerError> {
    let file = state.orchestrator.workspace().resolve_artifact(&path).await?;
    debug!(locator = %path, file = %file.display(), "serving artifact");

    let response = ServeFile::new(&file)
        .oneshot(req)
        .await
        .unwrap_or_else(|never| match never {});
    Ok(response.map(Body::new))
}
