use std::sync::Arc;

use axum::routing::get;
use axum::{Json, Router};
use utoipa::OpenApi;

use crate::routes::{files, health, legacy, v1};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(info(
    title = "splat-server",
    description = "Video to point cloud reconstruction task API",
    version = "0.1.0",
))]
pub struct ApiDoc;

pub fn get_docs() -> utoipa::openapi::OpenApi {
    let mut root = ApiDoc::openapi();
    root.merge(health::HealthApi::openapi());
    root.merge(files::FilesApi::openapi());
    root.merge(legacy::LegacyApi::openapi());
    root.merge(v1::api_docs());
    root
}

/// Serve the OpenAPI document as JSON.
pub fn router() -> Router<Arc<AppState>> {
    let spec = get_docs();
    Router::new().route(
        "/api-docs/openapi.json",
        get(move || {
            let spec = spec.clone();
            async move { Json(spec) }
        }),
    )
}
