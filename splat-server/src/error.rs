//! Unified server error type.
//!
//! Every handler returns `Result<T, ServerError>`, which implements
//! [`axum::response::IntoResponse`] so errors become a JSON
//! `{"error": "..."}` body with a matching status code.
//!
//! Internal failures are logged with full detail but only a generic message
//! reaches the caller, so filesystem paths and tool output never leak.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use splat_core::RuntimeError;
use thiserror::Error;
use tracing::{error, warn};

/// All errors that can occur in the splat-server request lifecycle.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Propagated from the orchestration runtime.
    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    /// The caller referenced a resource that does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The JSON body could not be read or decoded.
    #[error("invalid request body: {0}")]
    InvalidBody(#[from] JsonRejection),
}

impl ServerError {
    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            ServerError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
            // Well-formed JSON of the wrong shape is a validation error;
            // oversized or mistyped bodies keep their own status.
            ServerError::InvalidBody(rejection) => {
                let status = match rejection {
                    JsonRejection::JsonDataError(_) => StatusCode::BAD_REQUEST,
                    other => other.status(),
                };
                (status, rejection.body_text())
            }
            ServerError::Runtime(e) => match e {
                RuntimeError::Validation(m) => (StatusCode::BAD_REQUEST, m.clone()),
                RuntimeError::TaskNotFound { .. } => {
                    (StatusCode::NOT_FOUND, "Task not found".to_owned())
                }
                RuntimeError::ArtifactNotFound { .. } => {
                    (StatusCode::NOT_FOUND, "artifact not found".to_owned())
                }
                RuntimeError::PathEscapesWorkspace { path } => {
                    warn!(%path, "rejected artifact path outside the workspace");
                    (StatusCode::FORBIDDEN, "path escapes workspace root".to_owned())
                }
                RuntimeError::QueueFull { .. } | RuntimeError::QueueStopped => {
                    warn!(error = %e, "submission refused");
                    (StatusCode::SERVICE_UNAVAILABLE, e.to_string())
                }
                other => {
                    error!(error = %other, "runtime error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "internal server error".to_owned(),
                    )
                }
            },
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, client_message) = self.status_and_message();
        (status, Json(json!({ "error": client_message }))).into_response()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn status(err: ServerError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn runtime_errors_map_to_status_codes() {
        assert_eq!(
            status(RuntimeError::Validation("bad".into()).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status(
                RuntimeError::TaskNotFound {
                    task_id: uuid::Uuid::nil()
                }
                .into()
            ),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status(
                RuntimeError::PathEscapesWorkspace {
                    path: "../x".into()
                }
                .into()
            ),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status(RuntimeError::QueueFull { capacity: 1 }.into()),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status(RuntimeError::QueueStopped.into()),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status(
                RuntimeError::Workspace {
                    path: "/secret".into(),
                    message: "denied".into()
                }
                .into()
            ),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn internal_details_are_not_exposed() {
        let err = ServerError::Runtime(RuntimeError::Workspace {
            path: "/srv/secret".into(),
            message: "permission denied".into(),
        });
        let (_, message) = err.status_and_message();
        assert_eq!(message, "internal server error");
    }
}
