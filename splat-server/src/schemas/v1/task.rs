use serde::{Deserialize, Serialize};
use splat_core::Task;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::Config;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TaskResponse {
    pub id: Uuid,
    /// `splat`, `keyframe` or `mesh`.
    pub variant: String,
    /// `processing`, `complete` or `failed`.
    pub status: String,
    /// Point-cloud locator relative to the workspace root.
    pub result: Option<String>,
    /// Mesh locator (mesh variant only).
    pub mesh: Option<String>,
    pub result_url: Option<String>,
    pub mesh_url: Option<String>,
    /// Diagnostic of a failed task.
    pub error: Option<String>,
    /// Seconds since submission, two decimals.
    pub elapsed_time: f64,
    pub created_at: String,
    pub finished_at: Option<String>,
}

impl TaskResponse {
    pub fn from_task(task: &Task, config: &Config) -> Self {
        let result = task.result.as_ref().map(|r| r.point_cloud.clone());
        let mesh = task.result.as_ref().and_then(|r| r.mesh.clone());
        TaskResponse {
            id: task.id,
            variant: task.variant.to_string(),
            status: task.status.as_str().to_owned(),
            result_url: result.as_deref().map(|l| config.artifact_url(l)),
            mesh_url: mesh.as_deref().map(|l| config.artifact_url(l)),
            result,
            mesh,
            error: task.error.clone(),
            elapsed_time: task.elapsed_secs(),
            created_at: task.created_at.to_rfc3339(),
            finished_at: task.finished_at.map(|t| t.to_rfc3339()),
        }
    }
}
