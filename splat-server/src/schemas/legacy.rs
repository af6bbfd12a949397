//! Request and response bodies of the original endpoints.

use serde::{Deserialize, Serialize};
use splat_core::{Task, TaskStatus};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::Config;

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ProcessVideoRequest {
    pub video_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProcessVideoResponse {
    pub task_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LegacyTaskResponse {
    pub status: String,
    /// Absolute point-cloud URL when complete, the diagnostic when failed.
    pub result: Option<String>,
    pub elapsed_time: f64,
}

impl LegacyTaskResponse {
    pub fn from_task(task: &Task, config: &Config) -> Self {
        let result = match task.status {
            TaskStatus::Processing => None,
            TaskStatus::Complete => task
                .result
                .as_ref()
                .map(|r| config.artifact_url(&r.point_cloud)),
            TaskStatus::Failed => task.error.clone(),
        };
        LegacyTaskResponse {
            status: task.status.as_str().to_owned(),
            result,
            elapsed_time: task.elapsed_secs(),
        }
    }
}
