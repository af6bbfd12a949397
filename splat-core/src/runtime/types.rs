use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::runtime::pipeline::Variant;

/// Unique identifier for a submitted reconstruction task.
pub type TaskId = Uuid;

/// Externally visible lifecycle state of a task.
///
/// A task is created `Processing` and moves exactly once into one of the two
/// terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Accepted; queued or executing.
    Processing,
    /// Every stage succeeded; `result` is populated.
    Complete,
    /// A stage failed; `error` is populated.
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Processing => "processing",
            TaskStatus::Complete => "complete",
            TaskStatus::Failed => "failed",
        }
    }

    /// Returns `true` for `Complete` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Complete | TaskStatus::Failed)
    }
}

/// Artifact locators produced by a successful pipeline run.
///
/// Both are `/`-separated paths relative to the workspace root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    /// Primary point-cloud artifact.
    pub point_cloud: String,
    /// Secondary mesh artifact; only the mesh variant produces one.
    pub mesh: Option<String>,
}

/// Terminal outcome written into the registry by the worker.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Complete(TaskResult),
    Failed(String),
}

impl TaskOutcome {
    pub fn status(&self) -> TaskStatus {
        match self {
            TaskOutcome::Complete(_) => TaskStatus::Complete,
            TaskOutcome::Failed(_) => TaskStatus::Failed,
        }
    }
}

/// Immutable snapshot of a task as stored in the [`TaskRegistry`].
///
/// [`TaskRegistry`]: crate::runtime::registry::TaskRegistry
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub id: TaskId,
    pub variant: Variant,
    pub status: TaskStatus,
    pub result: Option<TaskResult>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Task {
    pub(crate) fn processing(id: TaskId, variant: Variant) -> Self {
        Self {
            id,
            variant,
            status: TaskStatus::Processing,
            result: None,
            error: None,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Build the terminal snapshot that replaces `self`.
    pub(crate) fn finish(&self, outcome: TaskOutcome) -> Self {
        let status = outcome.status();
        let (result, error) = match outcome {
            TaskOutcome::Complete(result) => (Some(result), None),
            TaskOutcome::Failed(error) => (None, Some(error)),
        };
        Self {
            id: self.id,
            variant: self.variant,
            status,
            result,
            error,
            created_at: self.created_at,
            finished_at: Some(Utc::now()),
        }
    }

    /// Wall-clock time since the task was created.
    pub fn elapsed(&self) -> Duration {
        (Utc::now() - self.created_at).to_std().unwrap_or_default()
    }

    /// Elapsed seconds rounded to two decimals, as reported to pollers.
    pub fn elapsed_secs(&self) -> f64 {
        (self.elapsed().as_secs_f64() * 100.0).round() / 100.0
    }
}

/// Errors produced by the orchestration runtime.
#[derive(Debug, Clone, Error)]
pub enum RuntimeError {
    /// Submission input was missing or malformed; no task was created.
    #[error("invalid request: {0}")]
    Validation(String),

    /// The referenced task does not exist.
    #[error("task not found: {task_id}")]
    TaskNotFound { task_id: TaskId },

    /// A terminal status was already recorded for this task.
    #[error("task {task_id} already reached a terminal state")]
    TaskAlreadyTerminal { task_id: TaskId },

    /// An external stage exited unsuccessfully.
    #[error("stage '{stage}' failed{}: {diagnostics}", .exit_code.map(|c| format!(" (exit code {c})")).unwrap_or_default())]
    StageFailed {
        stage: String,
        exit_code: Option<i32>,
        diagnostics: String,
    },

    /// A stage exceeded the configured per-stage timeout.
    #[error("stage '{stage}' timed out after {timeout:?}")]
    StageTimedOut { stage: String, timeout: Duration },

    /// Creating or inspecting a run directory failed.
    #[error("workspace error at {}: {message}", .path.display())]
    Workspace { path: PathBuf, message: String },

    /// An artifact path resolves outside the workspace root.
    #[error("path escapes workspace root: {path}")]
    PathEscapesWorkspace { path: String },

    /// The requested artifact does not exist.
    #[error("artifact not found: {path}")]
    ArtifactNotFound { path: String },

    /// The bounded execution queue is at capacity.
    #[error("execution queue full (capacity {capacity})")]
    QueueFull { capacity: usize },

    /// The execution queue no longer accepts work.
    #[error("execution queue stopped")]
    QueueStopped,

    /// The pipeline run panicked inside the worker.
    #[error("pipeline panicked: {0}")]
    PipelinePanicked(String),
}

impl RuntimeError {
    /// Message recorded on a failed task.
    ///
    /// Stage failures surface the captured diagnostics verbatim; everything
    /// else uses the display form.
    pub fn diagnostic(&self) -> String {
        match self {
            RuntimeError::StageFailed { diagnostics, .. } => diagnostics.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&TaskStatus::Processing).unwrap(),
            "\"processing\""
        );
        let parsed: TaskStatus = serde_json::from_str("\"failed\"").unwrap();
        assert_eq!(parsed, TaskStatus::Failed);
        assert_eq!(TaskStatus::Complete.as_str(), "complete");
        assert!(!TaskStatus::Processing.is_terminal());
    }

    #[test]
    fn finishing_sets_exactly_one_of_result_and_error() {
        let task = Task::processing(Uuid::new_v4(), Variant::Splat);
        let failed = task.finish(TaskOutcome::Failed("boom".into()));
        assert_eq!(failed.status, TaskStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("boom"));
        assert_eq!(failed.result, None);
        assert_eq!(failed.created_at, task.created_at);
        assert!(failed.finished_at.is_some());
    }

    #[test]
    fn stage_failure_diagnostic_is_verbatim() {
        let err = RuntimeError::StageFailed {
            stage: "download".into(),
            exit_code: Some(8),
            diagnostics: "ERROR 404: Not Found.".into(),
        };
        assert_eq!(err.diagnostic(), "ERROR 404: Not Found.");
        assert_eq!(
            err.to_string(),
            "stage 'download' failed (exit code 8): ERROR 404: Not Found."
        );
        assert_eq!(
            RuntimeError::QueueStopped.diagnostic(),
            "execution queue stopped"
        );
    }

    #[test]
    fn elapsed_is_rounded_to_hundredths() {
        let task = Task::processing(Uuid::new_v4(), Variant::Mesh);
        let secs = task.elapsed_secs();
        assert!(secs >= 0.0);
        assert_eq!((secs * 100.0).round() / 100.0, secs);
    }
}
