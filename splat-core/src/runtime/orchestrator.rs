use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::runtime::pipeline::{PipelineRequest, PipelineRun};
use crate::runtime::queue::{ExecutionQueue, QueueCapacity};
use crate::runtime::registry::TaskRegistry;
use crate::runtime::stage::StageRunner;
use crate::runtime::tools::ToolConfig;
use crate::runtime::types::{RuntimeError, Task, TaskId, TaskOutcome};
use crate::runtime::workspace::{Workspace, video_name};

/// Settings for [`Orchestrator::start`].
#[derive(Debug, Clone, Default)]
pub struct OrchestratorConfig {
    /// Directory holding `data/` and `output/`; artifact locators are relative to it.
    pub workspace_root: PathBuf,
    pub queue_capacity: QueueCapacity,
    /// Per-stage wall-clock limit; `None` waits indefinitely.
    pub stage_timeout: Option<Duration>,
    pub tools: ToolConfig,
}

/// Admission front door: validates submissions, registers tasks and hands
/// runs to the single execution worker.
///
/// # Usage
///
/// ```rust,ignore
/// let orchestrator = Orchestrator::start(OrchestratorConfig::default(), Arc::new(ProcessRunner::new()));
/// let task_id = orchestrator.submit(PipelineRequest::new("https://host/clip.mp4")).await?;
/// let task = orchestrator.task(task_id).await?;
/// ```
#[derive(Clone, Debug)]
pub struct Orchestrator {
    registry: TaskRegistry,
    queue: Arc<ExecutionQueue>,
    workspace: Workspace,
    tools: Arc<ToolConfig>,
    stage_timeout: Option<Duration>,
}

impl Orchestrator {
    /// Start the execution worker and return a handle.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(config: OrchestratorConfig, runner: Arc<dyn StageRunner>) -> Self {
        let registry = TaskRegistry::new();
        let queue = ExecutionQueue::start(registry.clone(), runner, config.queue_capacity);
        info!(
            workspace = %config.workspace_root.display(),
            stage_timeout_secs = config.stage_timeout.map(|t| t.as_secs()),
            "orchestrator started"
        );
        Self {
            registry,
            queue: Arc::new(queue),
            workspace: Workspace::new(config.workspace_root),
            tools: Arc::new(config.tools),
            stage_timeout: config.stage_timeout,
        }
    }

    /// Validate, register and enqueue a job.
    ///
    /// Returns as soon as the task is queued; the task is already visible as
    /// `processing`.  Validation failures create no task.  If the queue
    /// refuses the run the task is marked failed and the refusal returned.
    pub async fn submit(&self, request: PipelineRequest) -> Result<TaskId, RuntimeError> {
        let source = request.validate()?;

        let name = video_name(&source);
        let stamp = self.workspace.next_stamp();
        let dirs = self.workspace.run_dirs(&name, stamp);

        let task_id = self.registry.create_task(request.variant).await;
        let run = PipelineRun::new(
            task_id,
            source,
            request.variant,
            request.params,
            dirs,
            Arc::clone(&self.tools),
        )
        .with_stage_timeout(self.stage_timeout);

        let scene = run.dirs().scene.clone();
        if let Err(err) = self.queue.submit(run) {
            warn!(%task_id, error = %err, "queue refused task");
            self.registry
                .set_terminal(task_id, TaskOutcome::Failed(err.diagnostic()))
                .await?;
            return Err(err);
        }

        info!(
            %task_id,
            variant = %request.variant,
            %scene,
            queue_depth = self.queue.depth(),
            "task queued"
        );
        Ok(task_id)
    }

    /// Snapshot of a task.
    pub async fn task(&self, task_id: TaskId) -> Result<Arc<Task>, RuntimeError> {
        self.registry.get_task(task_id).await
    }

    /// All task ids in submission order.
    pub async fn task_ids(&self) -> Vec<TaskId> {
        self.registry.list_task_ids().await
    }

    pub fn queue_depth(&self) -> usize {
        self.queue.depth()
    }

    pub fn is_busy(&self) -> bool {
        self.queue.is_busy()
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    /// Refuse new work, finish the running task, fail queued ones.
    pub async fn stop(&self) {
        self.queue.stop().await;
    }
}
