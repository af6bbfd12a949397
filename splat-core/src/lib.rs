//! Task orchestration for video-to-3D reconstruction.
//!
//! Jobs are validated and registered by the [`Orchestrator`], then executed
//! one at a time by a single worker that drives a variant's stages through a
//! [`StageRunner`].

mod runtime;

pub use runtime::orchestrator::{Orchestrator, OrchestratorConfig};
pub use runtime::pipeline::{
    DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_FPS, DEFAULT_ITERATIONS, DEFAULT_KEYFRAME_INTERVAL,
    PipelineRequest, PipelineRun, StageParams, Variant,
};
pub use runtime::queue::{ExecutionQueue, QueueCapacity};
pub use runtime::registry::TaskRegistry;
pub use runtime::resolver;
pub use runtime::runner::ProcessRunner;
pub use runtime::stage::{
    CommandSpec, Stage, StageAction, StageFailure, StageInvocation, StageOutput, StageRunner,
};
pub use runtime::tools::{ToolCommand, ToolConfig};
pub use runtime::types::{RuntimeError, Task, TaskId, TaskOutcome, TaskResult, TaskStatus};
pub use runtime::workspace::{RunWorkspace, Workspace};
