use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Url;
use strum::IntoStaticStr;

use crate::runtime::tools::ToolConfig;
use crate::runtime::types::TaskId;
use crate::runtime::workspace::RunWorkspace;

/// A process invocation with a structured argument list.
///
/// Arguments are handed to the OS as-is; nothing is ever interpreted by a
/// shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

/// What a stage asks the [`StageRunner`] to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageAction {
    /// Download `url` into `dest`.
    Fetch { url: Url, dest: PathBuf },
    /// Run an external tool to completion.
    Exec(CommandSpec),
}

/// One concrete stage execution handed to a [`StageRunner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageInvocation {
    pub task_id: TaskId,
    pub stage: &'static str,
    pub action: StageAction,
}

/// Captured output of a successful stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageOutput {
    pub stdout: String,
}

/// Structured failure of a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageFailure {
    /// Process exit code; `None` when the process could not be launched, was
    /// killed by a signal, or the stage did not run a process.
    pub exit_code: Option<i32>,
    /// Captured diagnostic output (stderr, or a summary when stderr is empty).
    pub diagnostics: String,
}

impl StageFailure {
    pub fn new(exit_code: Option<i32>, diagnostics: impl Into<String>) -> Self {
        Self {
            exit_code,
            diagnostics: diagnostics.into(),
        }
    }
}

/// Executes stage invocations.
///
/// [`ProcessRunner`] is the production implementation; tests substitute a
/// recording runner.
///
/// [`ProcessRunner`]: crate::runtime::runner::ProcessRunner
#[async_trait]
pub trait StageRunner: Send + Sync + 'static {
    async fn run(&self, invocation: &StageInvocation) -> Result<StageOutput, StageFailure>;
}

/// State threaded from one stage to the next within a run.
#[derive(Debug, Clone)]
pub struct StageContext {
    pub task_id: TaskId,
    pub source: Url,
    pub dirs: RunWorkspace,
    pub tools: Arc<ToolConfig>,
    /// Number of frames written by [`Stage::ExtractFrames`]; zero before it runs.
    pub frame_count: usize,
}

/// A single step of a reconstruction pipeline.
#[derive(Debug, Clone, Copy, PartialEq, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
    Download,
    ExtractFrames {
        fps: u32,
    },
    CameraPoseInference,
    JointTraining {
        iterations: u32,
    },
    DemoReconstruction {
        keyframe_interval: u32,
        confidence_threshold: f64,
    },
    StructureFromMotion,
    SurfaceTraining {
        iterations: u32,
    },
    MeshRender {
        iterations: u32,
    },
}

fn arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

impl Stage {
    /// Stable name used in logs and invocations.
    pub fn name(&self) -> &'static str {
        self.into()
    }

    /// Build the invocation for this stage from the current run context.
    pub fn invocation(&self, ctx: &StageContext) -> StageInvocation {
        let dirs = &ctx.dirs;
        let tools = &ctx.tools;
        let root = dirs.root.as_path();
        let input = arg(&dirs.input_dir);
        let output = arg(&dirs.output_dir);
        let n_views = ctx.frame_count.to_string();

        let action = match *self {
            Stage::Download => StageAction::Fetch {
                url: ctx.source.clone(),
                dest: dirs.video_path(),
            },
            Stage::ExtractFrames { fps } => StageAction::Exec(tools.ffmpeg.command(
                root,
                vec![
                    "-i".into(),
                    arg(&dirs.video_path()),
                    "-vf".into(),
                    format!("fps={fps}"),
                    arg(&dirs.images_dir().join("frame_%04d.jpg")),
                ],
            )),
            Stage::CameraPoseInference => StageAction::Exec(tools.camera_pose.command(
                root,
                vec![
                    "--img_base_path".into(),
                    input,
                    "--n_views".into(),
                    n_views,
                    "--focal_avg".into(),
                ],
            )),
            Stage::JointTraining { iterations } => StageAction::Exec(tools.joint_training.command(
                root,
                vec![
                    "-s".into(),
                    input,
                    "-m".into(),
                    output,
                    "--n_views".into(),
                    n_views,
                    "--scene".into(),
                    dirs.scene.clone(),
                    "--iter".into(),
                    iterations.to_string(),
                    "--optim_pose".into(),
                ],
            )),
            Stage::DemoReconstruction {
                keyframe_interval,
                confidence_threshold,
            } => StageAction::Exec(tools.demo_reconstruction.command(
                root,
                vec![
                    "--img_dir".into(),
                    arg(&dirs.images_dir()),
                    "--save_dir".into(),
                    output,
                    "--n_views".into(),
                    n_views,
                    "--kf_every".into(),
                    keyframe_interval.to_string(),
                    "--conf_thresh".into(),
                    confidence_threshold.to_string(),
                ],
            )),
            Stage::StructureFromMotion => StageAction::Exec(tools.structure_from_motion.command(
                root,
                vec![
                    "--workspace_path".into(),
                    input,
                    "--image_path".into(),
                    arg(&dirs.images_dir()),
                ],
            )),
            Stage::SurfaceTraining { iterations } => StageAction::Exec(tools.surface_training.command(
                root,
                vec![
                    "-s".into(),
                    input,
                    "-m".into(),
                    output,
                    "--iterations".into(),
                    iterations.to_string(),
                ],
            )),
            Stage::MeshRender { iterations } => StageAction::Exec(tools.mesh_render.command(
                root,
                vec![
                    "-s".into(),
                    input,
                    "-m".into(),
                    output,
                    "--iteration".into(),
                    iterations.to_string(),
                ],
            )),
        };

        StageInvocation {
            task_id: ctx.task_id,
            stage: self.name(),
            action,
        }
    }
}
