use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Url;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::{Instrument, info, info_span, warn};

use crate::runtime::resolver;
use crate::runtime::stage::{Stage, StageContext, StageRunner};
use crate::runtime::tools::ToolConfig;
use crate::runtime::types::{RuntimeError, TaskId, TaskResult};
use crate::runtime::workspace::RunWorkspace;

pub const DEFAULT_FPS: u32 = 1;
pub const DEFAULT_KEYFRAME_INTERVAL: u32 = 5;
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 1e-3;
pub const DEFAULT_ITERATIONS: u32 = 200;

/// The closed set of reconstruction pipelines.
///
/// Parsed once at admission, case-insensitively; the single-letter aliases
/// `a`/`b`/`c` are accepted as well.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(ascii_case_insensitive)]
pub enum Variant {
    /// Camera-pose inference followed by joint pose/splat training.
    #[default]
    #[strum(to_string = "splat", serialize = "a")]
    Splat,
    /// Single-pass keyframe reconstruction filtered by confidence.
    #[strum(to_string = "keyframe", serialize = "b")]
    Keyframe,
    /// Structure-from-motion, surface training and mesh extraction.
    #[strum(to_string = "mesh", serialize = "c")]
    Mesh,
}

impl Variant {
    /// Parse a client-supplied selector.
    pub fn parse(selector: &str) -> Result<Self, RuntimeError> {
        selector.trim().parse().map_err(|_| {
            RuntimeError::Validation(format!(
                "unsupported variant '{selector}'; must be one of: splat, keyframe, mesh"
            ))
        })
    }

    /// Ordered stage list for this variant.
    pub fn stages(&self, params: &StageParams) -> Vec<Stage> {
        let mut stages = vec![Stage::Download, Stage::ExtractFrames { fps: params.fps }];
        match self {
            Variant::Splat => {
                stages.push(Stage::CameraPoseInference);
                stages.push(Stage::JointTraining {
                    iterations: params.iterations,
                });
            }
            Variant::Keyframe => stages.push(Stage::DemoReconstruction {
                keyframe_interval: params.keyframe_interval,
                confidence_threshold: params.confidence_threshold,
            }),
            Variant::Mesh => {
                stages.push(Stage::StructureFromMotion);
                stages.push(Stage::SurfaceTraining {
                    iterations: params.iterations,
                });
                stages.push(Stage::MeshRender {
                    iterations: params.iterations,
                });
            }
        }
        stages
    }
}

/// Tunable stage parameters.  Each variant reads only the ones it needs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageParams {
    /// Frames sampled per second of video.
    pub fps: u32,
    /// Keyframe spacing (keyframe variant).
    pub keyframe_interval: u32,
    /// Point confidence cut-off (keyframe variant).
    pub confidence_threshold: f64,
    /// Training iterations (splat and mesh variants).
    pub iterations: u32,
}

impl Default for StageParams {
    fn default() -> Self {
        Self {
            fps: DEFAULT_FPS,
            keyframe_interval: DEFAULT_KEYFRAME_INTERVAL,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            iterations: DEFAULT_ITERATIONS,
        }
    }
}

/// A job submission before admission.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineRequest {
    pub source_url: String,
    pub variant: Variant,
    pub params: StageParams,
}

impl PipelineRequest {
    /// Request for `source_url` with the default variant and parameters.
    pub fn new(source_url: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            variant: Variant::default(),
            params: StageParams::default(),
        }
    }

    pub fn variant(mut self, variant: Variant) -> Self {
        self.variant = variant;
        self
    }

    pub fn params(mut self, params: StageParams) -> Self {
        self.params = params;
        self
    }

    /// Check the request and return the parsed source URL.
    pub fn validate(&self) -> Result<Url, RuntimeError> {
        let raw = self.source_url.trim();
        if raw.is_empty() {
            return Err(RuntimeError::Validation("video_url must not be empty".into()));
        }
        let url = Url::parse(raw)
            .map_err(|e| RuntimeError::Validation(format!("video_url is not a valid URL: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(RuntimeError::Validation(
                "video_url must be an http:// or https:// URL".into(),
            ));
        }

        let p = &self.params;
        if p.fps == 0 {
            return Err(RuntimeError::Validation("fps must be at least 1".into()));
        }
        if p.keyframe_interval == 0 {
            return Err(RuntimeError::Validation(
                "keyframe_interval must be at least 1".into(),
            ));
        }
        if p.iterations == 0 {
            return Err(RuntimeError::Validation("iterations must be at least 1".into()));
        }
        if !p.confidence_threshold.is_finite() || p.confidence_threshold < 0.0 {
            return Err(RuntimeError::Validation(
                "confidence_threshold must be a finite, non-negative number".into(),
            ));
        }
        Ok(url)
    }
}

/// A parameterized variant bound to a task and its working directories.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    variant: Variant,
    params: StageParams,
    stages: Vec<Stage>,
    context: StageContext,
    stage_timeout: Option<Duration>,
}

impl PipelineRun {
    pub fn new(
        task_id: TaskId,
        source: Url,
        variant: Variant,
        params: StageParams,
        dirs: RunWorkspace,
        tools: Arc<ToolConfig>,
    ) -> Self {
        Self {
            variant,
            params,
            stages: variant.stages(&params),
            context: StageContext {
                task_id,
                source,
                dirs,
                tools,
                frame_count: 0,
            },
            stage_timeout: None,
        }
    }

    /// Bound each stage's wall-clock time.  `None` waits indefinitely.
    pub fn with_stage_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.stage_timeout = timeout;
        self
    }

    pub fn task_id(&self) -> TaskId {
        self.context.task_id
    }

    pub fn variant(&self) -> Variant {
        self.variant
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn dirs(&self) -> &RunWorkspace {
        &self.context.dirs
    }

    /// Run every stage in order, stopping at the first failure.
    pub async fn execute<R>(self, runner: &R) -> Result<TaskResult, RuntimeError>
    where
        R: StageRunner + ?Sized,
    {
        let span = info_span!(
            "pipeline",
            task_id = %self.context.task_id,
            variant = %self.variant,
            scene = %self.context.dirs.scene,
        );
        self.execute_inner(runner).instrument(span).await
    }

    async fn execute_inner<R>(self, runner: &R) -> Result<TaskResult, RuntimeError>
    where
        R: StageRunner + ?Sized,
    {
        let Self {
            variant,
            params,
            stages,
            mut context,
            stage_timeout,
        } = self;

        context.dirs.prepare().await?;

        let total = stages.len();
        for (idx, stage) in stages.iter().enumerate() {
            let name = stage.name();
            let invocation = stage.invocation(&context);
            info!(stage = name, index = idx + 1, total, "stage started");
            let started = Instant::now();

            let outcome = match stage_timeout {
                Some(limit) => tokio::time::timeout(limit, runner.run(&invocation))
                    .await
                    .map_err(|_| {
                        warn!(stage = name, timeout = ?limit, "stage timed out");
                        RuntimeError::StageTimedOut {
                            stage: name.to_owned(),
                            timeout: limit,
                        }
                    })?,
                None => runner.run(&invocation).await,
            };

            if let Err(failure) = outcome {
                warn!(
                    stage = name,
                    exit_code = ?failure.exit_code,
                    diagnostics = %failure.diagnostics,
                    "stage failed; aborting pipeline"
                );
                return Err(RuntimeError::StageFailed {
                    stage: name.to_owned(),
                    exit_code: failure.exit_code,
                    diagnostics: failure.diagnostics,
                });
            }

            if matches!(stage, Stage::ExtractFrames { .. }) {
                context.frame_count = count_frames(&context.dirs.images_dir()).await?;
                if context.frame_count == 0 {
                    warn!("frame extraction produced no frames");
                }
                info!(frames = context.frame_count, "frames extracted");
            }

            info!(
                stage = name,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "stage finished"
            );
        }

        Ok(resolver::resolve(variant, &context.dirs.output_rel, &params))
    }
}

/// Number of `frame_*.jpg` files in `dir`.
pub async fn count_frames(dir: &Path) -> Result<usize, RuntimeError> {
    let io_err = |e: std::io::Error| RuntimeError::Workspace {
        path: dir.to_path_buf(),
        message: e.to_string(),
    };
    let mut entries = tokio::fs::read_dir(dir).await.map_err(io_err)?;
    let mut count = 0;
    while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with("frame_") && name.ends_with(".jpg") {
            count += 1;
        }
    }
    Ok(count)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn variant_selectors_parse_case_insensitively() {
        assert_eq!(Variant::parse("splat").unwrap(), Variant::Splat);
        assert_eq!(Variant::parse("A").unwrap(), Variant::Splat);
        assert_eq!(Variant::parse("Keyframe").unwrap(), Variant::Keyframe);
        assert_eq!(Variant::parse("b").unwrap(), Variant::Keyframe);
        assert_eq!(Variant::parse(" MESH ").unwrap(), Variant::Mesh);
        assert_eq!(Variant::parse("c").unwrap(), Variant::Mesh);
    }

    #[test]
    fn unknown_variant_is_a_validation_error() {
        for bad in ["foo", "", "d", "splatx"] {
            assert!(
                matches!(Variant::parse(bad), Err(RuntimeError::Validation(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn variant_display_uses_canonical_name() {
        assert_eq!(Variant::Splat.to_string(), "splat");
        assert_eq!(Variant::Keyframe.to_string(), "keyframe");
        assert_eq!(Variant::Mesh.to_string(), "mesh");
        assert_eq!(Variant::default(), Variant::Splat);
    }

    #[test]
    fn variants_share_leading_stages() {
        let params = StageParams::default();
        let names = |v: Variant| -> Vec<&'static str> {
            v.stages(&params).iter().map(Stage::name).collect()
        };
        assert_eq!(
            names(Variant::Splat),
            ["download", "extract_frames", "camera_pose_inference", "joint_training"]
        );
        assert_eq!(
            names(Variant::Keyframe),
            ["download", "extract_frames", "demo_reconstruction"]
        );
        assert_eq!(
            names(Variant::Mesh),
            [
                "download",
                "extract_frames",
                "structure_from_motion",
                "surface_training",
                "mesh_render"
            ]
        );
    }

    #[test]
    fn stages_carry_parameters() {
        let params = StageParams {
            fps: 3,
            keyframe_interval: 9,
            confidence_threshold: 0.25,
            iterations: 1000,
        };
        assert_eq!(
            Variant::Keyframe.stages(&params),
            vec![
                Stage::Download,
                Stage::ExtractFrames { fps: 3 },
                Stage::DemoReconstruction {
                    keyframe_interval: 9,
                    confidence_threshold: 0.25
                },
            ]
        );
        assert_eq!(
            Variant::Mesh.stages(&params)[4],
            Stage::MeshRender { iterations: 1000 }
        );
    }

    #[test]
    fn request_defaults() {
        let req = PipelineRequest::new("http://host/clip.mp4");
        assert_eq!(req.variant, Variant::Splat);
        assert_eq!(req.params.fps, 1);
        assert_eq!(req.params.keyframe_interval, 5);
        assert_eq!(req.params.confidence_threshold, 1e-3);
        assert_eq!(req.params.iterations, 200);
        assert_eq!(req.validate().unwrap().as_str(), "http://host/clip.mp4");
    }

    #[test]
    fn invalid_requests_are_rejected() {
        let bad_urls = ["", "   ", "not a url", "ftp://host/clip.mp4", "file:///etc/passwd"];
        for url in bad_urls {
            assert!(
                matches!(
                    PipelineRequest::new(url).validate(),
                    Err(RuntimeError::Validation(_))
                ),
                "{url:?} should be rejected"
            );
        }

        let zero_fps = PipelineRequest::new("http://host/a.mp4").params(StageParams {
            fps: 0,
            ..StageParams::default()
        });
        assert!(zero_fps.validate().is_err());

        let nan = PipelineRequest::new("http://host/a.mp4").params(StageParams {
            confidence_threshold: f64::NAN,
            ..StageParams::default()
        });
        assert!(nan.validate().is_err());
    }

    #[tokio::test]
    async fn count_frames_only_counts_frame_jpgs() {
        let tmp = tempfile::tempdir().unwrap();
        for name in ["frame_0001.jpg", "frame_0002.jpg", "frame_0003.png", "thumb.jpg"] {
            std::fs::write(tmp.path().join(name), b"").unwrap();
        }
        assert_eq!(count_frames(tmp.path()).await.unwrap(), 2);
    }
}
