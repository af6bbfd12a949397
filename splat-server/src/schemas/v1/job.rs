use serde::{Deserialize, Serialize};
use splat_core::{PipelineRequest, RuntimeError, StageParams, Variant};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct SubmitJobRequest {
    /// http(s) URL of the source video.
    pub video_url: Option<String>,
    /// `splat` (default), `keyframe` or `mesh`; `a`/`b`/`c` are accepted too.
    pub variant: Option<String>,
    /// Frames sampled per second of video (default 1).
    pub fps: Option<u32>,
    /// Keyframe spacing for the keyframe variant (default 5).
    pub keyframe_interval: Option<u32>,
    /// Confidence cut-off for the keyframe variant (default 0.001).
    pub confidence_threshold: Option<f64>,
    /// Training iterations for the splat and mesh variants (default 200).
    pub iterations: Option<u32>,
}

impl SubmitJobRequest {
    /// Fill in defaults and parse the variant selector.
    pub fn into_pipeline_request(self) -> Result<PipelineRequest, RuntimeError> {
        let video_url = self
            .video_url
            .ok_or_else(|| RuntimeError::Validation("video_url is required".into()))?;
        let variant = match self.variant.as_deref() {
            Some(selector) => Variant::parse(selector)?,
            None => Variant::default(),
        };

        let defaults = StageParams::default();
        let params = StageParams {
            fps: self.fps.unwrap_or(defaults.fps),
            keyframe_interval: self.keyframe_interval.unwrap_or(defaults.keyframe_interval),
            confidence_threshold: self
                .confidence_threshold
                .unwrap_or(defaults.confidence_threshold),
            iterations: self.iterations.unwrap_or(defaults.iterations),
        };
        Ok(PipelineRequest::new(video_url).variant(variant).params(params))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SubmitJobResponse {
    pub task_id: Uuid,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_are_applied() {
        let req = SubmitJobRequest {
            video_url: Some("http://host/clip.mp4".into()),
            ..SubmitJobRequest::default()
        }
        .into_pipeline_request()
        .unwrap();
        assert_eq!(req.variant, Variant::Splat);
        assert_eq!(req.params, StageParams::default());
    }

    #[test]
    fn explicit_fields_override_defaults() {
        let req = SubmitJobRequest {
            video_url: Some("http://host/clip.mp4".into()),
            variant: Some("B".into()),
            keyframe_interval: Some(10),
            confidence_threshold: Some(0.5),
            ..SubmitJobRequest::default()
        }
        .into_pipeline_request()
        .unwrap();
        assert_eq!(req.variant, Variant::Keyframe);
        assert_eq!(req.params.keyframe_interval, 10);
        assert_eq!(req.params.confidence_threshold, 0.5);
        assert_eq!(req.params.fps, 1);
    }

    #[test]
    fn missing_url_and_unknown_variant_are_rejected() {
        assert!(matches!(
            SubmitJobRequest::default().into_pipeline_request(),
            Err(RuntimeError::Validation(_))
        ));
        let unknown = SubmitJobRequest {
            video_url: Some("http://host/clip.mp4".into()),
            variant: Some("foo".into()),
            ..SubmitJobRequest::default()
        };
        assert!(matches!(
            unknown.into_pipeline_request(),
            Err(RuntimeError::Validation(_))
        ));
    }
}
