//! Artifact locators for finished runs.
//!
//! Locators are derived purely from the variant, the run's output directory
//! and the stage parameters; whether the tools actually wrote the files is
//! only discovered when the artifact is fetched.

use crate::runtime::pipeline::{StageParams, Variant};
use crate::runtime::types::TaskResult;

/// `{output}/point_cloud/iteration_{iterations}/point_cloud.ply`
pub fn point_cloud_locator(output_rel: &str, iterations: u32) -> String {
    format!("{output_rel}/point_cloud/iteration_{iterations}/point_cloud.ply")
}

/// `{output}/images/images_conf{threshold}.ply`
pub fn keyframe_point_cloud_locator(output_rel: &str, confidence_threshold: f64) -> String {
    format!("{output_rel}/images/images_conf{confidence_threshold}.ply")
}

/// `{output}/train/ours_{iterations}/fuse_post.ply`
pub fn mesh_locator(output_rel: &str, iterations: u32) -> String {
    format!("{output_rel}/train/ours_{iterations}/fuse_post.ply")
}

/// Locators for a run of `variant` writing into `output_rel`.
pub fn resolve(variant: Variant, output_rel: &str, params: &StageParams) -> TaskResult {
    match variant {
        Variant::Splat => TaskResult {
            point_cloud: point_cloud_locator(output_rel, params.iterations),
            mesh: None,
        },
        Variant::Keyframe => TaskResult {
            point_cloud: keyframe_point_cloud_locator(output_rel, params.confidence_threshold),
            mesh: None,
        },
        Variant::Mesh => TaskResult {
            point_cloud: point_cloud_locator(output_rel, params.iterations),
            mesh: Some(mesh_locator(output_rel, params.iterations)),
        },
    }
}
