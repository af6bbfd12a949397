use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;
use reqwest::Url;
use tracing::debug;

use crate::runtime::types::RuntimeError;

/// Directory (relative to the root) that receives downloaded videos and frames.
pub const INPUT_DIR: &str = "data";
/// Directory (relative to the root) that receives tool outputs.
pub const OUTPUT_DIR: &str = "output";

/// File name of the downloaded source video inside a run's input directory.
pub const VIDEO_FILE: &str = "input_video.mp4";
/// Sub-directory of a run's input directory holding extracted frames.
pub const IMAGES_DIR: &str = "images";

/// The filesystem area shared by all pipeline runs.
///
/// Runs are partitioned by `{name}_{stamp}` directories; [`Workspace::next_stamp`]
/// is strictly increasing for the lifetime of the process, so two runs never
/// share a directory.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    last_stamp: Arc<AtomicI64>,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            last_stamp: Arc::new(AtomicI64::new(0)),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Unix seconds, bumped past the previously issued stamp when needed.
    pub fn next_stamp(&self) -> i64 {
        let now = Utc::now().timestamp();
        let prev = match self
            .last_stamp
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            }) {
            Ok(prev) | Err(prev) => prev,
        };
        now.max(prev + 1)
    }

    /// Input/output directories for a run of the video called `name`.
    pub fn run_dirs(&self, name: &str, stamp: i64) -> RunWorkspace {
        let scene = format!("{name}_{stamp}");
        let input_rel = format!("{INPUT_DIR}/{scene}");
        let output_rel = format!("{OUTPUT_DIR}/{scene}");
        RunWorkspace {
            root: self.root.clone(),
            input_dir: self.root.join(&input_rel),
            output_dir: self.root.join(&output_rel),
            scene,
            input_rel,
            output_rel,
        }
    }

    /// Map an artifact locator onto a file inside the workspace root.
    ///
    /// Locators containing `..`, root or prefix components are rejected
    /// before touching the filesystem.  Symlinks are resolved and the target
    /// must still live under the root.
    pub async fn resolve_artifact(&self, locator: &str) -> Result<PathBuf, RuntimeError> {
        let rel = Path::new(locator);
        let escapes = rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(RuntimeError::PathEscapesWorkspace {
                path: locator.to_owned(),
            });
        }
        if rel.components().all(|c| c == Component::CurDir) {
            return Err(RuntimeError::ArtifactNotFound {
                path: locator.to_owned(),
            });
        }

        let root = tokio::fs::canonicalize(&self.root)
            .await
            .map_err(|e| RuntimeError::Workspace {
                path: self.root.clone(),
                message: e.to_string(),
            })?;

        // Missing entries, paths running through a file and over-long names
        // all mean there is no artifact at this locator.
        let resolved = match tokio::fs::canonicalize(root.join(rel)).await {
            Ok(p) => p,
            Err(e) => {
                debug!(locator, kind = ?e.kind(), error = %e, "artifact lookup failed");
                return Err(RuntimeError::ArtifactNotFound {
                    path: locator.to_owned(),
                });
            }
        };

        if !resolved.starts_with(&root) {
            return Err(RuntimeError::PathEscapesWorkspace {
                path: locator.to_owned(),
            });
        }

        let is_file = tokio::fs::metadata(&resolved)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if !is_file {
            return Err(RuntimeError::ArtifactNotFound {
                path: locator.to_owned(),
            });
        }
        Ok(resolved)
    }
}

/// The per-run slice of the workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunWorkspace {
    pub root: PathBuf,
    /// `{name}_{stamp}`; also passed to tools as the scene name.
    pub scene: String,
    /// `data/{scene}`
    pub input_rel: String,
    /// `output/{scene}`
    pub output_rel: String,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl RunWorkspace {
    pub fn video_path(&self) -> PathBuf {
        self.input_dir.join(VIDEO_FILE)
    }

    pub fn images_dir(&self) -> PathBuf {
        self.input_dir.join(IMAGES_DIR)
    }

    /// Create the input, frame and output directories.
    pub async fn prepare(&self) -> Result<(), RuntimeError> {
        for dir in [self.images_dir(), self.output_dir.clone()] {
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| RuntimeError::Workspace {
                    path: dir.clone(),
                    message: e.to_string(),
                })?;
        }
        Ok(())
    }
}

/// Base name of the video referenced by `url`, safe to use as a directory name.
///
/// `http://host/media/clip.mp4?x=1` yields `clip`.  Characters outside
/// `[A-Za-z0-9_-]` become `_`; an empty result falls back to `video`.
pub fn video_name(url: &Url) -> String {
    let file = url
        .path_segments()
        .and_then(|mut segs| segs.next_back())
        .unwrap_or("");
    let stem = match file.rfind('.') {
        Some(idx) if idx > 0 => &file[..idx],
        _ => file,
    };
    let name: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if name.is_empty() {
        "video".to_owned()
    } else {
        name
    }
}
