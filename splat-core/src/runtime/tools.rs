//! External tool commands used by the pipeline stages.
//!
//! Every stage that shells out resolves its program, leading arguments and
//! working directory from a [`ToolCommand`].  The defaults match the layout of
//! a reconstruction checkout used as the workspace root; any entry can be
//! overridden from a TOML file:
//!
//! ```toml
//! [camera_pose]
//! program = "pixi"
//! args = ["run", "python", "tools/coarse_init_infer.py"]
//! cwd = "/workspace/InstantSplat"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::runtime::stage::CommandSpec;

/// Program plus fixed leading arguments for one external tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory; the workspace root when unset.
    #[serde(default)]
    pub cwd: Option<PathBuf>,
}

impl ToolCommand {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            cwd: None,
        }
    }

    /// Append stage-specific arguments and produce a runnable command.
    pub fn command(&self, default_cwd: &Path, stage_args: Vec<String>) -> CommandSpec {
        let mut args = self.args.clone();
        args.extend(stage_args);
        CommandSpec {
            program: self.program.clone(),
            args,
            cwd: self.cwd.clone().unwrap_or_else(|| default_cwd.to_path_buf()),
        }
    }
}

fn pixi_python(script: &str) -> ToolCommand {
    ToolCommand::new("pixi", ["run", "python", script])
}

/// The full set of tool commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolConfig {
    pub ffmpeg: ToolCommand,
    pub camera_pose: ToolCommand,
    pub joint_training: ToolCommand,
    pub demo_reconstruction: ToolCommand,
    pub structure_from_motion: ToolCommand,
    pub surface_training: ToolCommand,
    pub mesh_render: ToolCommand,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            ffmpeg: ToolCommand::new("ffmpeg", ["-hide_banner", "-y"]),
            camera_pose: pixi_python("tools/coarse_init_infer.py"),
            joint_training: pixi_python("tools/train_joint.py"),
            demo_reconstruction: pixi_python("tools/demo_reconstruct.py"),
            structure_from_motion: ToolCommand::new("colmap", ["automatic_reconstructor"]),
            surface_training: pixi_python("train.py"),
            mesh_render: pixi_python("render.py"),
        }
    }
}

impl ToolConfig {
    /// Parse overrides from TOML; tables that are absent keep their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let cfg = ToolConfig::from_toml_str("").expect("empty config parses");
        assert_eq!(cfg, ToolConfig::default());
    }

    #[test]
    fn partial_override_keeps_other_defaults() {
        let cfg = ToolConfig::from_toml_str(
            r#"
            [ffmpeg]
            program = "/opt/ffmpeg/bin/ffmpeg"

            [camera_pose]
            program = "python3"
            args = ["infer.py"]
            cwd = "/srv/splat"
            "#,
        )
        .expect("override parses");

        assert_eq!(cfg.ffmpeg.program, "/opt/ffmpeg/bin/ffmpeg");
        assert!(cfg.ffmpeg.args.is_empty());
        assert_eq!(cfg.camera_pose.cwd, Some(PathBuf::from("/srv/splat")));
        assert_eq!(cfg.joint_training, ToolConfig::default().joint_training);
    }

    #[test]
    fn unknown_tool_is_rejected() {
        assert!(ToolConfig::from_toml_str("[nerf]\nprogram = \"x\"").is_err());
    }

    #[test]
    fn command_appends_stage_args_and_defaults_cwd() {
        let tool = ToolCommand::new("pixi", ["run", "python", "x.py"]);
        let cmd = tool.command(Path::new("/ws"), vec!["--n_views".into(), "3".into()]);
        assert_eq!(cmd.program, "pixi");
        assert_eq!(cmd.args, ["run", "python", "x.py", "--n_views", "3"]);
        assert_eq!(cmd.cwd, PathBuf::from("/ws"));
    }
}
