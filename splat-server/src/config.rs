//! Server configuration, loaded from environment variables at startup.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use splat_core::{OrchestratorConfig, QueueCapacity, ToolConfig};

/// Runtime configuration for splat-server.
///
/// Every field has a default so the server starts without any environment
/// variables set.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP address to bind (default: `"0.0.0.0:5000"`).
    pub bind_address: String,

    /// `tracing` filter string, e.g. `"info"` or `"debug,tower_http=warn"`.
    pub log_level: String,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,

    /// Directory holding the `data/` and `output/` trees (default: `"."`).
    pub workspace_root: PathBuf,

    /// Execution queue capacity; `0` means unbounded.
    pub queue_capacity: usize,

    /// Per-stage timeout in seconds; unset waits indefinitely.
    pub stage_timeout_secs: Option<u64>,

    /// Optional TOML file overriding the external tool commands.
    pub tools_file: Option<PathBuf>,

    /// Prefix for artifact URLs handed to clients, without trailing slash.
    pub public_base_url: String,

    /// Comma-separated CORS origins; `None` allows any origin.
    pub cors_allowed_origins: Option<String>,

    /// Serve the OpenAPI document at `/api-docs/openapi.json`.
    pub enable_docs: bool,
}

impl Config {
    /// Build [`Config`] from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            bind_address: env_or("SPLAT_BIND", "0.0.0.0:5000"),
            log_level: env_or("SPLAT_LOG", "info"),
            log_json: parse_bool("SPLAT_LOG_JSON", false),
            workspace_root: PathBuf::from(env_or("SPLAT_WORKSPACE_ROOT", ".")),
            queue_capacity: parse_env("SPLAT_QUEUE_CAPACITY", 0),
            stage_timeout_secs: std::env::var("SPLAT_STAGE_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.trim().parse().ok())
                .filter(|secs| *secs > 0),
            tools_file: std::env::var_os("SPLAT_TOOLS_FILE").map(PathBuf::from),
            public_base_url: std::env::var("SPLAT_PUBLIC_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_owned())
                .unwrap_or_else(|_| default_public_base_url()),
            cors_allowed_origins: std::env::var("SPLAT_CORS_ORIGINS").ok(),
            enable_docs: parse_bool("SPLAT_ENABLE_DOCS", true),
        }
    }

    /// Orchestrator settings, reading the tool overrides file if one is set.
    pub fn orchestrator_config(&self) -> anyhow::Result<OrchestratorConfig> {
        let tools = match &self.tools_file {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read tools file {}", path.display()))?;
                ToolConfig::from_toml_str(&text)
                    .with_context(|| format!("invalid tools file {}", path.display()))?
            }
            None => ToolConfig::default(),
        };
        Ok(OrchestratorConfig {
            workspace_root: self.workspace_root.clone(),
            queue_capacity: QueueCapacity::from_limit(self.queue_capacity),
            stage_timeout: self.stage_timeout_secs.map(Duration::from_secs),
            tools,
        })
    }

    /// Absolute URL of an artifact locator.
    pub fn artifact_url(&self, locator: &str) -> String {
        format!("{}/files/{locator}", self.public_base_url)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:5000".to_owned(),
            log_level: "info".to_owned(),
            log_json: false,
            workspace_root: PathBuf::from("."),
            queue_capacity: 0,
            stage_timeout_secs: None,
            tools_file: None,
            public_base_url: "https://localhost:8080".to_owned(),
            cors_allowed_origins: None,
            enable_docs: true,
        }
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

/// `https://{PUBLIC_IPADDR}:{VAST_TCP_PORT_8080}` as exported by the host.
fn default_public_base_url() -> String {
    let host = env_or("PUBLIC_IPADDR", "localhost");
    let port = env_or("VAST_TCP_PORT_8080", "8080");
    format!("https://{host}:{port}")
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn artifact_url_joins_base_and_locator() {
        let cfg = Config {
            public_base_url: "https://1.2.3.4:41000".into(),
            ..Config::default()
        };
        assert_eq!(
            cfg.artifact_url("output/clip_1/point_cloud/iteration_200/point_cloud.ply"),
            "https://1.2.3.4:41000/files/output/clip_1/point_cloud/iteration_200/point_cloud.ply"
        );
    }

    #[test]
    fn orchestrator_config_maps_capacity_and_timeout() {
        let cfg = Config {
            queue_capacity: 4,
            stage_timeout_secs: Some(30),
            ..Config::default()
        };
        let oc = cfg.orchestrator_config().unwrap();
        assert_eq!(oc.queue_capacity, QueueCapacity::Bounded(4));
        assert_eq!(oc.stage_timeout, Some(Duration::from_secs(30)));
        assert_eq!(oc.tools, ToolConfig::default());

        let unbounded = Config::default().orchestrator_config().unwrap();
        assert_eq!(unbounded.queue_capacity, QueueCapacity::Unbounded);
    }

    #[test]
    fn tools_file_overrides_commands() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("tools.toml");
        std::fs::write(&path, "[ffmpeg]\nprogram = \"/usr/local/bin/ffmpeg\"\n").unwrap();

        let cfg = Config {
            tools_file: Some(path),
            ..Config::default()
        };
        let oc = cfg.orchestrator_config().unwrap();
        assert_eq!(oc.tools.ffmpeg.program, "/usr/local/bin/ffmpeg");
    }

    #[test]
    fn missing_tools_file_is_an_error() {
        let cfg = Config {
            tools_file: Some(PathBuf::from("/nonexistent/tools.toml")),
            ..Config::default()
        };
        assert!(cfg.orchestrator_config().is_err());
    }
}
