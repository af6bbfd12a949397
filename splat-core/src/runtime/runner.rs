use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use reqwest::{Client, Url};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::runtime::stage::{
    CommandSpec, StageAction, StageFailure, StageInvocation, StageOutput, StageRunner,
};

/// Production [`StageRunner`]: downloads over HTTP and launches tools as
/// child processes.
///
/// Child processes are killed if the stage future is dropped (e.g. on a
/// per-stage timeout).
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    client: Client,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessRunner {
    pub fn new() -> Self {
        let client = Client::builder()
            .user_agent(concat!("splat-core/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self { client }
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn fetch(&self, url: &Url, dest: &Path) -> Result<StageOutput, StageFailure> {
        info!(%url, dest = %dest.display(), "downloading source video");

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| StageFailure::new(None, format!("download of {url} failed: {e}")))?;

        let file = tokio::fs::File::create(dest).await.map_err(|e| {
            StageFailure::new(None, format!("cannot create {}: {e}", dest.display()))
        })?;
        let mut partial = PartialDownload { path: Some(dest) };

        let written = copy_body(url, response, file, dest).await?;
        partial.keep();

        debug!(bytes = written, "download finished");
        Ok(StageOutput {
            stdout: format!("downloaded {written} bytes"),
        })
    }

    async fn exec(&self, cmd: &CommandSpec) -> Result<StageOutput, StageFailure> {
        debug!(program = %cmd.program, args = ?cmd.args, cwd = %cmd.cwd.display(), "running command");

        let output = tokio::process::Command::new(&cmd.program)
            .args(&cmd.args)
            .current_dir(&cmd.cwd)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| StageFailure::new(None, format!("failed to launch `{}`: {e}", cmd.program)))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if output.status.success() {
            debug!(program = %cmd.program, stdout = %stdout, "command finished");
            return Ok(StageOutput { stdout });
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim_end().to_owned();
        let exit_code = output.status.code();
        let diagnostics = if stderr.is_empty() {
            match exit_code {
                Some(code) => format!("`{}` exited with status {code}", cmd.program),
                None => format!("`{}` was terminated by a signal", cmd.program),
            }
        } else {
            stderr
        };
        Err(StageFailure::new(exit_code, diagnostics))
    }
}

async fn copy_body(
    url: &Url,
    mut response: reqwest::Response,
    mut file: tokio::fs::File,
    dest: &Path,
) -> Result<u64, StageFailure> {
    let write_failed =
        |e: std::io::Error| StageFailure::new(None, format!("cannot write {}: {e}", dest.display()));

    let mut written: u64 = 0;
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| StageFailure::new(None, format!("download of {url} failed: {e}")))?
    {
        file.write_all(&chunk).await.map_err(write_failed)?;
        written += chunk.len() as u64;
    }
    file.flush().await.map_err(write_failed)?;
    Ok(written)
}

/// Removes a half-written download unless [`PartialDownload::keep`] is
/// called. Also runs when the stage future is dropped mid-transfer.
struct PartialDownload<'a> {
    path: Option<&'a Path>,
}

impl PartialDownload<'_> {
    fn keep(&mut self) {
        self.path = None;
    }
}

impl Drop for PartialDownload<'_> {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            match std::fs::remove_file(path) {
                Ok(()) => debug!(path = %path.display(), "removed partial download"),
                Err(e) => warn!(path = %path.display(), error = %e, "cannot remove partial download"),
            }
        }
    }
}

#[async_trait]
impl StageRunner for ProcessRunner {
    async fn run(&self, invocation: &StageInvocation) -> Result<StageOutput, StageFailure> {
        match &invocation.action {
            StageAction::Fetch { url, dest } => self.fetch(url, dest).await,
            StageAction::Exec(cmd) => self.exec(cmd).await,
        }
    }
}

#[cfg(all(test, unix))]
mod test {
    use super::*;

    fn invocation(program: &str, args: &[&str], cwd: &Path) -> StageInvocation {
        StageInvocation {
            task_id: uuid::Uuid::nil(),
            stage: "test",
            action: StageAction::Exec(CommandSpec {
                program: program.into(),
                args: args.iter().map(|s| s.to_string()).collect(),
                cwd: cwd.to_path_buf(),
            }),
        }
    }

    #[tokio::test]
    async fn successful_command_captures_stdout() {
        let tmp = tempfile::tempdir().unwrap();
        let out = ProcessRunner::new()
            .run(&invocation("echo", &["hello", "world"], tmp.path()))
            .await
            .expect("echo should succeed");
        assert_eq!(out.stdout.trim(), "hello world");
    }

    #[tokio::test]
    async fn arguments_are_not_shell_expanded() {
        let tmp = tempfile::tempdir().unwrap();
        let out = ProcessRunner::new()
            .run(&invocation("echo", &["$HOME; ls"], tmp.path()))
            .await
            .unwrap();
        assert_eq!(out.stdout.trim(), "$HOME; ls");
    }

    #[tokio::test]
    async fn failing_command_reports_exit_code_and_stderr() {
        let tmp = tempfile::tempdir().unwrap();
        let err = ProcessRunner::new()
            .run(&invocation("sh", &["-c", "echo broken >&2; exit 3"], tmp.path()))
            .await
            .unwrap_err();
        assert_eq!(err.exit_code, Some(3));
        assert_eq!(err.diagnostics, "broken");
    }

    #[tokio::test]
    async fn silent_failure_gets_summary() {
        let tmp = tempfile::tempdir().unwrap();
        let err = ProcessRunner::new()
            .run(&invocation("false", &[], tmp.path()))
            .await
            .unwrap_err();
        assert_eq!(err.exit_code, Some(1));
        assert_eq!(err.diagnostics, "`false` exited with status 1");
    }

    #[tokio::test]
    async fn missing_program_is_a_launch_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let err = ProcessRunner::new()
            .run(&invocation("definitely-not-a-real-tool-7f3a", &[], tmp.path()))
            .await
            .unwrap_err();
        assert_eq!(err.exit_code, None);
        assert!(err.diagnostics.starts_with("failed to launch"));
    }

    /// Serves one response announcing `announced` bytes but sending fewer.
    async fn truncated_server(announced: usize, sent: &'static [u8]) -> Url {
        use tokio::io::AsyncReadExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            let head = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: video/mp4\r\ncontent-length: {announced}\r\n\r\n"
            );
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.write_all(sent).await.unwrap();
            socket.shutdown().await.unwrap();
        });
        Url::parse(&format!("http://{addr}/clip.mp4")).unwrap()
    }

    #[tokio::test]
    async fn interrupted_download_leaves_no_file() {
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("input_video.mp4");
        let url = truncated_server(1000, b"only a few bytes").await;

        let err = ProcessRunner::new()
            .run(&StageInvocation {
                task_id: uuid::Uuid::nil(),
                stage: "download",
                action: StageAction::Fetch {
                    url,
                    dest: dest.clone(),
                },
            })
            .await
            .unwrap_err();
        assert!(err.diagnostics.starts_with("download of"), "{}", err.diagnostics);
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn completed_download_is_kept() {
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("input_video.mp4");
        let url = truncated_server(5, b"video").await;

        let out = ProcessRunner::new()
            .run(&StageInvocation {
                task_id: uuid::Uuid::nil(),
                stage: "download",
                action: StageAction::Fetch {
                    url,
                    dest: dest.clone(),
                },
            })
            .await
            .unwrap();
        assert_eq!(out.stdout, "downloaded 5 bytes");
        assert_eq!(std::fs::read(&dest).unwrap(), b"video");
    }

    #[tokio::test]
    async fn command_runs_in_requested_directory() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("marker.txt"), b"").unwrap();
        let out = ProcessRunner::new()
            .run(&invocation("ls", &[], tmp.path()))
            .await
            .unwrap();
        assert!(out.stdout.contains("marker.txt"));
    }
}
