//! youtube-dl / yt-dlp wrapper.

pub mod info;
pub mod progress;

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::Command;

use super::{DownloadProgressFn, MediaTool};
use crate::errors::ImporterError;
use info::MediaInfo;
use progress::parse_progress_line;

pub const DEFAULT_FORMAT: &str = "best[ext=mp4]/best[ext=webm]/best/mp4/webm";

#[derive(Debug, Clone)]
pub struct YtdlWrapper {
    bin_path: String,
    format: String,
}

impl YtdlWrapper {
    pub fn new(bin_path: impl Into<String>, format: impl Into<String>) -> Self {
        Self {
            bin_path: bin_path.into(),
            format: format.into(),
        }
    }

    pub fn bin_path(&self) -> &str {
        &self.bin_path
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.bin_path);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    fn spawn_error(&self, err: std::io::Error) -> ImporterError {
        ImporterError::Tool(format!("failed to run {}: {}", self.bin_path, err))
    }

    /// Run to completion and return stdout, failing on a non-zero exit.
    async fn output(&self, args: &[&str]) -> Result<Vec<u8>, ImporterError> {
        tracing::debug!(bin = %self.bin_path, ?args, "Running tool");
        let out = self
            .command(args)
            .output()
            .await
            .map_err(|e| self.spawn_error(e))?;

        if !out.status.success() {
            return Err(exit_error(
                &self.bin_path,
                out.status,
                &String::from_utf8_lossy(&out.stderr),
            ));
        }
        Ok(out.stdout)
    }
}

fn exit_error(bin: &str, status: std::process::ExitStatus, stderr: &str) -> ImporterError {
    let last_line = stderr
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .last()
        .unwrap_or("no output");
    ImporterError::Tool(format!("{} exited with {}: {}", bin, status, last_line))
}

async fn read_progress<R>(stdout: R, on_progress: &DownloadProgressFn) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stdout).lines();
    while let Some(line) = lines.next_line().await? {
        if let Some(progress) = parse_progress_line(&line) {
            on_progress(progress);
        }
    }
    Ok(())
}

async fn read_all<R>(stderr: R) -> String
where
    R: AsyncRead + Unpin,
{
    let mut buf = String::new();
    let mut reader = BufReader::new(stderr);
    if let Err(e) = reader.read_to_string(&mut buf).await {
        tracing::debug!(error = %e, "Failed to read tool stderr");
    }
    buf
}

#[async_trait]
impl MediaTool for YtdlWrapper {
    async fn info(&self, url: &str) -> Result<MediaInfo, ImporterError> {
        let stdout = self
            .output(&["-J", "--flat-playlist", "--no-playlist", url])
            .await?;
        MediaInfo::from_json(&stdout)
    }

    async fn resolve_filename(&self, url: &str, template: &str) -> Result<String, ImporterError> {
        let stdout = self
            .output(&[
                "--no-playlist",
                "--get-filename",
                "-f",
                self.format.as_str(),
                "-o",
                template,
                url,
            ])
            .await?;
        let filename = String::from_utf8_lossy(&stdout).trim().to_string();
        if filename.is_empty() {
            return Err(ImporterError::Tool(format!(
                "{} did not report an output filename",
                self.bin_path
            )));
        }
        Ok(filename)
    }

    async fn download(
        &self,
        url: &str,
        output: &str,
        on_progress: DownloadProgressFn,
    ) -> Result<(), ImporterError> {
        let args = [
            "--no-playlist",
            "--newline",
            "-f",
            self.format.as_str(),
            "-o",
            output,
            url,
        ];
        tracing::debug!(bin = %self.bin_path, ?args, "Running tool");
        let mut child = self.command(&args).spawn().map_err(|e| self.spawn_error(e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ImporterError::Internal("tool stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ImporterError::Internal("tool stderr not captured".to_string()))?;

        let (progress_result, stderr_text) =
            tokio::join!(read_progress(stdout, &on_progress), read_all(stderr));
        let status = child.wait().await?;

        if !status.success() {
            return Err(exit_error(&self.bin_path, status, &stderr_text));
        }
        progress_result?;
        Ok(())
    }

    async fn update(&self) -> Result<(), ImporterError> {
        self.output(&["-U"]).await.map(|_| ())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::os::unix::fs::PermissionsExt;
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Write an executable shell script standing in for the tool.
    fn fake_tool(dir: &TempDir, body: &str) -> String {
        let path = dir.path().join("fake-ytdl");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().to_string()
    }

    #[tokio::test]
    async fn test_info_parses_tool_json() {
        let dir = TempDir::new().unwrap();
        let bin = fake_tool(
            &dir,
            r#"echo '{"_type":"playlist","id":"PL1","extractor":"youtube:playlist","entries":[{"url":"https://v/1"}]}'"#,
        );
        let wrapper = YtdlWrapper::new(bin, DEFAULT_FORMAT);

        let info = wrapper.info("https://example.com/list").await.unwrap();
        assert!(info.is_playlist());
    }

    #[tokio::test]
    async fn test_download_streams_progress_lines() {
        let dir = TempDir::new().unwrap();
        let bin = fake_tool(
            &dir,
            concat!(
                "echo '[youtube] abc: Downloading webpage'\n",
                "echo '[download]  10.0% of 1.00MiB at 1.00KiB/s ETA 00:10'\n",
                "echo '[download]  50.0% of 1.00MiB at 2.00KiB/s ETA 00:05'",
            ),
        );
        let wrapper = YtdlWrapper::new(bin, DEFAULT_FORMAT);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        wrapper
            .download(
                "https://example.com/v",
                "/tmp/out.mp4",
                Arc::new(move |p| sink.lock().push(p.percent)),
            )
            .await
            .unwrap();

        assert_eq!(*seen.lock(), vec!["10.0", "50.0"]);
    }

    #[tokio::test]
    async fn test_non_zero_exit_reports_last_stderr_line() {
        let dir = TempDir::new().unwrap();
        let bin = fake_tool(&dir, "echo 'WARNING: noise' >&2\necho 'ERROR: Unsupported URL' >&2\nexit 1");
        let wrapper = YtdlWrapper::new(bin, DEFAULT_FORMAT);

        let err = wrapper.info("https://example.com/nope").await.unwrap_err();
        match err {
            ImporterError::Tool(msg) => assert!(msg.contains("ERROR: Unsupported URL"), "{}", msg),
            other => panic!("Expected Tool, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_binary_is_tool_error() {
        let wrapper = YtdlWrapper::new("/nonexistent/youtube-dl", DEFAULT_FORMAT);
        let err = wrapper.update().await.unwrap_err();
        assert!(matches!(err, ImporterError::Tool(_)));
    }

    #[tokio::test]
    async fn test_resolve_filename_trims_output() {
        let dir = TempDir::new().unwrap();
        let bin = fake_tool(&dir, "echo '/work/1f.mp4'");
        let wrapper = YtdlWrapper::new(bin, DEFAULT_FORMAT);
        let name = wrapper
            .resolve_filename("https://example.com/v", "/work/1f.%(ext)s")
            .await
            .unwrap();
        assert_eq!(name, "/work/1f.mp4");
    }
}
