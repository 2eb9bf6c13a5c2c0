//! External collaborators driven by the workers: the metadata/download tool
//! and the upload API.

pub mod creamy;
pub mod mock;
pub mod ytdl;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::ImporterError;

pub use creamy::CreamyVideosClient;
pub use mock::{MockMediaTool, MockUploader};
pub use ytdl::info::{Entry, MediaInfo, Playlist};
pub use ytdl::progress::DownloadProgress;
pub use ytdl::YtdlWrapper;

/// Receives parsed download progress.
pub type DownloadProgressFn = Arc<dyn Fn(DownloadProgress) + Send + Sync>;
/// Receives `(bytes_sent, total_bytes)` while uploading.
pub type UploadProgressFn = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Fetches metadata for and downloads media URLs.
#[async_trait]
pub trait MediaTool: Send + Sync {
    async fn info(&self, url: &str) -> Result<MediaInfo, ImporterError>;

    /// Resolve the file the tool would write for `url` given an output
    /// template such as `/work/1f.%(ext)s`.
    async fn resolve_filename(&self, url: &str, template: &str) -> Result<String, ImporterError>;

    async fn download(
        &self,
        url: &str,
        output: &str,
        on_progress: DownloadProgressFn,
    ) -> Result<(), ImporterError>;

    /// Self-update the tool.
    async fn update(&self) -> Result<(), ImporterError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct UploadRequest {
    pub path: PathBuf,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadResult {
    pub id: String,
    pub url: String,
}

/// Stores downloaded videos somewhere durable.
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(
        &self,
        request: UploadRequest,
        on_progress: UploadProgressFn,
    ) -> Result<UploadResult, ImporterError>;

    /// Oldest existing video carrying every one of `tags`, if any.
    async fn first_for_tags(&self, tags: &[String]) -> Result<Option<UploadResult>, ImporterError>;
}
