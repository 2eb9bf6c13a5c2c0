//! Client for the creamy-videos upload API.

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, Url};
use serde::Deserialize;
use tokio_util::io::ReaderStream;

use super::{UploadProgressFn, UploadRequest, UploadResult, Uploader};
use crate::errors::ImporterError;

const UPLOAD_PATH: &str = "/api/upload";
const LIST_PATH: &str = "/api/video";
const WATCH_PATH: &str = "/watch/";

#[derive(Debug, Deserialize)]
struct VideoId {
    id: u64,
}

#[derive(Debug, Clone)]
pub struct CreamyVideosClient {
    client: Client,
    host: Url,
}

impl CreamyVideosClient {
    pub fn new(host: &str) -> Result<Self, ImporterError> {
        let host = Url::parse(host)
            .map_err(|e| ImporterError::Validation(format!("invalid creamy-videos host {:?}: {}", host, e)))?;
        Ok(Self {
            client: Client::new(),
            host,
        })
    }

    /// `path` replaces whatever path the configured host carries.
    fn endpoint(&self, path: &str) -> Url {
        let mut url = self.host.clone();
        url.set_path(path);
        url.set_query(None);
        url
    }

    fn watch_result(&self, id: u64) -> UploadResult {
        let id = id.to_string();
        UploadResult {
            url: self.endpoint(&format!("{}{}", WATCH_PATH, id)).to_string(),
            id,
        }
    }
}

#[async_trait]
impl Uploader for CreamyVideosClient {
    async fn upload(
        &self,
        request: UploadRequest,
        on_progress: UploadProgressFn,
    ) -> Result<UploadResult, ImporterError> {
        let file = tokio::fs::File::open(&request.path).await?;
        let total = file.metadata().await?.len();
        let file_name = request
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "video".to_string());

        let mut sent = 0u64;
        let stream = ReaderStream::new(file).map(move |chunk| {
            if let Ok(bytes) = &chunk {
                sent += bytes.len() as u64;
                on_progress(sent, total);
            }
            chunk
        });

        let form = Form::new()
            .text("title", request.title)
            .text("description", request.description)
            .text("tags", request.tags.join(","))
            .part(
                "file",
                Part::stream_with_length(Body::wrap_stream(stream), total).file_name(file_name),
            );

        let url = self.endpoint(UPLOAD_PATH);
        tracing::debug!(%url, path = %request.path.display(), size = total, "Uploading video");
        let response = self
            .client
            .post(url)
            .multipart(form)
            .send()
            .await?
            .error_for_status()?;
        let body: VideoId = response.json().await?;

        Ok(self.watch_result(body.id))
    }

    async fn first_for_tags(&self, tags: &[String]) -> Result<Option<UploadResult>, ImporterError> {
        let joined = tags.join(",");
        let videos: Vec<VideoId> = self
            .client
            .get(self.endpoint(LIST_PATH))
            .query(&[
                ("tags", joined.as_str()),
                ("sort_field", "time_created"),
                ("sort_direction", "asc"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(videos.first().map(|v| self.watch_result(v.id)))
    }
}
