//! Scriptable in-memory collaborators.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{
    DownloadProgress, DownloadProgressFn, Entry, MediaInfo, MediaTool, Playlist,
    UploadProgressFn, UploadRequest, UploadResult, Uploader,
};
use crate::errors::ImporterError;

/// Media tool answering from a table of URLs.
///
/// Unknown URLs resolve to a single video whose page URL is the URL itself.
/// Downloads write an empty file at the requested output path.
#[derive(Default)]
pub struct MockMediaTool {
    infos: Mutex<HashMap<String, MediaInfo>>,
    info_failures: Mutex<HashMap<String, usize>>,
    download_failures: Mutex<HashMap<String, usize>>,
    progress: Vec<DownloadProgress>,
    info_calls: Mutex<Vec<String>>,
    downloads: Mutex<Vec<String>>,
    updates: AtomicUsize,
}

impl MockMediaTool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entry(self, url: &str, entry: Entry) -> Self {
        self.infos
            .lock()
            .insert(url.to_string(), MediaInfo::Entry(entry));
        self
    }

    pub fn with_playlist(self, url: &str, playlist: Playlist) -> Self {
        self.infos
            .lock()
            .insert(url.to_string(), MediaInfo::Playlist(playlist));
        self
    }

    /// Fail the next `times` metadata fetches for `url`.
    pub fn failing_info(self, url: &str, times: usize) -> Self {
        self.info_failures.lock().insert(url.to_string(), times);
        self
    }

    /// Fail the next `times` downloads of `url`.
    pub fn failing_download(self, url: &str, times: usize) -> Self {
        self.download_failures.lock().insert(url.to_string(), times);
        self
    }

    /// Progress reports emitted by every download.
    pub fn with_progress(mut self, progress: Vec<DownloadProgress>) -> Self {
        self.progress = progress;
        self
    }

    pub fn info_calls(&self) -> Vec<String> {
        self.info_calls.lock().clone()
    }

    pub fn downloads(&self) -> Vec<String> {
        self.downloads.lock().clone()
    }

    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    fn take_failure(failures: &Mutex<HashMap<String, usize>>, url: &str) -> bool {
        let mut failures = failures.lock();
        match failures.get_mut(url) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl MediaTool for MockMediaTool {
    async fn info(&self, url: &str) -> Result<MediaInfo, ImporterError> {
        self.info_calls.lock().push(url.to_string());
        if Self::take_failure(&self.info_failures, url) {
            return Err(ImporterError::Tool(format!("mock info failure for {}", url)));
        }
        let known = self.infos.lock().get(url).cloned();
        Ok(known.unwrap_or_else(|| {
            MediaInfo::Entry(Entry {
                title: Some(format!("Video at {}", url)),
                webpage_url: Some(url.to_string()),
                ..Entry::default()
            })
        }))
    }

    async fn resolve_filename(&self, _url: &str, template: &str) -> Result<String, ImporterError> {
        Ok(template.replace("%(ext)s", "mp4"))
    }

    async fn download(
        &self,
        url: &str,
        output: &str,
        on_progress: DownloadProgressFn,
    ) -> Result<(), ImporterError> {
        self.downloads.lock().push(url.to_string());
        if Self::take_failure(&self.download_failures, url) {
            return Err(ImporterError::Tool(format!("mock download failure for {}", url)));
        }
        for progress in &self.progress {
            on_progress(progress.clone());
        }
        tokio::fs::write(output, b"").await?;
        Ok(())
    }

    async fn update(&self) -> Result<(), ImporterError> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Uploader that records every request and hands out sequential ids.
#[derive(Default)]
pub struct MockUploader {
    uploads: Mutex<Vec<UploadRequest>>,
    existing: Mutex<HashMap<String, UploadResult>>,
    failures: AtomicUsize,
    next_id: AtomicU64,
}

impl MockUploader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `times` uploads.
    pub fn failing(self, times: usize) -> Self {
        self.failures.store(times, Ordering::SeqCst);
        self
    }

    /// Pretend a video tagged `tag` already exists.
    pub fn with_existing(self, tag: &str, result: UploadResult) -> Self {
        self.existing.lock().insert(tag.to_string(), result);
        self
    }

    pub fn uploads(&self) -> Vec<UploadRequest> {
        self.uploads.lock().clone()
    }

    pub fn watch_url(id: u64) -> String {
        format!("http://creamy.test/watch/{}", id)
    }
}

#[async_trait]
impl Uploader for MockUploader {
    async fn upload(
        &self,
        request: UploadRequest,
        on_progress: UploadProgressFn,
    ) -> Result<UploadResult, ImporterError> {
        let failed = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(ImporterError::Upload("mock upload failure".to_string()));
        }

        on_progress(50, 100);
        on_progress(100, 100);
        self.uploads.lock().push(request);

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(UploadResult {
            id: id.to_string(),
            url: Self::watch_url(id),
        })
    }

    async fn first_for_tags(&self, tags: &[String]) -> Result<Option<UploadResult>, ImporterError> {
        let existing = self.existing.lock();
        Ok(tags.iter().find_map(|tag| existing.get(tag).cloned()))
    }
}
