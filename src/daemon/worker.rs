use std::path::{Path, PathBuf};
use std::sync::Arc;

use humansize::{format_size, DECIMAL};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::errors::ImporterError;
use crate::idgen::AutoId;
use crate::models::{JobData, JobFailure, JobResult, ParentPlaylist};
use crate::queue::{JobQueue, QueuedJob};
use crate::tools::{
    DownloadProgressFn, Entry, MediaInfo, MediaTool, Playlist, UploadProgressFn, UploadRequest,
    Uploader,
};

pub const IMPORTER_TAG: &str = "importer:cvi";

/// Drives pulled jobs through the media tool and the uploader.
pub struct Worker {
    queue: JobQueue,
    ids: Arc<AutoId>,
    tool: Arc<dyn MediaTool>,
    uploader: Arc<dyn Uploader>,
    work_dir: PathBuf,
    skip_existing: bool,
}

impl Worker {
    pub fn new(
        queue: JobQueue,
        ids: Arc<AutoId>,
        tool: Arc<dyn MediaTool>,
        uploader: Arc<dyn Uploader>,
        work_dir: PathBuf,
    ) -> Self {
        Self {
            queue,
            ids,
            tool,
            uploader,
            work_dir,
            skip_existing: false,
        }
    }

    /// Finish jobs whose video was already uploaded instead of importing it again.
    pub fn with_skip_existing(mut self, skip_existing: bool) -> Self {
        self.skip_existing = skip_existing;
        self
    }

    /// Pull and process jobs until `cancel` fires. A job already in progress
    /// is always carried to its end.
    pub async fn run(&self, worker_id: usize, cancel: CancellationToken) {
        tracing::debug!(worker_id, "Worker started");
        while let Some(job) = self.queue.pull(&cancel).await {
            self.process_job(job).await;
        }
        tracing::debug!(worker_id, "Worker stopped");
    }

    pub async fn process_job(&self, job: QueuedJob) {
        let data = job.data().clone();

        job.progress("Fetching info");
        let info = match self.tool.info(&data.url).await {
            Ok(info) => info,
            Err(e) => {
                job.progress("Failed fetching info");
                job.failed(e.into());
                return;
            }
        };

        match info {
            MediaInfo::Playlist(playlist) => self.fan_out(job, &data, playlist),
            MediaInfo::Entry(entry) => self.import_entry(job, &data, entry).await,
        }
    }

    fn fan_out(&self, job: QueuedJob, data: &JobData, playlist: Playlist) {
        // Some playlists list themselves; never follow a playlist found
        // through another playlist.
        if let Some(parent) = &data.parent_playlist {
            job.progress("Job triggered by playlist import is another playlist! Aborting");
            job.failed_permanently(
                ImporterError::PlaylistCycle {
                    parent: parent.id.clone(),
                    playlist: playlist.id.clone(),
                }
                .into(),
            );
            return;
        }

        let parent = ParentPlaylist {
            id: playlist.id.clone(),
            extractor: playlist.extractor.clone(),
        };
        let mut queued = 0usize;
        for entry in &playlist.entries {
            let Some(url) = entry.best_url() else {
                tracing::warn!(job_id = %job.id(), playlist = %playlist.id, "Skipping playlist entry without a URL");
                continue;
            };
            let child = JobData::new(url)
                .with_tags(data.tags.clone())
                .with_parent(parent.clone());
            match self.queue.push(self.ids.next(), child) {
                Ok(()) => queued += 1,
                Err(e) => {
                    tracing::warn!(job_id = %job.id(), error = %e, "Failed to queue playlist entry")
                }
            }
        }
        tracing::info!(job_id = %job.id(), playlist = %playlist.id, queued, "Queued playlist entries");

        job.progress("Queued child videos!");
        job.finished(JobResult {
            title: format!("Playlist {}", playlist.id),
            url: None,
        });
    }

    async fn import_entry(&self, job: QueuedJob, data: &JobData, entry: Entry) {
        let entry_url = entry.best_url().unwrap_or(&data.url).to_string();
        let tags = build_tags(data, &entry);
        let title = entry
            .title()
            .map(str::to_string)
            .unwrap_or_else(|| format!("Import of {}", data.url));

        if self.skip_existing {
            if let Some(existing) = self.find_existing(&job, &entry).await {
                job.progress("Already imported");
                job.finished(JobResult {
                    title,
                    url: Some(existing),
                });
                return;
            }
        }

        job.progress("Fetching output filename");
        let template = self.work_dir.join(format!("{}.%(ext)s", job.id()));
        let output = match self
            .tool
            .resolve_filename(&entry_url, &template.to_string_lossy())
            .await
        {
            Ok(output) => output,
            Err(e) => {
                job.progress("Failed fetching output filename");
                job.failed(e.into());
                return;
            }
        };
        let _cleanup = DownloadFiles::claim(&output).await;

        job.progress("Starting download");
        let reporter = job.reporter();
        let on_download: DownloadProgressFn = Arc::new(move |p| {
            reporter.report(format!(
                "Download {}% complete (downloaded {} / {} @ {}/s)",
                p.percent,
                format_size(p.downloaded, DECIMAL),
                format_size(p.total, DECIMAL),
                format_size(p.speed, DECIMAL),
            ));
        });
        if let Err(e) = self.tool.download(&entry_url, &output, on_download).await {
            job.progress("Failed downloading");
            job.failed(e.into());
            return;
        }

        let mut description = format!("Original URL: {}", data.url);
        if let Some(extra) = entry.description() {
            description.push_str("\n\n");
            description.push_str(extra);
        }

        job.progress("Uploading");
        let reporter = job.reporter();
        let on_upload: UploadProgressFn = Arc::new(move |sent, total| {
            let percent = if total == 0 {
                100.0
            } else {
                sent as f64 / total as f64 * 100.0
            };
            reporter.report(format!(
                "Upload {:.1}% complete (uploaded {} / {})",
                percent,
                format_size(sent, DECIMAL),
                format_size(total, DECIMAL),
            ));
        });
        let request = UploadRequest {
            path: PathBuf::from(&output),
            title: title.clone(),
            description,
            tags,
        };
        match self.uploader.upload(request, on_upload).await {
            Ok(uploaded) => {
                job.progress("Uploaded!");
                job.finished(JobResult {
                    title,
                    url: Some(uploaded.url),
                });
            }
            Err(e) => {
                job.progress("Failed uploading");
                job.failed(JobFailure::from(e));
            }
        }
    }

    /// URL of an earlier upload of this entry. Lookup errors are logged and
    /// treated as "not uploaded".
    async fn find_existing(&self, job: &QueuedJob, entry: &Entry) -> Option<String> {
        let tag = id_tag(entry)?;
        match self.uploader.first_for_tags(&[tag]).await {
            Ok(found) => found.map(|r| r.url),
            Err(e) => {
                tracing::warn!(job_id = %job.id(), error = %e, "Existing video lookup failed");
                None
            }
        }
    }
}

fn id_tag(entry: &Entry) -> Option<String> {
    Some(format!("{}-id:{}", entry.extractor()?, entry.id()?))
}

/// Tags for an uploaded entry: the submitted tags followed by provenance tags.
pub fn build_tags(data: &JobData, entry: &Entry) -> Vec<String> {
    let mut tags = data.tags.clone();
    tags.push(IMPORTER_TAG.to_string());

    if let Some(extractor) = entry.extractor() {
        tags.push(format!("extractor:{}", extractor));
        if let Some(channel) = entry.channel_id() {
            tags.push(format!("{}-channel:{}", extractor, channel));
        }
        if let Some(uploader) = entry.uploader_id() {
            tags.push(format!("{}-uploader:{}", extractor, uploader));
        }
        if let Some(id) = entry.id() {
            tags.push(format!("{}-id:{}", extractor, id));
        }
    }

    if let Some(parent) = &data.parent_playlist {
        match parent.extractor.as_deref().filter(|e| !e.is_empty()) {
            Some(extractor) => tags.push(format!(
                "{}-playlist:{}",
                extractor.replace(":playlist", ""),
                parent.id
            )),
            None => tags.push(format!("imported-playlist:{}", parent.id)),
        }
    }

    tags
}

/// Removes a download target and its `.part` file now and again on drop.
struct DownloadFiles {
    paths: [PathBuf; 2],
}

impl DownloadFiles {
    async fn claim(output: &str) -> Self {
        let files = Self {
            paths: [PathBuf::from(output), PathBuf::from(format!("{}.part", output))],
        };
        for path in &files.paths {
            log_removal(path, tokio::fs::remove_file(path).await);
        }
        files
    }
}

// Drop cannot await; unlinking two paths is a single short syscall each.
impl Drop for DownloadFiles {
    fn drop(&mut self) {
        for path in &self.paths {
            log_removal(path, std::fs::remove_file(path));
        }
    }
}

fn log_removal(path: &Path, result: std::io::Result<()>) {
    match result {
        Ok(()) => tracing::debug!(path = %path.display(), "Removed download file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to remove download file"),
    }
}

/// Start `count` workers on `tracker`, all stopping when `cancel` fires.
pub fn spawn_workers(
    worker: Arc<Worker>,
    count: usize,
    tracker: &TaskTracker,
    cancel: &CancellationToken,
) {
    for worker_id in 0..count {
        let worker = Arc::clone(&worker);
        let cancel = cancel.clone();
        tracker.spawn(async move {
            worker.run(worker_id, cancel).await;
        });
    }
    tracing::info!(count, "Workers started");
}
