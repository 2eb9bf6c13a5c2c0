pub mod bridge;
pub mod events;
pub mod purger;
pub mod worker;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::clock::{Clock, SystemClock};
use crate::daemon::events::JobEvent;
use crate::daemon::worker::Worker;
use crate::errors::ImporterError;
use crate::idgen::AutoId;
use crate::models::job::validate_job_data;
use crate::models::{ImporterConfig, JobData, JobId};
use crate::queue::JobQueue;
use crate::server::{self, AppState};
use crate::storage::JobRepository;
use crate::tools::{CreamyVideosClient, MediaTool, Uploader, YtdlWrapper};

const CONFIG_DIR_NAME: &str = "creamy-videos-importer";

/// The queue, repository and background tasks of one importer process.
///
/// Every task it starts lives on one tracker and stops pulling work when the
/// shared shutdown token fires.
pub struct Importer {
    queue: JobQueue,
    repo: Arc<JobRepository>,
    ids: Arc<AutoId>,
    event_tx: broadcast::Sender<JobEvent>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
    config: Arc<ImporterConfig>,
}

impl Importer {
    /// Build the queue and repository and wire them together. Nothing runs
    /// until workers are spawned.
    pub fn new(config: Arc<ImporterConfig>, clock: Arc<dyn Clock>) -> Self {
        let tracker = TaskTracker::new();
        let shutdown = CancellationToken::new();
        let queue = JobQueue::new(config.max_attempts, tracker.clone(), shutdown.clone());
        let repo = Arc::new(JobRepository::with_clock(clock));
        let (event_tx, _) = broadcast::channel(config.broadcast_capacity.max(1));

        bridge::attach_repository(&queue, Arc::clone(&repo));
        bridge::attach_logging(&queue);
        bridge::attach_broadcast(&queue, event_tx.clone());

        Self {
            queue,
            repo,
            ids: Arc::new(AutoId::new()),
            event_tx,
            tracker,
            shutdown,
            config,
        }
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    pub fn repo(&self) -> &Arc<JobRepository> {
        &self.repo
    }

    pub fn events(&self) -> &broadcast::Sender<JobEvent> {
        &self.event_tx
    }

    pub fn config(&self) -> &Arc<ImporterConfig> {
        &self.config
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn spawn_workers(&self, tool: Arc<dyn MediaTool>, uploader: Arc<dyn Uploader>) {
        let worker = Worker::new(
            self.queue.clone(),
            Arc::clone(&self.ids),
            tool,
            uploader,
            self.config.work_dir(),
        )
        .with_skip_existing(self.config.skip_existing);
        worker::spawn_workers(
            Arc::new(worker),
            self.config.parallel_workers,
            &self.tracker,
            &self.shutdown,
        );
    }

    pub fn spawn_purger(&self) {
        self.tracker.spawn(purger::run_purger(
            Arc::clone(&self.repo),
            self.config.retention(),
            self.config.purge_interval(),
            self.shutdown.clone(),
        ));
    }

    /// Validate and queue a new import, returning its id.
    pub fn submit(&self, data: JobData) -> Result<JobId, ImporterError> {
        validate_job_data(&data)?;
        let id = self.ids.next();
        self.queue.push(id.clone(), data)?;
        Ok(id)
    }

    /// Forget a job. A job still in flight keeps running but is no longer
    /// tracked.
    pub fn remove(&self, id: &JobId) -> bool {
        let removed = self.repo.remove(id);
        if removed {
            let _ = self.event_tx.send(JobEvent::Removed {
                job_id: id.clone(),
                timestamp: Utc::now(),
            });
        }
        removed
    }

    /// Stop pulling new work and abandon pending handoffs.
    pub fn begin_shutdown(&self) {
        self.shutdown.cancel();
        self.tracker.close();
    }

    /// Wait up to `grace` for in-flight jobs and detached tasks. Returns
    /// whether everything drained in time.
    pub async fn drain(&self, grace: Duration) -> bool {
        tokio::time::timeout(grace, self.tracker.wait()).await.is_ok()
    }

    /// Tasks still running on the tracker.
    pub fn running_tasks(&self) -> usize {
        self.tracker.len()
    }
}

/// CLI overrides for `cvi start`.
#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    pub config_path: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub workers: Option<usize>,
    pub creamy_host: Option<String>,
    pub ytdl_bin: Option<String>,
    pub retention_secs: Option<u64>,
    pub seeds: Vec<String>,
}

fn read_config(path: &Path) -> Result<ImporterConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse config file {}", path.display()))
}

/// Load the ImporterConfig, first match wins:
///   1. `config_path` (must exist)
///   2. `CVI_CONFIG_DIR/config.json`
///   3. platform config dir (`creamy-videos-importer/config.json`)
///   4. defaults
pub fn load_config(config_path: Option<&Path>) -> Result<ImporterConfig> {
    if let Some(path) = config_path {
        if !path.exists() {
            return Err(anyhow::anyhow!("Config file not found: {}", path.display()));
        }
        let config = read_config(path)?;
        tracing::info!("Loaded config from: {}", path.display());
        return Ok(config);
    }

    if let Ok(config_dir) = std::env::var("CVI_CONFIG_DIR") {
        let path = PathBuf::from(config_dir).join("config.json");
        if path.exists() {
            let config = read_config(&path)?;
            tracing::info!("Loaded config from CVI_CONFIG_DIR: {}", path.display());
            return Ok(config);
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        let path = config_dir.join(CONFIG_DIR_NAME).join("config.json");
        if path.exists() {
            let config = read_config(&path)?;
            tracing::info!("Loaded config from: {}", path.display());
            return Ok(config);
        }
    }

    tracing::info!("No config file found, using defaults");
    Ok(ImporterConfig::default())
}

/// Apply `CREAMY_*` overrides, reading variables through `lookup`.
pub fn apply_env_overrides<F>(config: &mut ImporterConfig, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(host) = lookup("CREAMY_VIDEOS_HOST") {
        config.creamy_videos_host = host;
    }
    if let Some(bin) = lookup("CREAMY_YTDL_BIN_PATH") {
        config.ytdl_bin_path = bin;
    }
    if let Some(port) = lookup("CREAMY_IMPORTER_PORT") {
        config.port = port
            .parse()
            .with_context(|| format!("Invalid CREAMY_IMPORTER_PORT: {}", port))?;
    }
    if let Some(workers) = lookup("CREAMY_IMPORTER_WORKERS") {
        config.parallel_workers = workers
            .parse()
            .with_context(|| format!("Invalid CREAMY_IMPORTER_WORKERS: {}", workers))?;
    }
    Ok(())
}

/// File, then environment, then CLI flags.
pub fn resolve_config(options: &StartOptions) -> Result<ImporterConfig> {
    let mut config = load_config(options.config_path.as_deref())?;
    apply_env_overrides(&mut config, |key| {
        std::env::var(key).ok().filter(|v| !v.is_empty())
    })?;

    if let Some(h) = &options.host {
        config.host = h.clone();
    }
    if let Some(p) = options.port {
        config.port = p;
    }
    if let Some(w) = options.workers {
        config.parallel_workers = w;
    }
    if let Some(h) = &options.creamy_host {
        config.creamy_videos_host = h.clone();
    }
    if let Some(b) = &options.ytdl_bin {
        config.ytdl_bin_path = b.clone();
    }
    if let Some(r) = options.retention_secs {
        config.retention_secs = r;
    }

    config.validate()?;
    Ok(config)
}

/// Resolves on Ctrl+C or, on unix, SIGTERM.
async fn wait_for_signal() -> Result<()> {
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl+C signal");
            }
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM signal");
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        tracing::info!("Received Ctrl+C signal");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Daemon bootstrap
// ---------------------------------------------------------------------------

/// Run the importer in the foreground until signalled.
///
/// The first signal stops workers from pulling new jobs and waits up to
/// `shutdown_grace_secs` for jobs in flight. A second signal, or the grace
/// period running out, exits without waiting further.
pub async fn start_daemon(options: StartOptions) -> Result<()> {
    let config = resolve_config(&options)?;

    if let Some(dir) = &config.work_dir {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create work dir {}", dir.display()))?;
    }

    let tool = Arc::new(YtdlWrapper::new(
        config.ytdl_bin_path.clone(),
        config.download_format.clone(),
    ));
    if config.update_tool_on_start {
        tracing::info!(bin = %tool.bin_path(), "Updating download tool");
        if let Err(e) = tool.update().await {
            tracing::warn!(error = %e, "Download tool update failed, continuing");
        }
    }
    let uploader = Arc::new(CreamyVideosClient::new(&config.creamy_videos_host)?);

    let config = Arc::new(config);
    let importer = Arc::new(Importer::new(Arc::clone(&config), Arc::new(SystemClock)));
    importer.spawn_workers(tool, uploader);
    importer.spawn_purger();

    for seed in &options.seeds {
        match importer.submit(JobData::new(seed.clone())) {
            Ok(id) => tracing::info!(job_id = %id, url = %seed, "Queued seed job"),
            Err(e) => tracing::warn!(url = %seed, error = %e, "Failed to queue seed job"),
        }
    }

    let state = Arc::new(AppState::new(Arc::clone(&importer)));
    let router = server::create_router(state);
    let bind_addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;

    tracing::info!(
        workers = config.parallel_workers,
        "Importer started. Listening on http://{}",
        bind_addr
    );

    let server_shutdown = importer.shutdown_token();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                server_shutdown.cancelled().await;
                tracing::info!("HTTP server received shutdown signal");
            })
            .await
        {
            tracing::error!("HTTP server error: {}", e);
        }
    });

    wait_for_signal().await?;

    let grace = config.shutdown_grace();
    tracing::info!(
        running = importer.running_tasks(),
        "Shutting down, waiting up to {}s for jobs in flight",
        grace.as_secs()
    );
    importer.begin_shutdown();

    tokio::select! {
        drained = importer.drain(grace) => {
            if drained {
                tracing::info!("All workers drained");
            } else {
                tracing::warn!(
                    running = importer.running_tasks(),
                    "Grace period elapsed, exiting with jobs still running"
                );
            }
        }
        _ = wait_for_signal() => {
            tracing::warn!("Second signal received, exiting immediately");
        }
    }

    // Live event streams never end on their own.
    server_handle.abort();

    tracing::info!("Importer exited.");
    Ok(())
}

// ===========================================================================
// Tests
// ===========================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::JobStatus;
    use crate::tools::{MockMediaTool, MockUploader};
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn test_config(work_dir: &Path) -> Arc<ImporterConfig> {
        Arc::new(ImporterConfig {
            work_dir: Some(work_dir.to_path_buf()),
            ..ImporterConfig::default()
        })
    }

    async fn wait_until<F: Fn() -> bool>(check: F) {
        for _ in 0..200 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    // =======================================================================
    // Config loading
    // =======================================================================

    #[test]
    fn test_config_loading_from_file() {
        let tmp_dir = TempDir::new().expect("create temp dir");
        let config_path = tmp_dir.path().join("config.json");
        std::fs::write(&config_path, r#"{"port": 9999, "parallel_workers": 8}"#)
            .expect("write config");

        let config = load_config(Some(&config_path)).expect("load config");
        assert_eq!(config.port, 9999);
        assert_eq!(config.parallel_workers, 8);
        // Other fields should be defaults
        assert_eq!(config.max_attempts, 2);
    }

    #[test]
    fn test_config_loading_nonexistent_explicit_path_fails() {
        let result = load_config(Some(Path::new("/nonexistent/config.json")));
        assert!(result.is_err(), "Should fail for nonexistent explicit path");
    }

    #[test]
    fn test_config_loading_invalid_json_fails_with_path() {
        let tmp_dir = TempDir::new().expect("create temp dir");
        let config_path = tmp_dir.path().join("config.json");
        std::fs::write(&config_path, "{ not json").expect("write config");

        let err = load_config(Some(&config_path)).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse config file"));
    }

    #[test]
    fn test_env_overrides_apply() {
        let env: HashMap<&str, &str> = [
            ("CREAMY_VIDEOS_HOST", "http://videos.local/"),
            ("CREAMY_YTDL_BIN_PATH", "/usr/bin/yt-dlp"),
            ("CREAMY_IMPORTER_PORT", "4100"),
            ("CREAMY_IMPORTER_WORKERS", "5"),
        ]
        .into_iter()
        .collect();
        let mut config = ImporterConfig::default();
        apply_env_overrides(&mut config, |k| env.get(k).map(|v| v.to_string())).unwrap();

        assert_eq!(config.creamy_videos_host, "http://videos.local/");
        assert_eq!(config.ytdl_bin_path, "/usr/bin/yt-dlp");
        assert_eq!(config.port, 4100);
        assert_eq!(config.parallel_workers, 5);
    }

    #[test]
    fn test_env_override_with_bad_port_fails() {
        let mut config = ImporterConfig::default();
        let result = apply_env_overrides(&mut config, |k| {
            (k == "CREAMY_IMPORTER_PORT").then(|| "http".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_resolve_config_applies_flags_and_validates() {
        let tmp_dir = TempDir::new().expect("create temp dir");
        let config_path = tmp_dir.path().join("config.json");
        std::fs::write(&config_path, "{}").expect("write config");

        let options = StartOptions {
            config_path: Some(config_path.clone()),
            port: Some(4321),
            retention_secs: Some(60),
            ..StartOptions::default()
        };
        let config = resolve_config(&options).expect("resolve");
        assert_eq!(config.port, 4321);
        assert_eq!(config.retention_secs, 60);

        let options = StartOptions {
            config_path: Some(config_path),
            workers: Some(0),
            ..StartOptions::default()
        };
        assert!(resolve_config(&options).is_err());
    }

    // =======================================================================
    // Importer
    // =======================================================================

    #[tokio::test]
    async fn test_submit_rejects_invalid_data() {
        let dir = TempDir::new().unwrap();
        let importer = Importer::new(test_config(dir.path()), Arc::new(SystemClock));
        let err = importer.submit(JobData::new("")).unwrap_err();
        assert!(matches!(err, ImporterError::Validation(_)));
        assert!(importer.repo().is_empty());
    }

    #[tokio::test]
    async fn test_importer_runs_job_to_completion() {
        let dir = TempDir::new().unwrap();
        let importer = Importer::new(test_config(dir.path()), Arc::new(SystemClock));
        let uploader = Arc::new(MockUploader::new());
        importer.spawn_workers(Arc::new(MockMediaTool::new()), Arc::clone(&uploader) as Arc<dyn Uploader>);

        let id = importer.submit(JobData::new("https://example.com/v")).unwrap();
        let repo = Arc::clone(importer.repo());
        let check_id = id.clone();
        wait_until(move || {
            repo.get(&check_id).map(|r| r.status) == Some(JobStatus::Finished)
        })
        .await;

        assert_eq!(uploader.uploads().len(), 1);
        importer.begin_shutdown();
        assert!(importer.drain(Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn test_remove_publishes_event() {
        let dir = TempDir::new().unwrap();
        let importer = Importer::new(test_config(dir.path()), Arc::new(SystemClock));
        let mut rx = importer.events().subscribe();

        let id = importer.submit(JobData::new("https://example.com/v")).unwrap();
        assert!(importer.remove(&id));
        assert!(!importer.remove(&id));

        let mut names = Vec::new();
        while let Ok(event) = rx.try_recv() {
            names.push(event.name());
        }
        assert_eq!(names, vec!["queued", "removed"]);
    }

    #[tokio::test]
    async fn test_shutdown_abandons_waiting_jobs_and_drains() {
        let dir = TempDir::new().unwrap();
        let importer = Importer::new(test_config(dir.path()), Arc::new(SystemClock));
        for n in 0..3 {
            importer
                .submit(JobData::new(format!("https://example.com/{}", n)))
                .unwrap();
        }
        importer.spawn_purger();

        importer.begin_shutdown();
        assert!(importer.drain(Duration::from_secs(5)).await);
        assert_eq!(importer.queue().pending_handoffs(), 0);
        assert_eq!(importer.repo().len(), 3);
    }
}
