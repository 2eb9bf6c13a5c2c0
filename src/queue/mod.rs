//! Dual-lane handoff queue.
//!
//! Jobs are offered on one of two zero-buffer lanes: `normal` for fresh work
//! and `priority` for retries. An offer only completes once a worker has
//! taken the job, so producers get backpressure, but each offer runs on its
//! own task so `push` and `failed` never block their caller. Those tasks,
//! and the tasks firing terminal events, live on a [`TaskTracker`] so that
//! shutdown can wait for them. Pending offers give up when the queue's
//! shutdown token is cancelled; an abandoned retry ends in a failed event.

pub mod handlers;

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::errors::ImporterError;
use crate::models::{JobData, JobFailure, JobId, JobProgress, JobResult, JobSnapshot};
use handlers::EventHandlers;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 2;

/// How long a shut-down offer waits for pullers to release the lanes.
const RECLAIM_WAIT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lane {
    Normal,
    Priority,
}

/// Retry bookkeeping for a job between push and its terminal event.
///
/// Owned by exactly one party at a time: the offering task, the lane, or the
/// worker holding the [`QueuedJob`].
#[derive(Debug)]
struct InFlightJob {
    id: JobId,
    data: JobData,
    attempts: u32,
    max_attempts: u32,
    previously_pulled: bool,
    failures: Vec<JobFailure>,
}

impl InFlightJob {
    fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            id: self.id.clone(),
            data: self.data.clone(),
            attempts: self.attempts,
            failures: self.failures.clone(),
        }
    }
}

struct Handoff {
    job: InFlightJob,
    taken: oneshot::Sender<()>,
}

struct Receivers {
    priority: mpsc::Receiver<Handoff>,
    normal: mpsc::Receiver<Handoff>,
}

struct QueueInner {
    handlers: EventHandlers,
    priority_tx: mpsc::Sender<Handoff>,
    normal_tx: mpsc::Sender<Handoff>,
    receivers: Mutex<Receivers>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
    max_attempts: u32,
    pending: AtomicUsize,
}

impl QueueInner {
    /// Offer `job` on `lane` from a tracked task.
    fn offer(self: &Arc<Self>, lane: Lane, job: InFlightJob) {
        self.pending.fetch_add(1, Ordering::SeqCst);
        let inner = Arc::clone(self);
        self.tracker.spawn(async move {
            inner.hand_off(lane, job).await;
            inner.pending.fetch_sub(1, Ordering::SeqCst);
        });
    }

    async fn hand_off(&self, lane: Lane, job: InFlightJob) {
        let id = job.id.clone();
        let tx = match lane {
            Lane::Priority => &self.priority_tx,
            Lane::Normal => &self.normal_tx,
        };

        let permit = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => None,
            permit = tx.reserve() => permit.ok(),
        };
        let Some(permit) = permit else {
            self.abandon(lane, job);
            return;
        };

        let (taken_tx, taken_rx) = oneshot::channel();
        permit.send(Handoff { job, taken: taken_tx });
        let delivered = tokio::select! {
            biased;
            taken = taken_rx => taken.is_ok(),
            _ = self.shutdown.cancelled() => false,
        };

        if delivered {
            tracing::debug!(job_id = %id, lane = ?lane, "Job handed to a worker");
        } else {
            self.reclaim(lane).await;
        }
    }

    /// Take back whatever is still parked on `lane` after shutdown.
    async fn reclaim(&self, lane: Lane) {
        let Ok(mut receivers) = tokio::time::timeout(RECLAIM_WAIT, self.receivers.lock()).await
        else {
            tracing::warn!(lane = ?lane, "Lane still held at shutdown, leaving parked job");
            return;
        };
        let rx = match lane {
            Lane::Priority => &mut receivers.priority,
            Lane::Normal => &mut receivers.normal,
        };
        while let Ok(Handoff { job, .. }) = rx.try_recv() {
            self.abandon(lane, job);
        }
    }

    /// Drop a job no worker will take. A job that already started gets its
    /// terminal failed event so its record does not stay `started`.
    fn abandon(&self, lane: Lane, job: InFlightJob) {
        if job.previously_pulled {
            tracing::warn!(
                job_id = %job.id,
                lane = ?lane,
                attempts = job.attempts,
                "Queue shut down before the retry was taken, failing job"
            );
            self.handlers.fire_failed(&job.snapshot());
        } else {
            tracing::warn!(job_id = %job.id, lane = ?lane, "Queue shut down before a worker took the job");
        }
    }

    fn finish_detached(self: &Arc<Self>, job: InFlightJob, result: JobResult) {
        let inner = Arc::clone(self);
        self.tracker.spawn(async move {
            inner.handlers.fire_finished(&job.snapshot(), &result);
        });
    }

    fn fail_detached(self: &Arc<Self>, job: InFlightJob) {
        let inner = Arc::clone(self);
        self.tracker.spawn(async move {
            inner.handlers.fire_failed(&job.snapshot());
        });
    }
}

/// Handle to the job queue. Cloning is cheap and every clone refers to the
/// same lanes and handler registries.
#[derive(Clone)]
pub struct JobQueue {
    inner: Arc<QueueInner>,
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new(
            DEFAULT_MAX_ATTEMPTS,
            TaskTracker::new(),
            CancellationToken::new(),
        )
    }
}

impl JobQueue {
    /// Create a queue whose detached tasks are spawned on `tracker` and
    /// whose pending offers are abandoned once `shutdown` is cancelled.
    pub fn new(max_attempts: u32, tracker: TaskTracker, shutdown: CancellationToken) -> Self {
        let (priority_tx, priority_rx) = mpsc::channel(1);
        let (normal_tx, normal_rx) = mpsc::channel(1);
        Self {
            inner: Arc::new(QueueInner {
                handlers: EventHandlers::default(),
                priority_tx,
                normal_tx,
                receivers: Mutex::new(Receivers {
                    priority: priority_rx,
                    normal: normal_rx,
                }),
                tracker,
                shutdown,
                max_attempts: max_attempts.max(1),
                pending: AtomicUsize::new(0),
            }),
        }
    }

    pub fn on_queued<F>(&self, handler: F)
    where
        F: Fn(&JobSnapshot) -> Result<(), ImporterError> + Send + Sync + 'static,
    {
        self.inner.handlers.add_queued(Arc::new(handler));
    }

    pub fn on_started<F>(&self, handler: F)
    where
        F: Fn(&JobSnapshot) + Send + Sync + 'static,
    {
        self.inner.handlers.add_started(Arc::new(handler));
    }

    pub fn on_progress<F>(&self, handler: F)
    where
        F: Fn(&JobSnapshot, &JobProgress) + Send + Sync + 'static,
    {
        self.inner.handlers.add_progress(Arc::new(handler));
    }

    pub fn on_finished<F>(&self, handler: F)
    where
        F: Fn(&JobSnapshot, &JobResult) + Send + Sync + 'static,
    {
        self.inner.handlers.add_finished(Arc::new(handler));
    }

    pub fn on_failed<F>(&self, handler: F)
    where
        F: Fn(&JobSnapshot) + Send + Sync + 'static,
    {
        self.inner.handlers.add_failed(Arc::new(handler));
    }

    /// Queue a new job.
    ///
    /// Queued handlers run before this returns; if one of them fails (for
    /// example the repository already knows `id`) the job is not queued and
    /// the error is returned. Must be called from within a Tokio runtime.
    pub fn push(&self, id: JobId, data: JobData) -> Result<(), ImporterError> {
        let job = InFlightJob {
            id,
            data,
            attempts: 0,
            max_attempts: self.inner.max_attempts,
            previously_pulled: false,
            failures: Vec::new(),
        };
        self.inner.handlers.fire_queued(&job.snapshot())?;
        self.inner.offer(Lane::Normal, job);
        Ok(())
    }

    /// Wait for the next job, preferring the priority lane.
    ///
    /// Returns `None` once `cancel` is cancelled, which callers should treat
    /// as "stop working".
    pub async fn pull(&self, cancel: &CancellationToken) -> Option<QueuedJob> {
        if cancel.is_cancelled() {
            return None;
        }

        let mut receivers = tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            guard = self.inner.receivers.lock() => guard,
        };
        let Receivers { priority, normal } = &mut *receivers;

        // A ready retry always wins over a ready fresh job.
        let handoff = match priority.try_recv() {
            Ok(handoff) => handoff,
            Err(_) => tokio::select! {
                biased;
                _ = cancel.cancelled() => return None,
                Some(handoff) = priority.recv() => handoff,
                Some(handoff) = normal.recv() => handoff,
                else => return None,
            },
        };
        drop(receivers);

        let Handoff { mut job, taken } = handoff;
        let _ = taken.send(());

        if !job.previously_pulled {
            job.previously_pulled = true;
            self.inner.handlers.fire_started(&job.snapshot());
        }

        Some(QueuedJob {
            queue: Arc::clone(&self.inner),
            job,
        })
    }

    /// Offers that are waiting for a worker to take them.
    ///
    /// Every push and retry holds one task until a worker pulls it, so this
    /// grows without bound when producers outpace the workers.
    pub fn pending_handoffs(&self) -> usize {
        self.inner.pending.load(Ordering::SeqCst)
    }

    pub fn max_attempts(&self) -> u32 {
        self.inner.max_attempts
    }

    /// Tracker holding every task the queue has detached.
    pub fn tracker(&self) -> &TaskTracker {
        &self.inner.tracker
    }

    /// Abandon pending offers and wait for every detached task to finish.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
    }
}

/// A job pulled from the queue. Consumed by exactly one of
/// [`finished`](Self::finished), [`failed`](Self::failed) or
/// [`failed_permanently`](Self::failed_permanently).
pub struct QueuedJob {
    queue: Arc<QueueInner>,
    job: InFlightJob,
}

impl fmt::Debug for QueuedJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuedJob").field("job", &self.job).finish()
    }
}

impl QueuedJob {
    pub fn id(&self) -> &JobId {
        &self.job.id
    }

    pub fn data(&self) -> &JobData {
        &self.job.data
    }

    /// Failed attempts so far.
    pub fn attempts(&self) -> u32 {
        self.job.attempts
    }

    pub fn failures(&self) -> &[JobFailure] {
        &self.job.failures
    }

    pub fn progress(&self, progress: impl Into<JobProgress>) {
        let progress = progress.into();
        self.queue
            .handlers
            .fire_progress(&self.job.snapshot(), &progress);
    }

    /// Detached progress handle for callbacks that outlive a borrow of the job.
    pub fn reporter(&self) -> ProgressReporter {
        ProgressReporter {
            queue: Arc::clone(&self.queue),
            snapshot: Arc::new(self.job.snapshot()),
        }
    }

    pub fn finished(self, result: JobResult) {
        let Self { queue, job } = self;
        queue.finish_detached(job, result);
    }

    /// Record a failure and retry on the priority lane while attempts
    /// remain; otherwise fire the terminal failed event.
    pub fn failed(self, failure: JobFailure) {
        let Self { queue, mut job } = self;
        job.failures.push(failure);
        job.attempts += 1;

        if job.attempts < job.max_attempts {
            tracing::info!(
                job_id = %job.id,
                attempts = job.attempts,
                max_attempts = job.max_attempts,
                "Job failed, retrying with priority"
            );
            queue.offer(Lane::Priority, job);
        } else {
            queue.fail_detached(job);
        }
    }

    /// Record a failure that retrying cannot fix and fire the terminal
    /// failed event immediately.
    pub fn failed_permanently(self, failure: JobFailure) {
        let Self { queue, mut job } = self;
        job.failures.push(failure);
        job.attempts += 1;
        queue.fail_detached(job);
    }
}

/// Reports progress for one pulled job. Cheap to clone.
#[derive(Clone)]
pub struct ProgressReporter {
    queue: Arc<QueueInner>,
    snapshot: Arc<JobSnapshot>,
}

impl ProgressReporter {
    pub fn report(&self, progress: impl Into<JobProgress>) {
        let progress = progress.into();
        self.queue.handlers.fire_progress(&self.snapshot, &progress);
    }
}
