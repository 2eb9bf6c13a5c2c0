//! Ordered, append-only handler registries for queue transitions.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::errors::ImporterError;
use crate::models::{JobProgress, JobResult, JobSnapshot};

/// Called when a job is pushed. An error vetoes the push.
pub type QueuedHandler = Arc<dyn Fn(&JobSnapshot) -> Result<(), ImporterError> + Send + Sync>;
/// Called the first time a job is pulled.
pub type StartedHandler = Arc<dyn Fn(&JobSnapshot) + Send + Sync>;
/// Called every time a job reports progress.
pub type ProgressHandler = Arc<dyn Fn(&JobSnapshot, &JobProgress) + Send + Sync>;
/// Called once when a job finishes successfully.
pub type FinishedHandler = Arc<dyn Fn(&JobSnapshot, &JobResult) + Send + Sync>;
/// Called once when a job runs out of attempts. The snapshot carries every failure.
pub type FailedHandler = Arc<dyn Fn(&JobSnapshot) + Send + Sync>;

#[derive(Default)]
pub(crate) struct EventHandlers {
    queued: RwLock<Vec<QueuedHandler>>,
    started: RwLock<Vec<StartedHandler>>,
    progress: RwLock<Vec<ProgressHandler>>,
    finished: RwLock<Vec<FinishedHandler>>,
    failed: RwLock<Vec<FailedHandler>>,
}

// Each fire_* iterates a copy of the list so that a handler may register
// further handlers without deadlocking.
impl EventHandlers {
    pub(crate) fn add_queued(&self, handler: QueuedHandler) {
        self.queued.write().push(handler);
    }

    pub(crate) fn add_started(&self, handler: StartedHandler) {
        self.started.write().push(handler);
    }

    pub(crate) fn add_progress(&self, handler: ProgressHandler) {
        self.progress.write().push(handler);
    }

    pub(crate) fn add_finished(&self, handler: FinishedHandler) {
        self.finished.write().push(handler);
    }

    pub(crate) fn add_failed(&self, handler: FailedHandler) {
        self.failed.write().push(handler);
    }

    /// Stops at the first handler that errors.
    pub(crate) fn fire_queued(&self, job: &JobSnapshot) -> Result<(), ImporterError> {
        let handlers = self.queued.read().clone();
        for handler in handlers {
            handler(job)?;
        }
        Ok(())
    }

    pub(crate) fn fire_started(&self, job: &JobSnapshot) {
        let handlers = self.started.read().clone();
        for handler in handlers {
            handler(job);
        }
    }

    pub(crate) fn fire_progress(&self, job: &JobSnapshot, progress: &JobProgress) {
        let handlers = self.progress.read().clone();
        for handler in handlers {
            handler(job, progress);
        }
    }

    pub(crate) fn fire_finished(&self, job: &JobSnapshot, result: &JobResult) {
        let handlers = self.finished.read().clone();
        for handler in handlers {
            handler(job, result);
        }
    }

    pub(crate) fn fire_failed(&self, job: &JobSnapshot) {
        let handlers = self.failed.read().clone();
        for handler in handlers {
            handler(job);
        }
    }
}
