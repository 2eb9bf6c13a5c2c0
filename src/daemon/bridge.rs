//! Handlers that mirror queue transitions into the repository, the log and
//! the live event stream.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::broadcast;

use crate::daemon::events::JobEvent;
use crate::models::{JobStatus, JobSnapshot};
use crate::queue::JobQueue;
use crate::storage::JobRepository;

/// Keep one repository record per job in step with the queue.
///
/// The queued handler inserts the record, so a duplicate id makes `push`
/// fail with the repository's Conflict.
pub fn attach_repository(queue: &JobQueue, repo: Arc<JobRepository>) {
    let r = Arc::clone(&repo);
    queue.on_queued(move |job| {
        let now = r.now();
        r.store(&job.id, |record| {
            record.created_at = Some(now);
            record.data = job.data.clone();
        })
    });

    let r = Arc::clone(&repo);
    queue.on_started(move |job| {
        let now = r.now();
        update_or_log(&r, job, |record| {
            record.advance(JobStatus::Started, now);
        });
    });

    let r = Arc::clone(&repo);
    queue.on_progress(move |job, progress| {
        update_or_log(&r, job, |record| record.progress = progress.clone());
    });

    let r = Arc::clone(&repo);
    queue.on_finished(move |job, result| {
        let now = r.now();
        update_or_log(&r, job, |record| {
            record.advance(JobStatus::Finished, now);
            record.failures = job.failures.clone();
            record.result = Some(result.clone());
        });
    });

    queue.on_failed(move |job| {
        let now = repo.now();
        update_or_log(&repo, job, |record| {
            record.advance(JobStatus::Failed, now);
            record.failures = job.failures.clone();
        });
    });
}

fn update_or_log<F>(repo: &JobRepository, job: &JobSnapshot, mutate: F)
where
    F: FnOnce(&mut crate::models::JobRecord),
{
    // The record may have been removed through the API while the job ran.
    if let Err(e) = repo.update(&job.id, mutate) {
        tracing::debug!(job_id = %job.id, error = %e, "Job record not updated");
    }
}

pub fn attach_logging(queue: &JobQueue) {
    queue.on_queued(|job| {
        tracing::info!(job_id = %job.id, url = %job.data.url, "Job queued");
        Ok(())
    });
    queue.on_started(|job| {
        tracing::info!(job_id = %job.id, "Job started");
    });
    queue.on_progress(|job, progress| {
        tracing::debug!(job_id = %job.id, progress = %progress, "Job progress");
    });
    queue.on_finished(|job, result| {
        tracing::info!(
            job_id = %job.id,
            title = %result.title,
            url = result.url.as_deref().unwrap_or(""),
            failures = job.failures.len(),
            "Job finished"
        );
    });
    queue.on_failed(|job| {
        let last = job.failures.last().map(|f| f.error.as_str()).unwrap_or("");
        tracing::warn!(
            job_id = %job.id,
            attempts = job.attempts,
            error = %last,
            "Job failed"
        );
    });
}

/// Publish every transition on `tx`. Sends with no subscribers are dropped.
pub fn attach_broadcast(queue: &JobQueue, tx: broadcast::Sender<JobEvent>) {
    let t = tx.clone();
    queue.on_queued(move |job| {
        let _ = t.send(JobEvent::Queued {
            job_id: job.id.clone(),
            url: job.data.url.clone(),
            timestamp: Utc::now(),
        });
        Ok(())
    });

    let t = tx.clone();
    queue.on_started(move |job| {
        let _ = t.send(JobEvent::Started {
            job_id: job.id.clone(),
            timestamp: Utc::now(),
        });
    });

    let t = tx.clone();
    queue.on_progress(move |job, progress| {
        let _ = t.send(JobEvent::Progress {
            job_id: job.id.clone(),
            progress: Arc::from(progress.as_str()),
            timestamp: Utc::now(),
        });
    });

    let t = tx.clone();
    queue.on_finished(move |job, result| {
        let _ = t.send(JobEvent::Finished {
            job_id: job.id.clone(),
            title: result.title.clone(),
            url: result.url.clone(),
            timestamp: Utc::now(),
        });
    });

    queue.on_failed(move |job| {
        let _ = tx.send(JobEvent::Failed {
            job_id: job.id.clone(),
            errors: job.failures.iter().map(|f| f.error.clone()).collect(),
            timestamp: Utc::now(),
        });
    });
}
