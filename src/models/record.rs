use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::job::{JobData, JobFailure, JobId, JobProgress, JobResult};

/// Lifecycle status of a job as seen by the repository.
///
/// Variants are declared in lifecycle order; a record only ever moves to a
/// later variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Waiting,
    Started,
    Finished,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Finished | JobStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Waiting => "waiting",
            JobStatus::Started => "started",
            JobStatus::Finished => "finished",
            JobStatus::Failed => "failed",
        }
    }

    /// Whether `next` is a legal transition from `self`.
    pub fn can_advance_to(self, next: JobStatus) -> bool {
        match self {
            JobStatus::Waiting => next == JobStatus::Started || next.is_terminal(),
            JobStatus::Started => next.is_terminal(),
            JobStatus::Finished | JobStatus::Failed => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Externally visible point-in-time state of one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub status: JobStatus,
    pub created_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub data: JobData,
    pub progress: JobProgress,
    pub failures: Vec<JobFailure>,
    pub result: Option<JobResult>,
}

impl JobRecord {
    pub fn new(id: JobId) -> Self {
        Self {
            id,
            status: JobStatus::Waiting,
            created_at: None,
            started_at: None,
            stopped_at: None,
            data: JobData::default(),
            progress: JobProgress::default(),
            failures: Vec::new(),
            result: None,
        }
    }

    /// Move the record to `next`, stamping the matching timestamp.
    ///
    /// Returns `false` and leaves the record untouched when the transition
    /// would go backwards.
    pub fn advance(&mut self, next: JobStatus, at: DateTime<Utc>) -> bool {
        if !self.status.can_advance_to(next) {
            return false;
        }
        match next {
            JobStatus::Waiting => {}
            JobStatus::Started => self.started_at = Some(at),
            JobStatus::Finished | JobStatus::Failed => self.stopped_at = Some(at),
        }
        self.status = next;
        true
    }

    /// Wall time between start and stop, if both are known.
    pub fn runtime(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.stopped_at) {
            (Some(start), Some(stop)) => Some(stop - start),
            _ => None,
        }
    }
}
