use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::models::JobId;

/// Custom serializer for Arc<str> that serializes as a plain string.
fn serialize_arc_str<S>(data: &Arc<str>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(data)
}

/// Queue transitions as published to live subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum JobEvent {
    Queued {
        job_id: JobId,
        url: String,
        timestamp: DateTime<Utc>,
    },
    Started {
        job_id: JobId,
        timestamp: DateTime<Utc>,
    },
    Progress {
        job_id: JobId,
        #[serde(serialize_with = "serialize_arc_str")]
        progress: Arc<str>,
        timestamp: DateTime<Utc>,
    },
    Finished {
        job_id: JobId,
        title: String,
        url: Option<String>,
        timestamp: DateTime<Utc>,
    },
    Failed {
        job_id: JobId,
        errors: Vec<String>,
        timestamp: DateTime<Utc>,
    },
    Removed {
        job_id: JobId,
        timestamp: DateTime<Utc>,
    },
}

impl JobEvent {
    pub fn job_id(&self) -> &JobId {
        match self {
            JobEvent::Queued { job_id, .. }
            | JobEvent::Started { job_id, .. }
            | JobEvent::Progress { job_id, .. }
            | JobEvent::Finished { job_id, .. }
            | JobEvent::Failed { job_id, .. }
            | JobEvent::Removed { job_id, .. } => job_id,
        }
    }

    /// SSE event name.
    pub fn name(&self) -> &'static str {
        match self {
            JobEvent::Queued { .. } => "queued",
            JobEvent::Started { .. } => "started",
            JobEvent::Progress { .. } => "progress",
            JobEvent::Finished { .. } => "finished",
            JobEvent::Failed { .. } => "failed",
            JobEvent::Removed { .. } => "removed",
        }
    }
}
