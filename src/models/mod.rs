pub mod config;
pub mod job;
pub mod record;

pub use config::ImporterConfig;
pub use job::{
    JobData, JobFailure, JobId, JobProgress, JobResult, JobSnapshot, ParentPlaylist,
};
pub use record::{JobRecord, JobStatus};
