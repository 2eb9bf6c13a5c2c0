use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::ImporterError;

/// Opaque, process-unique job identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// The playlist a job was fanned out from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParentPlaylist {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extractor: Option<String>,
}

/// Input payload of an import job.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JobData {
    pub url: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_playlist: Option<ParentPlaylist>,
}

impl JobData {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            tags: Vec::new(),
            parent_playlist: None,
        }
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_parent(mut self, parent: ParentPlaylist) -> Self {
        self.parent_playlist = Some(parent);
        self
    }
}

/// Validate a submitted job before it reaches the queue.
pub fn validate_job_data(data: &JobData) -> Result<(), ImporterError> {
    if data.url.trim().is_empty() {
        return Err(ImporterError::Validation(
            "missing \"url\" value".to_string(),
        ));
    }
    if data.tags.iter().any(|t| t.contains(',')) {
        return Err(ImporterError::Validation(
            "tags must not contain commas".to_string(),
        ));
    }
    Ok(())
}

/// Split a comma separated tag list, dropping blanks.
pub fn parse_tag_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Output of a successfully processed job. `url` is empty for playlist fan-outs.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JobResult {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobFailure {
    pub error: String,
}

impl JobFailure {
    pub fn new(error: impl fmt::Display) -> Self {
        Self {
            error: error.to_string(),
        }
    }
}

impl From<ImporterError> for JobFailure {
    fn from(err: ImporterError) -> Self {
        Self::new(err)
    }
}

/// Advisory, human readable progress text.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobProgress(String);

impl JobProgress {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for JobProgress {
    fn from(text: String) -> Self {
        Self(text)
    }
}

impl From<&str> for JobProgress {
    fn from(text: &str) -> Self {
        Self(text.to_string())
    }
}

/// Value copy of an in-flight job handed to event handlers.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSnapshot {
    pub id: JobId,
    pub data: JobData,
    pub attempts: u32,
    pub failures: Vec<JobFailure>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_id_serializes_as_plain_string() {
        let id = JobId::new("1f");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"1f\"");
        assert_eq!(id.to_string(), "1f");
    }

    #[test]
    fn test_job_data_minimal_json() {
        let data: JobData = serde_json::from_str(r#"{"url":"https://example.com/v"}"#).unwrap();
        assert_eq!(data.url, "https://example.com/v");
        assert!(data.tags.is_empty());
        assert!(data.parent_playlist.is_none());
    }

    #[test]
    fn test_job_data_builder_sets_parent() {
        let data = JobData::new("https://example.com/v")
            .with_tags(vec!["music".to_string()])
            .with_parent(ParentPlaylist {
                id: "PL1".to_string(),
                extractor: Some("youtube:playlist".to_string()),
            });
        assert_eq!(data.tags, vec!["music"]);
        assert_eq!(data.parent_playlist.unwrap().id, "PL1");
    }

    #[test]
    fn test_validate_rejects_blank_url() {
        let err = validate_job_data(&JobData::new("   ")).unwrap_err();
        assert!(matches!(err, ImporterError::Validation(_)));
    }

    #[test]
    fn test_validate_rejects_comma_in_tag() {
        let data = JobData::new("https://example.com").with_tags(vec!["a,b".to_string()]);
        assert!(validate_job_data(&data).is_err());
    }

    #[test]
    fn test_validate_accepts_plain_job() {
        let data = JobData::new("https://example.com").with_tags(vec!["a".to_string()]);
        assert!(validate_job_data(&data).is_ok());
    }

    #[test]
    fn test_parse_tag_list_trims_and_drops_blanks() {
        assert_eq!(parse_tag_list(" music, ,live ,"), vec!["music", "live"]);
        assert!(parse_tag_list("").is_empty());
    }

    #[test]
    fn test_job_result_without_url_omits_field() {
        let result = JobResult {
            title: "Playlist PL1".to_string(),
            url: None,
        };
        let json = serde_json::to_string(&result).unwrap();
        assert_eq!(json, r#"{"title":"Playlist PL1"}"#);
    }

    #[test]
    fn test_job_failure_from_error_keeps_message() {
        let failure: JobFailure = ImporterError::Tool("exit status 1".to_string()).into();
        assert_eq!(failure.error, "Tool error: exit status 1");
    }
}
