use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::ImporterError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImporterConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_creamy_videos_host")]
    pub creamy_videos_host: String,
    #[serde(default = "default_parallel_workers")]
    pub parallel_workers: usize,
    #[serde(default = "default_ytdl_bin_path")]
    pub ytdl_bin_path: String,
    #[serde(default = "default_download_format")]
    pub download_format: String,
    #[serde(default)]
    pub work_dir: Option<PathBuf>,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
    #[serde(default = "default_purge_fraction")]
    pub purge_fraction: u32,
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,
    #[serde(default)]
    pub update_tool_on_start: bool,
    #[serde(default)]
    pub skip_existing: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    4000
}

fn default_creamy_videos_host() -> String {
    "http://localhost:3000/".to_string()
}

fn default_parallel_workers() -> usize {
    3
}

fn default_ytdl_bin_path() -> String {
    "youtube-dl".to_string()
}

fn default_download_format() -> String {
    "best[ext=mp4]/best[ext=webm]/best/mp4/webm".to_string()
}

fn default_max_attempts() -> u32 {
    2
}

fn default_retention_secs() -> u64 {
    86_400 // 24h
}

fn default_purge_fraction() -> u32 {
    4
}

fn default_shutdown_grace_secs() -> u64 {
    30
}

fn default_broadcast_capacity() -> usize {
    4096
}

impl Default for ImporterConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            creamy_videos_host: default_creamy_videos_host(),
            parallel_workers: default_parallel_workers(),
            ytdl_bin_path: default_ytdl_bin_path(),
            download_format: default_download_format(),
            work_dir: None,
            max_attempts: default_max_attempts(),
            retention_secs: default_retention_secs(),
            purge_fraction: default_purge_fraction(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
            broadcast_capacity: default_broadcast_capacity(),
            update_tool_on_start: false,
            skip_existing: false,
        }
    }
}

impl ImporterConfig {
    pub fn validate(&self) -> Result<(), ImporterError> {
        if self.parallel_workers == 0 {
            return Err(ImporterError::Validation(
                "parallel_workers must be at least 1".to_string(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(ImporterError::Validation(
                "max_attempts must be at least 1".to_string(),
            ));
        }
        if self.retention_secs == 0 {
            return Err(ImporterError::Validation(
                "retention_secs must be at least 1".to_string(),
            ));
        }
        if self.broadcast_capacity == 0 {
            return Err(ImporterError::Validation(
                "broadcast_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    /// How often the purger runs: a fraction of the retention window, never
    /// more often than once a second.
    pub fn purge_interval(&self) -> Duration {
        let fraction = self.purge_fraction.max(1);
        (self.retention() / fraction).max(Duration::from_secs(1))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn work_dir(&self) -> PathBuf {
        self.work_dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_importer_config_defaults() {
        let config = ImporterConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 4000);
        assert_eq!(config.creamy_videos_host, "http://localhost:3000/");
        assert_eq!(config.parallel_workers, 3);
        assert_eq!(config.ytdl_bin_path, "youtube-dl");
        assert!(config.work_dir.is_none());
        assert_eq!(config.max_attempts, 2);
        assert_eq!(config.retention_secs, 86_400);
        assert_eq!(config.purge_fraction, 4);
        assert_eq!(config.shutdown_grace_secs, 30);
        assert_eq!(config.broadcast_capacity, 4096);
        assert!(!config.update_tool_on_start);
        assert!(!config.skip_existing);
    }

    #[test]
    fn test_importer_config_partial_deserialization_empty() {
        let config: ImporterConfig = serde_json::from_str("{}").expect("deserialize");
        assert_eq!(config.port, 4000);
        assert_eq!(config.parallel_workers, 3);
        assert_eq!(
            config.download_format,
            "best[ext=mp4]/best[ext=webm]/best/mp4/webm"
        );
    }

    #[test]
    fn test_importer_config_partial_deserialization_some_fields() {
        let json = r#"{"port": 9000, "parallel_workers": 8, "work_dir": "/tmp/cvi"}"#;
        let config: ImporterConfig = serde_json::from_str(json).expect("deserialize");
        assert_eq!(config.port, 9000);
        assert_eq!(config.parallel_workers, 8);
        assert_eq!(config.work_dir, Some(PathBuf::from("/tmp/cvi")));
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.max_attempts, 2);
    }

    #[test]
    fn test_purge_interval_is_fraction_of_retention() {
        let config = ImporterConfig {
            retention_secs: 3600,
            purge_fraction: 4,
            ..Default::default()
        };
        assert_eq!(config.purge_interval(), Duration::from_secs(900));
    }

    #[test]
    fn test_purge_interval_floor_and_zero_fraction() {
        let config = ImporterConfig {
            retention_secs: 2,
            purge_fraction: 10,
            ..Default::default()
        };
        assert_eq!(config.purge_interval(), Duration::from_secs(1));

        let config = ImporterConfig {
            retention_secs: 60,
            purge_fraction: 0,
            ..Default::default()
        };
        assert_eq!(config.purge_interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_validate_rejects_zero_workers_attempts_and_retention() {
        let mut config = ImporterConfig::default();
        assert!(config.validate().is_ok());

        config.parallel_workers = 0;
        assert!(config.validate().is_err());
        config.parallel_workers = 1;

        config.max_attempts = 0;
        assert!(config.validate().is_err());
        config.max_attempts = 2;

        config.retention_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_work_dir_defaults_to_current_dir() {
        assert_eq!(ImporterConfig::default().work_dir(), PathBuf::from("."));
    }
}
