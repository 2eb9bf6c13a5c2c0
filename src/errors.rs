use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ImporterError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Tool error: {0}")]
    Tool(String),

    #[error("Upload error: {0}")]
    Upload(String),

    #[error("Playlist cycle: job triggered by parent playlist {parent} tried to import another playlist {playlist}")]
    PlaylistCycle { parent: String, playlist: String },

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for ImporterError {
    fn from(err: std::io::Error) -> Self {
        ImporterError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ImporterError {
    fn from(err: serde_json::Error) -> Self {
        ImporterError::Tool(format!("unreadable tool output: {}", err))
    }
}

impl From<reqwest::Error> for ImporterError {
    fn from(err: reqwest::Error) -> Self {
        ImporterError::Upload(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = ImporterError::NotFound("job 1f".to_string());
        assert_eq!(err.to_string(), "Not found: job 1f");
    }

    #[test]
    fn test_conflict_display() {
        let err = ImporterError::Conflict("job 1f already exists".to_string());
        assert_eq!(err.to_string(), "Conflict: job 1f already exists");
    }

    #[test]
    fn test_validation_display() {
        let err = ImporterError::Validation("missing url".to_string());
        assert_eq!(err.to_string(), "Validation error: missing url");
    }

    #[test]
    fn test_tool_display() {
        let err = ImporterError::Tool("exit status 1".to_string());
        assert_eq!(err.to_string(), "Tool error: exit status 1");
    }

    #[test]
    fn test_upload_display() {
        let err = ImporterError::Upload("502 Bad Gateway".to_string());
        assert_eq!(err.to_string(), "Upload error: 502 Bad Gateway");
    }

    #[test]
    fn test_playlist_cycle_display_names_both_playlists() {
        let err = ImporterError::PlaylistCycle {
            parent: "PLparent".to_string(),
            playlist: "PLchild".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("PLparent"));
        assert!(msg.contains("PLchild"));
        assert!(msg.starts_with("Playlist cycle"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err: ImporterError = io_err.into();
        match err {
            ImporterError::Io(msg) => assert!(msg.contains("file missing")),
            other => panic!("Expected Io, got: {:?}", other),
        }
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<String>("not valid json").unwrap_err();
        let err: ImporterError = json_err.into();
        match err {
            ImporterError::Tool(msg) => assert!(msg.starts_with("unreadable tool output")),
            other => panic!("Expected Tool, got: {:?}", other),
        }
    }
}
