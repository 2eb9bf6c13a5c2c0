use serde::{Deserialize, Serialize};

use crate::errors::ImporterError;

/// A single video as described by `-J`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Entry {
    pub id: Option<String>,
    pub title: Option<String>,
    pub upload_date: Option<String>,
    pub uploader_id: Option<String>,
    pub channel_id: Option<String>,
    pub description: Option<String>,
    pub extractor: Option<String>,
    pub webpage_url: Option<String>,
    pub url: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl Entry {
    /// URL to hand back to the tool for downloading.
    pub fn best_url(&self) -> Option<&str> {
        non_empty(&self.webpage_url).or_else(|| non_empty(&self.url))
    }

    pub fn id(&self) -> Option<&str> {
        non_empty(&self.id)
    }

    pub fn title(&self) -> Option<&str> {
        non_empty(&self.title)
    }

    pub fn description(&self) -> Option<&str> {
        non_empty(&self.description)
    }

    pub fn extractor(&self) -> Option<&str> {
        non_empty(&self.extractor)
    }

    pub fn uploader_id(&self) -> Option<&str> {
        non_empty(&self.uploader_id)
    }

    pub fn channel_id(&self) -> Option<&str> {
        non_empty(&self.channel_id)
    }
}

/// A flat playlist: entries carry little more than a URL.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Playlist {
    pub id: String,
    pub extractor: Option<String>,
    pub entries: Vec<Entry>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MediaInfo {
    Entry(Entry),
    Playlist(Playlist),
}

#[derive(Deserialize)]
struct TypeProbe {
    #[serde(rename = "_type", default)]
    kind: Option<String>,
}

impl MediaInfo {
    /// Decode `-J` output, which is shaped differently for playlists.
    pub fn from_json(raw: &[u8]) -> Result<Self, ImporterError> {
        let probe: TypeProbe = serde_json::from_slice(raw)?;
        if probe.kind.as_deref() == Some("playlist") {
            Ok(MediaInfo::Playlist(serde_json::from_slice(raw)?))
        } else {
            Ok(MediaInfo::Entry(serde_json::from_slice(raw)?))
        }
    }

    pub fn is_playlist(&self) -> bool {
        matches!(self, MediaInfo::Playlist(_))
    }
}
