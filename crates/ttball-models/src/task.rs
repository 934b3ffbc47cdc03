//! Labeling task metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a video came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestSource {
    /// Multipart upload from the browser
    Upload,
    /// Downloaded with yt-dlp
    Youtube,
}

impl IngestSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestSource::Upload => "upload",
            IngestSource::Youtube => "youtube",
        }
    }
}

/// Contents of a task's `meta.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMeta {
    pub source: IngestSource,

    /// Original upload file name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    /// Source URL for YouTube ingests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Requested sampling rate in frames per second
    pub fps: u32,

    pub created: DateTime<Utc>,

    /// Number of frames written at ingest time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frames: Option<u32>,
}

impl TaskMeta {
    pub fn from_upload(filename: impl Into<String>, fps: u32) -> Self {
        Self {
            source: IngestSource::Upload,
            filename: Some(filename.into()),
            url: None,
            fps,
            created: Utc::now(),
            frames: None,
        }
    }

    pub fn from_youtube(url: impl Into<String>, fps: u32) -> Self {
        Self {
            source: IngestSource::Youtube,
            filename: None,
            url: Some(url.into()),
            fps,
            created: Utc::now(),
            frames: None,
        }
    }
}
