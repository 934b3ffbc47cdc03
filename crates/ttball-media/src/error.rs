//! Error types for media operations.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

pub type MediaResult<T> = Result<T, MediaError>;

/// External programs the media layer shells out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    Ffmpeg,
    Ffprobe,
    YtDlp,
}

impl Tool {
    pub fn binary(self) -> &'static str {
        match self {
            Tool::Ffmpeg => "ffmpeg",
            Tool::Ffprobe => "ffprobe",
            Tool::YtDlp => "yt-dlp",
        }
    }

    /// Whether the program resolves on `PATH`.
    pub fn available(self) -> bool {
        which::which(self.binary()).is_ok()
    }

    /// Resolve the program on `PATH`.
    pub fn locate(self) -> MediaResult<PathBuf> {
        which::which(self.binary()).map_err(|_| MediaError::ToolMissing(self))
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.binary())
    }
}

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("{0} not found in PATH")]
    ToolMissing(Tool),

    /// FFmpeg exited unsuccessfully; `stderr` holds the last diagnostic lines.
    #[error("FFmpeg failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
    },

    /// FFprobe could not read the file
    #[error("Could not probe video: {0}")]
    ProbeFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid video file: {0}")]
    InvalidVideo(String),

    #[error("Ball detector error: {0}")]
    Detector(String),

    #[error("Model not found: {}", .0.display())]
    ModelNotFound(PathBuf),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    pub fn ffmpeg(message: impl Into<String>) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr: None,
        }
    }

    pub fn detector(message: impl Into<String>) -> Self {
        Self::Detector(message.into())
    }

    pub fn download(message: impl Into<String>) -> Self {
        Self::DownloadFailed(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}
