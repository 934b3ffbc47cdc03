//! Error types for the analysis pass.

use thiserror::Error;
use ttball_media::MediaError;

/// Result type for analysis operations.
pub type AnalysisResult<T> = Result<T, AnalysisError>;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("malformed calibration: {0}")]
    MalformedCalibration(String),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("video contains no frames")]
    NoFrames,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AnalysisError {
    pub fn malformed_calibration(message: impl Into<String>) -> Self {
        Self::MalformedCalibration(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}
