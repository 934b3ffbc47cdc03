//! Model validation errors.

use thiserror::Error;

pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ModelError {
    #[error("invalid id: {0}")]
    InvalidId(String),

    #[error("invalid calibration: {0}")]
    InvalidCalibration(String),

    #[error("invalid label: {0}")]
    InvalidLabel(String),
}
