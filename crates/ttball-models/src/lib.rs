//! Shared data models for the table-tennis ball tools.
//!
//! This crate provides Serde-serializable types for:
//! - Task and analysis identifiers (`day/name` pairs)
//! - Labeling task and analysis metadata
//! - Table calibration points
//! - YOLO label lines
//! - Bounce records and analysis summaries

pub mod analysis;
pub mod calibration;
pub mod error;
pub mod id;
pub mod label;
pub mod task;
pub mod utils;

// Re-export common types
pub use analysis::{AnalysisMeta, AnalysisOutcome, AnalysisSummary, BounceRecord, VideoSummary};
pub use calibration::{Calibration, CORNER_NAMES};
pub use error::{ModelError, ModelResult};
pub use id::EntityId;
pub use label::YoloLabel;
pub use task::{IngestSource, TaskMeta};
pub use utils::{bytes_to_mb, format_bytes, slugify};
