//! Filesystem bookkeeping for labeling tasks and analyses.
//!
//! This crate provides:
//! - Task creation, frame listing, label files and YOLO dataset export
//! - Analysis metadata, calibration and output lookup
//! - Admin views: sizes, per-entry info, delete, zip download, age cleanup

pub mod admin;
pub mod analysis_store;
pub mod archive;
pub mod error;
pub mod layout;
pub mod task_store;

pub use admin::{AdminStore, AnalysisFile, AnalysisInfo, StorageStats, TaskInfo};
pub use analysis_store::AnalysisStore;
pub use error::{StorageError, StorageResult};
pub use layout::EXPORTS_DIR;
pub use task_store::{LabelState, TaskFrames, TaskListing, TaskStore};
