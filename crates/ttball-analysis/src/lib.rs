//! Table-tennis analysis: table calibration, ball tracking on the table
//! plane, bounce detection and the rendered outputs of a run.

pub mod bounce;
pub mod error;
pub mod geometry;
pub mod heatmap;
pub mod overlay;
pub mod pipeline;
pub mod report;
pub mod text;

pub use bounce::{find_bounces, Bounce, BounceDetector, BounceRules, TrackPoint};
pub use error::{AnalysisError, AnalysisResult};
pub use geometry::{inside_table, Homography, NET_X_M, TABLE_LENGTH_M, TABLE_WIDTH_M};
pub use heatmap::{Heatmap, BINS_X, BINS_Y};
pub use overlay::Overlay;
pub use pipeline::{AnalysisInput, AnalysisOutputs, AnalysisPipeline};
pub use report::{bounces_csv, TrackStats};
