//! Analysis metadata, bounce records and summary statistics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::EntityId;
use crate::task::IngestSource;

/// File names inside an analysis directory.
pub mod files {
    pub const META: &str = "meta.json";
    pub const FIRST_FRAME: &str = "first_frame.jpg";
    pub const CALIBRATION: &str = "table_calib.json";
    pub const HEATMAP: &str = "heatmap.png";
    pub const BOUNCES_CSV: &str = "bounces.csv";
    pub const PREVIEW: &str = "preview.mp4";
    pub const SUMMARY: &str = "summary.json";
}

/// Basic stream properties stored with an analysis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VideoSummary {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub duration: f64,
    pub frame_count: u64,
}

/// Contents of an analysis' `meta.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisMeta {
    pub analysis_id: EntityId,
    pub source: IngestSource,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    pub created: DateTime<Utc>,
    pub video_info: VideoSummary,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_completed: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_result: Option<AnalysisOutcome>,
}

impl AnalysisMeta {
    pub fn new(
        analysis_id: EntityId,
        source: IngestSource,
        filename: Option<String>,
        url: Option<String>,
        video_info: VideoSummary,
    ) -> Self {
        Self {
            analysis_id,
            source,
            filename,
            url,
            created: Utc::now(),
            video_info,
            analysis_completed: None,
            analysis_result: None,
        }
    }

    pub fn is_analyzed(&self) -> bool {
        self.analysis_completed.is_some()
    }
}

/// Outcome of a completed analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisOutcome {
    pub success: bool,
    pub heatmap: bool,
    pub csv: bool,
    pub preview: bool,
    pub confidence: f32,
    pub summary: AnalysisSummary,
}

/// One detected bounce in table coordinates (metres).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BounceRecord {
    pub frame: u64,
    pub time_s: f64,
    pub x_m: f64,
    pub y_m: f64,
    pub conf: f32,
}

impl BounceRecord {
    pub const CSV_HEADER: &'static str = "frame,time_s,x_m,y_m,conf";

    pub fn to_csv_row(&self) -> String {
        format!(
            "{},{:.3},{:.4},{:.4},{:.3}",
            self.frame, self.time_s, self.x_m, self.y_m, self.conf
        )
    }
}

/// Trajectory statistics written to `summary.json`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub frames_processed: u64,
    pub frames_with_detection: u64,
    pub detection_rate: f64,
    pub bounce_count: usize,
    pub mean_confidence: f64,
    /// Bounces with `x < net`
    pub left_half_bounces: usize,
    /// Bounces with `x >= net`
    pub right_half_bounces: usize,
    pub fps: f64,
    pub duration_s: f64,
    /// Heatmap counts, `rows` (table width axis) by `cols` (table length axis)
    pub heatmap_bins: Vec<Vec<u32>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_row_precision() {
        let rec = BounceRecord {
            frame: 42,
            time_s: 1.4,
            x_m: 1.234567,
            y_m: 0.5,
            conf: 0.87654,
        };
        assert_eq!(rec.to_csv_row(), "42,1.400,1.2346,0.5000,0.877");
    }

    #[test]
    fn test_meta_roundtrip_keeps_id() {
        let id: EntityId = "2024-05-01/analysis-1".parse().unwrap();
        let info = VideoSummary {
            width: 1920,
            height: 1080,
            fps: 30.0,
            duration: 12.5,
            frame_count: 375,
        };
        let meta = AnalysisMeta::new(id.clone(), IngestSource::Upload, Some("a.mp4".into()), None, info);
        let json = serde_json::to_string(&meta).unwrap();
        assert!(json.contains("\"analysis_id\":\"2024-05-01/analysis-1\""));
        assert!(!json.contains("analysis_result"));
        let back: AnalysisMeta = serde_json::from_str(&json).unwrap();
        assert_eq!(back.analysis_id, id);
        assert!(!back.is_analyzed());
    }
}
