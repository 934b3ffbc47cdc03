//! CSV and summary outputs of an analysis run.

use std::fmt::Write as _;
use std::path::Path;

use ttball_models::{AnalysisSummary, BounceRecord};

use crate::error::AnalysisResult;
use crate::geometry::NET_X_M;
use crate::heatmap::Heatmap;

/// Render bounce records as CSV (header always present).
pub fn bounces_csv(records: &[BounceRecord]) -> String {
    let mut out = String::with_capacity(32 * (records.len() + 1));
    out.push_str(BounceRecord::CSV_HEADER);
    out.push('\n');
    for r in records {
        let _ = writeln!(out, "{}", r.to_csv_row());
    }
    out
}

pub async fn write_bounces_csv(path: impl AsRef<Path>, records: &[BounceRecord]) -> AnalysisResult<()> {
    tokio::fs::write(path, bounces_csv(records)).await?;
    Ok(())
}

pub async fn write_summary(path: impl AsRef<Path>, summary: &AnalysisSummary) -> AnalysisResult<()> {
    tokio::fs::write(path, serde_json::to_vec_pretty(summary)?).await?;
    Ok(())
}

/// Running statistics collected during the frame loop.
#[derive(Debug, Default, Clone)]
pub struct TrackStats {
    pub frames_processed: u64,
    pub frames_with_detection: u64,
    confidence_sum: f64,
}

impl TrackStats {
    pub fn record_frame(&mut self, detection_confidence: Option<f32>) {
        self.frames_processed += 1;
        if let Some(c) = detection_confidence {
            self.frames_with_detection += 1;
            self.confidence_sum += c as f64;
        }
    }

    pub fn summarize(&self, bounces: &[BounceRecord], heatmap: &Heatmap, fps: f64) -> AnalysisSummary {
        let detection_rate = if self.frames_processed > 0 {
            self.frames_with_detection as f64 / self.frames_processed as f64
        } else {
            0.0
        };
        let mean_confidence = if self.frames_with_detection > 0 {
            self.confidence_sum / self.frames_with_detection as f64
        } else {
            0.0
        };
        let left = bounces.iter().filter(|b| b.x_m < NET_X_M).count();

        AnalysisSummary {
            frames_processed: self.frames_processed,
            frames_with_detection: self.frames_with_detection,
            detection_rate,
            bounce_count: bounces.len(),
            mean_confidence,
            left_half_bounces: left,
            right_half_bounces: bounces.len() - left,
            fps,
            duration_s: if fps > 0.0 {
                self.frames_processed as f64 / fps
            } else {
                0.0
            },
            heatmap_bins: heatmap.rows(),
        }
    }
}
