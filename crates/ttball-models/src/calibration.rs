//! Table corner calibration.

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// Corner order expected from the client.
pub const CORNER_NAMES: [&str; 4] = ["TL", "TR", "BR", "BL"];

/// Four table corners in image pixels, stored as `table_calib.json`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    /// Top-left, top-right, bottom-right, bottom-left
    pub img_pts: [[f64; 2]; 4],
}

impl Calibration {
    /// Build a calibration from client points (exactly four, all finite).
    pub fn from_points(points: &[[f64; 2]]) -> ModelResult<Self> {
        let img_pts: [[f64; 2]; 4] = points.try_into().map_err(|_| {
            ModelError::InvalidCalibration(format!(
                "exactly 4 points required (TL, TR, BR, BL), got {}",
                points.len()
            ))
        })?;

        for (name, [x, y]) in CORNER_NAMES.iter().zip(img_pts.iter()) {
            if !x.is_finite() || !y.is_finite() {
                return Err(ModelError::InvalidCalibration(format!(
                    "corner {} is not a finite point",
                    name
                )));
            }
        }

        Ok(Self { img_pts })
    }

    /// Reject points that fall outside a `width` x `height` reference frame.
    pub fn check_bounds(&self, width: u32, height: u32) -> ModelResult<()> {
        let (w, h) = (width as f64, height as f64);
        for (name, [x, y]) in CORNER_NAMES.iter().zip(self.img_pts.iter()) {
            if *x < 0.0 || *y < 0.0 || *x > w || *y > h {
                return Err(ModelError::InvalidCalibration(format!(
                    "corner {} ({:.1}, {:.1}) lies outside the {}x{} frame",
                    name, x, y, width, height
                )));
            }
        }
        Ok(())
    }

    pub fn points(&self) -> &[[f64; 2]; 4] {
        &self.img_pts
    }
}
