//! YOLO label lines (`class x y w h`, normalized to the image size).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ModelError, ModelResult};

/// Class id of the only class, `ball`.
pub const BALL_CLASS: u32 = 0;

/// Smallest box side in pixels.
pub const MIN_BOX_PX: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct YoloLabel {
    pub class_id: u32,
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl YoloLabel {
    /// Square box of side `max(2, box_px)` centred on a click in natural image
    /// pixels. The click must lie inside the image; the normalized values are
    /// clamped to `[0, 1]`.
    pub fn from_click(cx: f64, cy: f64, box_px: f64, width: u32, height: u32) -> ModelResult<Self> {
        if width == 0 || height == 0 {
            return Err(ModelError::InvalidLabel("image has zero size".to_string()));
        }
        if !cx.is_finite() || !cy.is_finite() || !box_px.is_finite() {
            return Err(ModelError::InvalidLabel("coordinates must be finite".to_string()));
        }
        let (w, h) = (width as f64, height as f64);
        if cx < 0.0 || cy < 0.0 || cx > w || cy > h {
            return Err(ModelError::InvalidLabel(format!(
                "click ({:.1}, {:.1}) outside image {}x{}",
                cx, cy, width, height
            )));
        }

        let side = box_px.max(MIN_BOX_PX);
        Ok(Self {
            class_id: BALL_CLASS,
            x: (cx / w).clamp(0.0, 1.0),
            y: (cy / h).clamp(0.0, 1.0),
            w: (side / w).clamp(0.0, 1.0),
            h: (side / h).clamp(0.0, 1.0),
        })
    }
}

impl fmt::Display for YoloLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:.6} {:.6} {:.6} {:.6}",
            self.class_id, self.x, self.y, self.w, self.h
        )
    }
}

impl FromStr for YoloLabel {
    type Err = ModelError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() != 5 {
            return Err(ModelError::InvalidLabel(format!(
                "expected 5 fields, got {}",
                parts.len()
            )));
        }
        let class_id = parts[0]
            .parse::<u32>()
            .map_err(|e| ModelError::InvalidLabel(format!("class id: {}", e)))?;
        let mut values = [0.0f64; 4];
        for (slot, raw) in values.iter_mut().zip(&parts[1..]) {
            *slot = raw
                .parse::<f64>()
                .map_err(|e| ModelError::InvalidLabel(format!("{}: {}", raw, e)))?;
        }
        let [x, y, w, h] = values;
        Ok(Self { class_id, x, y, w, h })
    }
}
