//! Table geometry and the image-to-table homography.
//!
//! Table coordinates are metres on the playing surface: `x` runs along the
//! table length from the TL->TR edge, `y` across the width from TL->BL.

use nalgebra::{Matrix3, SMatrix, SVector, Vector3};
use ttball_models::Calibration;

use crate::error::{AnalysisError, AnalysisResult};

/// Official table length in metres.
pub const TABLE_LENGTH_M: f64 = 2.74;
/// Official table width in metres.
pub const TABLE_WIDTH_M: f64 = 1.525;
/// Net position along the table length.
pub const NET_X_M: f64 = TABLE_LENGTH_M / 2.0;

/// Table corners in the calibration order TL, TR, BR, BL.
pub const TABLE_CORNERS_M: [[f64; 2]; 4] = [
    [0.0, 0.0],
    [TABLE_LENGTH_M, 0.0],
    [TABLE_LENGTH_M, TABLE_WIDTH_M],
    [0.0, TABLE_WIDTH_M],
];

/// Smallest triangle area (px²) spanned by any three corners.
const MIN_TRIANGLE_AREA: f64 = 1.0;

/// Guard added to the homogeneous coordinate before dividing.
const W_EPSILON: f64 = 1e-9;

/// Perspective transform from image pixels to table metres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Homography {
    matrix: Matrix3<f64>,
}

impl Homography {
    /// Solve the 4-point DLT for the calibration corners.
    pub fn from_calibration(calibration: &Calibration) -> AnalysisResult<Self> {
        Self::from_points(calibration.points(), &TABLE_CORNERS_M)
    }

    /// Exact homography mapping `src[i]` to `dst[i]` (h33 fixed to 1).
    pub fn from_points(src: &[[f64; 2]; 4], dst: &[[f64; 2]; 4]) -> AnalysisResult<Self> {
        check_non_degenerate(src)?;

        let mut a = SMatrix::<f64, 8, 8>::zeros();
        let mut b = SVector::<f64, 8>::zeros();

        for (i, ([x, y], [u, v])) in src.iter().zip(dst.iter()).enumerate() {
            let r = 2 * i;
            a[(r, 0)] = *x;
            a[(r, 1)] = *y;
            a[(r, 2)] = 1.0;
            a[(r, 6)] = -u * x;
            a[(r, 7)] = -u * y;
            b[r] = *u;

            a[(r + 1, 3)] = *x;
            a[(r + 1, 4)] = *y;
            a[(r + 1, 5)] = 1.0;
            a[(r + 1, 6)] = -v * x;
            a[(r + 1, 7)] = -v * y;
            b[r + 1] = *v;
        }

        let h = a
            .lu()
            .solve(&b)
            .ok_or_else(|| AnalysisError::malformed_calibration("corner points are degenerate"))?;

        if h.iter().any(|v| !v.is_finite()) {
            return Err(AnalysisError::malformed_calibration(
                "corner points are degenerate",
            ));
        }

        let matrix = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.0);
        Ok(Self { matrix })
    }

    /// Map an image point to table metres.
    pub fn project(&self, x: f64, y: f64) -> (f64, f64) {
        let m = self.matrix * Vector3::new(x, y, 1.0);
        let w = m[2] + W_EPSILON;
        (m[0] / w, m[1] / w)
    }
}

/// Whether a table point lies on the table, allowing `margin` metres around it.
pub fn inside_table((x, y): (f64, f64), margin: f64) -> bool {
    (-margin..=TABLE_LENGTH_M + margin).contains(&x) && (-margin..=TABLE_WIDTH_M + margin).contains(&y)
}

/// Reject duplicate or collinear corner sets.
fn check_non_degenerate(pts: &[[f64; 2]; 4]) -> AnalysisResult<()> {
    const TRIPLES: [[usize; 3]; 4] = [[0, 1, 2], [0, 1, 3], [0, 2, 3], [1, 2, 3]];
    for [i, j, k] in TRIPLES {
        let area = triangle_area(pts[i], pts[j], pts[k]);
        if !area.is_finite() || area < MIN_TRIANGLE_AREA {
            return Err(AnalysisError::malformed_calibration(
                "three of the corner points are collinear or coincide",
            ));
        }
    }
    Ok(())
}

fn triangle_area(a: [f64; 2], b: [f64; 2], c: [f64; 2]) -> f64 {
    ((b[0] - a[0]) * (c[1] - a[1]) - (c[0] - a[0]) * (b[1] - a[1])).abs() / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calib(points: [[f64; 2]; 4]) -> Calibration {
        Calibration::from_points(&points).unwrap()
    }

    fn assert_close(actual: (f64, f64), expected: (f64, f64)) {
        assert!(
            (actual.0 - expected.0).abs() < 1e-6 && (actual.1 - expected.1).abs() < 1e-6,
            "{:?} != {:?}",
            actual,
            expected
        );
    }

    #[test]
    fn test_corners_map_to_table() {
        // Trapezoid as seen from behind one end of the table
        let c = calib([[400.0, 300.0], [880.0, 300.0], [1100.0, 600.0], [180.0, 600.0]]);
        let h = Homography::from_calibration(&c).unwrap();

        for (img, table) in c.points().iter().zip(TABLE_CORNERS_M.iter()) {
            assert_close(h.project(img[0], img[1]), (table[0], table[1]));
        }
    }

    #[test]
    fn test_axis_aligned_scale() {
        // 100 px per metre, no perspective
        let c = calib([[0.0, 0.0], [274.0, 0.0], [274.0, 152.5], [0.0, 152.5]]);
        let h = Homography::from_calibration(&c).unwrap();
        assert_close(h.project(137.0, 76.25), (1.37, 0.7625));
    }

    #[test]
    fn test_degenerate_rejected() {
        let collinear = calib([[0.0, 0.0], [100.0, 0.0], [200.0, 0.0], [0.0, 100.0]]);
        assert!(matches!(
            Homography::from_calibration(&collinear),
            Err(AnalysisError::MalformedCalibration(_))
        ));

        let duplicate = calib([[10.0, 10.0], [10.0, 10.0], [200.0, 200.0], [0.0, 100.0]]);
        assert!(Homography::from_calibration(&duplicate).is_err());
    }

    #[test]
    fn test_inside_table() {
        assert!(inside_table((0.0, 0.0), 0.0));
        assert!(inside_table((2.74, 1.525), 0.0));
        assert!(inside_table((-0.04, 1.57), 0.05));
        assert!(!inside_table((-0.06, 0.5), 0.05));
        assert!(!inside_table((1.0, 1.6), 0.05));
    }
}
