//! Bounce heatmap over the table surface.
//!
//! 30 bins along the table length by 17 across its width. A bounce exactly on
//! the far edge falls into the last bin; bounces off the table are dropped.

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_circle_mut, draw_line_segment_mut};
use imageproc::rect::Rect;
use std::path::Path;

use ttball_models::BounceRecord;

use crate::error::AnalysisResult;
use crate::geometry::{NET_X_M, TABLE_LENGTH_M, TABLE_WIDTH_M};
use crate::text::{draw_text, line_height, text_width};

/// Bins along the table length (x).
pub const BINS_X: usize = 30;
/// Bins across the table width (y).
pub const BINS_Y: usize = 17;

const PX_PER_M: f64 = 400.0;
const MARGIN: i32 = 48;
const CAPTION_SCALE: u32 = 3;

const BACKGROUND: Rgb<u8> = Rgb([24, 26, 32]);
const TABLE_BLUE: Rgb<u8> = Rgb([22, 62, 128]);
const LINE_WHITE: Rgb<u8> = Rgb([240, 240, 240]);
const NET_GREY: Rgb<u8> = Rgb([180, 180, 190]);
const DOT_RED: Rgb<u8> = Rgb([230, 40, 40]);
const CAPTION: Rgb<u8> = Rgb([220, 220, 220]);

/// Viridis-like colour stops from low to high density.
const COLORMAP: [[f64; 3]; 5] = [
    [68.0, 1.0, 84.0],
    [59.0, 82.0, 139.0],
    [33.0, 145.0, 140.0],
    [94.0, 201.0, 98.0],
    [253.0, 231.0, 37.0],
];

/// 2-D histogram of bounce positions in table metres.
#[derive(Debug, Clone, PartialEq)]
pub struct Heatmap {
    /// Row-major, `BINS_Y` rows by `BINS_X` columns
    counts: Vec<u32>,
}

impl Default for Heatmap {
    fn default() -> Self {
        Self::new()
    }
}

impl Heatmap {
    pub fn new() -> Self {
        Self {
            counts: vec![0; BINS_X * BINS_Y],
        }
    }

    pub fn from_bounces<'a>(bounces: impl IntoIterator<Item = &'a BounceRecord>) -> Self {
        let mut heatmap = Self::new();
        for b in bounces {
            heatmap.add(b.x_m, b.y_m);
        }
        heatmap
    }

    /// Bin index `(row, col)` for a table point, if it lies on the table.
    pub fn bin_of(x_m: f64, y_m: f64) -> Option<(usize, usize)> {
        if !(0.0..=TABLE_LENGTH_M).contains(&x_m) || !(0.0..=TABLE_WIDTH_M).contains(&y_m) {
            return None;
        }
        let col = ((x_m / TABLE_LENGTH_M * BINS_X as f64) as usize).min(BINS_X - 1);
        let row = ((y_m / TABLE_WIDTH_M * BINS_Y as f64) as usize).min(BINS_Y - 1);
        Some((row, col))
    }

    /// Count a bounce; returns false when it was off the table.
    pub fn add(&mut self, x_m: f64, y_m: f64) -> bool {
        match Self::bin_of(x_m, y_m) {
            Some((row, col)) => {
                self.counts[row * BINS_X + col] += 1;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, row: usize, col: usize) -> u32 {
        self.counts[row * BINS_X + col]
    }

    pub fn total(&self) -> u32 {
        self.counts.iter().sum()
    }

    pub fn max(&self) -> u32 {
        self.counts.iter().copied().max().unwrap_or(0)
    }

    /// Counts as nested rows for serialization.
    pub fn rows(&self) -> Vec<Vec<u32>> {
        self.counts.chunks(BINS_X).map(<[u32]>::to_vec).collect()
    }

    /// Top-down table image with the density overlay, table lines, net and
    /// one dot per bounce. An empty heatmap still renders the table.
    pub fn render(&self, bounces: &[BounceRecord]) -> RgbImage {
        let table_w = (TABLE_LENGTH_M * PX_PER_M).round() as i32;
        let table_h = (TABLE_WIDTH_M * PX_PER_M).round() as i32;
        let caption_h = line_height(CAPTION_SCALE) + MARGIN / 2;
        let width = (table_w + 2 * MARGIN) as u32;
        let height = (table_h + 2 * MARGIN + caption_h) as u32;

        let mut img = RgbImage::from_pixel(width, height, BACKGROUND);
        let (ox, oy) = (MARGIN, MARGIN + caption_h);
        let to_px = |x_m: f64, y_m: f64| (ox as f32 + (x_m * PX_PER_M) as f32, oy as f32 + (y_m * PX_PER_M) as f32);

        draw_filled_rect_mut(&mut img, Rect::at(ox, oy).of_size(table_w as u32, table_h as u32), TABLE_BLUE);

        // Density cells, alpha-blended over the table surface
        let max = self.max();
        if max > 0 {
            let cell_w = TABLE_LENGTH_M / BINS_X as f64;
            let cell_h = TABLE_WIDTH_M / BINS_Y as f64;
            for row in 0..BINS_Y {
                for col in 0..BINS_X {
                    let count = self.get(row, col);
                    if count == 0 {
                        continue;
                    }
                    let t = count as f64 / max as f64;
                    let (x0, y0) = to_px(col as f64 * cell_w, row as f64 * cell_h);
                    let (x1, y1) = to_px((col + 1) as f64 * cell_w, (row + 1) as f64 * cell_h);
                    blend_rect(&mut img, (x0 as i32, y0 as i32), (x1 as i32, y1 as i32), colormap(t), 0.35 + 0.5 * t);
                }
            }
        }

        // Outline, centre line and net
        let corners = [
            to_px(0.0, 0.0),
            to_px(TABLE_LENGTH_M, 0.0),
            to_px(TABLE_LENGTH_M, TABLE_WIDTH_M),
            to_px(0.0, TABLE_WIDTH_M),
        ];
        for i in 0..4 {
            thick_line(&mut img, corners[i], corners[(i + 1) % 4], LINE_WHITE, 3);
        }
        thick_line(
            &mut img,
            to_px(0.0, TABLE_WIDTH_M / 2.0),
            to_px(TABLE_LENGTH_M, TABLE_WIDTH_M / 2.0),
            LINE_WHITE,
            1,
        );
        thick_line(
            &mut img,
            to_px(NET_X_M, -0.08),
            to_px(NET_X_M, TABLE_WIDTH_M + 0.08),
            NET_GREY,
            5,
        );

        for b in bounces {
            if Self::bin_of(b.x_m, b.y_m).is_none() {
                continue;
            }
            let (x, y) = to_px(b.x_m, b.y_m);
            let center = (x.round() as i32, y.round() as i32);
            draw_filled_circle_mut(&mut img, center, 6, DOT_RED);
            draw_hollow_circle_mut(&mut img, center, 7, Rgb([0, 0, 0]));
        }

        let caption = if bounces.is_empty() {
            "NO BOUNCES".to_string()
        } else {
            format!("BOUNCES: {}", bounces.len())
        };
        let cx = (width as i32 - text_width(&caption, CAPTION_SCALE)) / 2;
        draw_text(&mut img, cx, MARGIN / 2, CAPTION_SCALE, CAPTION, &caption);

        img
    }

    /// Render and save as PNG.
    pub fn save_png(&self, bounces: &[BounceRecord], path: impl AsRef<Path>) -> AnalysisResult<()> {
        self.render(bounces).save_with_format(path, image::ImageFormat::Png)?;
        Ok(())
    }
}

/// Linear interpolation through the colour stops, `t` in [0, 1].
fn colormap(t: f64) -> Rgb<u8> {
    let t = t.clamp(0.0, 1.0) * (COLORMAP.len() - 1) as f64;
    let i = (t.floor() as usize).min(COLORMAP.len() - 2);
    let f = t - i as f64;
    let (a, b) = (COLORMAP[i], COLORMAP[i + 1]);
    Rgb([
        (a[0] + (b[0] - a[0]) * f).round() as u8,
        (a[1] + (b[1] - a[1]) * f).round() as u8,
        (a[2] + (b[2] - a[2]) * f).round() as u8,
    ])
}

fn blend_rect(img: &mut RgbImage, (x0, y0): (i32, i32), (x1, y1): (i32, i32), color: Rgb<u8>, alpha: f64) {
    let (w, h) = (img.width() as i32, img.height() as i32);
    for y in y0.max(0)..y1.min(h) {
        for x in x0.max(0)..x1.min(w) {
            let p = img.get_pixel_mut(x as u32, y as u32);
            for c in 0..3 {
                p[c] = (p[c] as f64 * (1.0 - alpha) + color[c] as f64 * alpha).round() as u8;
            }
        }
    }
}

/// Line segment drawn `width` pixels wide by offsetting perpendicular copies.
pub(crate) fn thick_line(img: &mut RgbImage, a: (f32, f32), b: (f32, f32), color: Rgb<u8>, width: u32) {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let len = (dx * dx + dy * dy).sqrt().max(1e-6);
    let (nx, ny) = (-dy / len, dx / len);
    let half = (width.max(1) as f32 - 1.0) / 2.0;
    let steps = width.max(1);
    for i in 0..steps {
        let o = i as f32 - half;
        draw_line_segment_mut(img, (a.0 + nx * o, a.1 + ny * o), (b.0 + nx * o, b.1 + ny * o), color);
    }
}
