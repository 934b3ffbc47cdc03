//! Annotations drawn on preview frames.

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_circle_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

use ttball_media::BallDetection;
use ttball_models::{Calibration, CORNER_NAMES};

use crate::heatmap::thick_line;
use crate::text::{draw_text, line_height};

const TABLE_CYAN: Rgb<u8> = Rgb([0, 255, 255]);
const CORNER_YELLOW: Rgb<u8> = Rgb([255, 255, 0]);
const BALL_GREEN: Rgb<u8> = Rgb([0, 255, 0]);
const BOUNCE_RED: Rgb<u8> = Rgb([255, 0, 0]);

/// Seconds the calibration corners stay visible.
const CALIBRATION_BANNER_S: f64 = 2.0;

/// Per-frame preview annotations: table polygon, calibration corners for
/// the first seconds, the current detection and all bounces so far.
#[derive(Debug, Clone)]
pub struct Overlay {
    corners: [(f32, f32); 4],
    banner_frames: u64,
    bounces: Vec<(i32, i32)>,
    text_scale: u32,
}

impl Overlay {
    pub fn new(calibration: &Calibration, fps: f64, frame_height: u32) -> Self {
        let corners = calibration.img_pts.map(|[x, y]| (x as f32, y as f32));
        Self {
            corners,
            banner_frames: (fps.max(1.0) * CALIBRATION_BANNER_S) as u64,
            bounces: Vec::new(),
            text_scale: (frame_height / 360).max(1),
        }
    }

    /// Remember a bounce so it stays visible for the rest of the video.
    pub fn add_bounce(&mut self, image_xy: (f64, f64)) {
        self.bounces.push((image_xy.0.round() as i32, image_xy.1.round() as i32));
    }

    pub fn bounce_count(&self) -> usize {
        self.bounces.len()
    }

    pub fn draw(&self, frame: &mut RgbImage, frame_index: u64, detection: Option<&BallDetection>) {
        for i in 0..4 {
            thick_line(frame, self.corners[i], self.corners[(i + 1) % 4], TABLE_CYAN, 2);
        }

        if frame_index < self.banner_frames {
            self.draw_calibration(frame);
        }

        if let Some(det) = detection {
            let x = det.x1.round() as i32;
            let y = det.y1.round() as i32;
            let w = (det.x2 - det.x1).round().max(1.0) as u32;
            let h = (det.y2 - det.y1).round().max(1.0) as u32;
            draw_hollow_rect_mut(frame, Rect::at(x, y).of_size(w, h), BALL_GREEN);
            draw_hollow_rect_mut(frame, Rect::at(x - 1, y - 1).of_size(w + 2, h + 2), BALL_GREEN);

            let (cx, cy) = det.center();
            draw_filled_circle_mut(frame, (cx.round() as i32, cy.round() as i32), 4, TABLE_CYAN);

            let caption = format!("BALL {:.2}", det.confidence);
            let ty = (y - line_height(self.text_scale) - 4).max(2);
            draw_text(frame, x, ty, self.text_scale, BALL_GREEN, &caption);
        }

        for &center in &self.bounces {
            draw_filled_circle_mut(frame, center, 6, BOUNCE_RED);
            draw_hollow_circle_mut(frame, center, 7, Rgb([255, 255, 255]));
        }
    }

    fn draw_calibration(&self, frame: &mut RgbImage) {
        let s = self.text_scale;
        for (name, &(x, y)) in CORNER_NAMES.iter().zip(self.corners.iter()) {
            let (x, y) = (x.round() as i32, y.round() as i32);
            draw_filled_circle_mut(frame, (x, y), 6, CORNER_YELLOW);
            draw_text(frame, x + 8, y - 8 - line_height(s), s, CORNER_YELLOW, name);
        }
        draw_text(frame, 20, 20, s * 2, CORNER_YELLOW, "TABLE CALIBRATED");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calibration() -> Calibration {
        Calibration::from_points(&[[20.0, 20.0], [140.0, 20.0], [150.0, 100.0], [10.0, 100.0]]).unwrap()
    }

    #[test]
    fn test_banner_only_at_start() {
        let overlay = Overlay::new(&calibration(), 30.0, 120);
        assert_eq!(overlay.banner_frames, 60);

        let mut early = RgbImage::new(160, 120);
        overlay.draw(&mut early, 0, None);
        let mut late = RgbImage::new(160, 120);
        overlay.draw(&mut late, 60, None);

        // Corner marker at TL only in the early frame
        assert_eq!(*early.get_pixel(20, 22), CORNER_YELLOW);
        assert_ne!(*late.get_pixel(20, 22), CORNER_YELLOW);
    }

    #[test]
    fn test_detection_and_bounces_drawn() {
        let mut overlay = Overlay::new(&calibration(), 30.0, 120);
        overlay.add_bounce((80.0, 60.0));
        assert_eq!(overlay.bounce_count(), 1);

        let det = BallDetection {
            x1: 40.0,
            y1: 50.0,
            x2: 50.0,
            y2: 60.0,
            class_id: 0,
            confidence: 0.8,
        };
        let mut frame = RgbImage::new(160, 120);
        overlay.draw(&mut frame, 100, Some(&det));

        assert_eq!(*frame.get_pixel(40, 55), BALL_GREEN);
        assert_eq!(*frame.get_pixel(45, 55), TABLE_CYAN);
        assert_eq!(*frame.get_pixel(80, 60), BOUNCE_RED);
    }
}
