//! Bounce classification over the ball track.
//!
//! A detection is a bounce when the ball is lowest on screen (image `y` is a
//! strict local maximum over neighbouring detections), the detection is
//! confident enough, it projects onto the table, and enough time has passed
//! since the previous bounce.

use std::collections::VecDeque;

use ttball_models::BounceRecord;

use crate::geometry::inside_table;

/// Frame rate assumed when the video reports none.
pub const FALLBACK_FPS: f64 = 30.0;

/// One detection on the track, in frame order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackPoint {
    pub frame: u64,
    /// Ball centre in image pixels
    pub image: (f64, f64),
    /// Ball centre projected to table metres
    pub table: (f64, f64),
    pub confidence: f32,
}

/// Rules used to accept a local maximum as a bounce.
#[derive(Debug, Clone, Copy)]
pub struct BounceRules {
    pub min_confidence: f32,
    pub table_margin_m: f64,
    pub min_gap_s: f64,
}

impl Default for BounceRules {
    fn default() -> Self {
        Self {
            min_confidence: 0.15,
            table_margin_m: 0.05,
            min_gap_s: 0.25,
        }
    }
}

/// A confirmed bounce with the image position it was seen at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounce {
    pub record: BounceRecord,
    pub image: (f64, f64),
}

/// Streaming bounce detector.
///
/// Feed detections in frame order with [`push`](Self::push); the middle of
/// the last three samples is judged as soon as the third arrives.
#[derive(Debug)]
pub struct BounceDetector {
    rules: BounceRules,
    fps: f64,
    min_gap_frames: u64,
    window: VecDeque<TrackPoint>,
    last_bounce: Option<u64>,
}

impl BounceDetector {
    pub fn new(fps: f64) -> Self {
        Self::with_rules(fps, BounceRules::default())
    }

    pub fn with_rules(fps: f64, rules: BounceRules) -> Self {
        let fps = if fps.is_finite() && fps > 0.0 { fps } else { FALLBACK_FPS };
        Self {
            rules,
            fps,
            min_gap_frames: (rules.min_gap_s * fps).floor() as u64,
            window: VecDeque::with_capacity(3),
            last_bounce: None,
        }
    }

    pub fn min_gap_frames(&self) -> u64 {
        self.min_gap_frames
    }

    /// Add the next detection; returns a bounce if the previous sample is one.
    pub fn push(&mut self, point: TrackPoint) -> Option<Bounce> {
        if self.window.len() == 3 {
            self.window.pop_front();
        }
        self.window.push_back(point);
        if self.window.len() < 3 {
            return None;
        }

        let (prev, mid, next) = (self.window[0], self.window[1], self.window[2]);
        if !(prev.image.1 < mid.image.1 && mid.image.1 > next.image.1) {
            return None;
        }
        if mid.confidence < self.rules.min_confidence {
            return None;
        }
        if !inside_table(mid.table, self.rules.table_margin_m) {
            return None;
        }
        if let Some(last) = self.last_bounce {
            if mid.frame.saturating_sub(last) < self.min_gap_frames {
                return None;
            }
        }

        self.last_bounce = Some(mid.frame);
        Some(Bounce {
            record: BounceRecord {
                frame: mid.frame,
                time_s: mid.frame as f64 / self.fps,
                x_m: mid.table.0,
                y_m: mid.table.1,
                conf: mid.confidence,
            },
            image: mid.image,
        })
    }
}

/// Batch form over a complete track.
pub fn find_bounces(track: &[TrackPoint], fps: f64) -> Vec<Bounce> {
    find_bounces_with(track, fps, BounceRules::default())
}

pub fn find_bounces_with(track: &[TrackPoint], fps: f64, rules: BounceRules) -> Vec<Bounce> {
    let fps = if fps.is_finite() && fps > 0.0 { fps } else { FALLBACK_FPS };
    let min_gap = (rules.min_gap_s * fps).floor() as u64;
    let mut last_bounce: Option<u64> = None;
    let mut bounces = Vec::new();

    for w in track.windows(3) {
        let (prev, mid, next) = (&w[0], &w[1], &w[2]);
        let is_peak = prev.image.1 < mid.image.1 && mid.image.1 > next.image.1;
        let gap_ok = last_bounce.map_or(true, |last| mid.frame.saturating_sub(last) >= min_gap);

        if is_peak
            && mid.confidence >= rules.min_confidence
            && inside_table(mid.table, rules.table_margin_m)
            && gap_ok
        {
            last_bounce = Some(mid.frame);
            bounces.push(Bounce {
                record: BounceRecord {
                    frame: mid.frame,
                    time_s: mid.frame as f64 / fps,
                    x_m: mid.table.0,
                    y_m: mid.table.1,
                    conf: mid.confidence,
                },
                image: mid.image,
            });
        }
    }
    bounces
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pt(frame: u64, y: f64, conf: f32) -> TrackPoint {
        TrackPoint {
            frame,
            image: (100.0, y),
            table: (1.0, 0.5),
            confidence: conf,
        }
    }

    #[test]
    fn test_single_local_maximum() {
        let track = [pt(0, 100.0, 0.9), pt(1, 200.0, 0.9), pt(2, 150.0, 0.9)];
        let bounces = find_bounces(&track, 30.0);
        assert_eq!(bounces.len(), 1);
        assert_eq!(bounces[0].record.frame, 1);
        assert!((bounces[0].record.time_s - 1.0 / 30.0).abs() < 1e-9);
        assert_eq!(bounces[0].record.x_m, 1.0);
    }

    #[test]
    fn test_plateau_is_not_a_bounce() {
        let track = [pt(0, 100.0, 0.9), pt(1, 200.0, 0.9), pt(2, 200.0, 0.9), pt(3, 100.0, 0.9)];
        assert!(find_bounces(&track, 30.0).is_empty());
    }

    #[test]
    fn test_low_confidence_rejected() {
        let track = [pt(0, 100.0, 0.9), pt(1, 200.0, 0.1), pt(2, 150.0, 0.9)];
        assert!(find_bounces(&track, 30.0).is_empty());
    }

    #[test]
    fn test_off_table_rejected() {
        let mut mid = pt(1, 200.0, 0.9);
        mid.table = (3.0, 0.5);
        let track = [pt(0, 100.0, 0.9), mid, pt(2, 150.0, 0.9)];
        assert!(find_bounces(&track, 30.0).is_empty());
    }

    #[test]
    fn test_min_gap_between_bounces() {
        // int(0.25 * 30) = 7 frames
        let track = [
            pt(0, 100.0, 0.9),
            pt(2, 200.0, 0.9),
            pt(4, 100.0, 0.9),
            pt(6, 200.0, 0.9), // 4 frames after the first bounce: too soon
            pt(8, 100.0, 0.9),
            pt(10, 200.0, 0.9), // 8 frames after: accepted
            pt(12, 100.0, 0.9),
        ];
        let frames: Vec<u64> = find_bounces(&track, 30.0)
            .iter()
            .map(|b| b.record.frame)
            .collect();
        assert_eq!(frames, vec![2, 10]);
    }

    #[test]
    fn test_gap_uses_floor_of_fps() {
        assert_eq!(BounceDetector::new(30.0).min_gap_frames(), 7);
        assert_eq!(BounceDetector::new(25.0).min_gap_frames(), 6);
        assert_eq!(BounceDetector::new(0.0).min_gap_frames(), 7);
    }

    #[test]
    fn test_streaming_matches_batch() {
        let ys = [10.0, 50.0, 30.0, 80.0, 20.0, 90.0, 95.0, 40.0, 60.0, 10.0];
        let track: Vec<TrackPoint> = ys
            .iter()
            .enumerate()
            .map(|(i, y)| pt(i as u64 * 5, *y, 0.8))
            .collect();

        let mut streaming = BounceDetector::new(30.0);
        let streamed: Vec<Bounce> = track.iter().filter_map(|p| streaming.push(*p)).collect();
        assert_eq!(streamed, find_bounces(&track, 30.0));
        assert!(!streamed.is_empty());
    }

    #[test]
    fn test_short_track() {
        assert!(find_bounces(&[pt(0, 1.0, 0.9), pt(1, 2.0, 0.9)], 30.0).is_empty());
    }
}
