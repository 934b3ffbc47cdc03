//! Ball detection.
//!
//! `BallDetector` is the seam the analysis pipeline depends on;
//! `OnnxBallDetector` is the production implementation.

pub mod ball_detector;

pub use ball_detector::{BallDetection, BallDetector, BallDetectorConfig, OnnxBallDetector};
