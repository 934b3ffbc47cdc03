//! Wrappers over the external media tools.
//!
//! - `ffprobe` for stream information
//! - `ffmpeg` for frame extraction, raw frame decoding and preview encoding
//! - `yt-dlp` for YouTube downloads
//! - ONNX Runtime for the ball detector

pub mod command;
pub mod detection;
pub mod download;
pub mod error;
pub mod frames;
pub mod fs_utils;
pub mod probe;
pub mod video_io;

pub use command::{FfmpegCommand, FfmpegRunner, RunReport};
pub use detection::{BallDetection, BallDetector, BallDetectorConfig, OnnxBallDetector};
pub use download::download_video;
pub use error::{MediaError, MediaResult, Tool};
pub use frames::{extract_first_frame, extract_frames, frame_step};
pub use fs_utils::move_file;
pub use probe::{probe_video, VideoInfo};
pub use video_io::{FrameReader, PreviewWriter};
