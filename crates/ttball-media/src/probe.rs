//! FFprobe video information.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

use ttball_models::VideoSummary;

use crate::error::{MediaError, MediaResult, Tool};

/// Fallback when a stream reports no usable frame rate.
pub const DEFAULT_FPS: f64 = 30.0;

/// Video file information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoInfo {
    /// Duration in seconds
    pub duration: f64,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Frame rate (fps)
    pub fps: f64,
    /// Number of frames (reported or estimated from duration)
    pub frame_count: u64,
    /// Video codec
    pub codec: String,
    /// File size in bytes
    pub size: u64,
}

impl VideoInfo {
    pub fn summary(&self) -> VideoSummary {
        VideoSummary {
            width: self.width,
            height: self.height,
            fps: self.fps,
            duration: self.duration,
            frame_count: self.frame_count,
        }
    }
}

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    size: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
}

/// Probe a video file for information.
pub async fn probe_video(path: impl AsRef<Path>) -> MediaResult<VideoInfo> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    let ffprobe = Tool::Ffprobe.locate()?;

    let output = Command::new(ffprobe)
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        debug!(stderr = %String::from_utf8_lossy(&output.stderr).trim(), "ffprobe failed");
        return Err(MediaError::ProbeFailed(format!(
            "cannot open video: {}",
            file_name(path)
        )));
    }

    let probe: FfprobeOutput = serde_json::from_slice(&output.stdout)?;
    video_info_from_probe(probe, path)
}

fn video_info_from_probe(probe: FfprobeOutput, path: &Path) -> MediaResult<VideoInfo> {
    let video_stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "video")
        .ok_or_else(|| MediaError::InvalidVideo(format!("no video stream in {}", file_name(path))))?;

    let width = video_stream.width.unwrap_or(0);
    let height = video_stream.height.unwrap_or(0);
    if width == 0 || height == 0 {
        return Err(MediaError::InvalidVideo(format!(
            "{} has no frame size",
            file_name(path)
        )));
    }

    let duration = probe
        .format
        .duration
        .as_deref()
        .or(video_stream.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    let size = probe
        .format
        .size
        .as_deref()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0);

    let fps = video_stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .or_else(|| video_stream.r_frame_rate.as_deref().and_then(parse_frame_rate))
        .unwrap_or(DEFAULT_FPS);

    let frame_count = video_stream
        .nb_frames
        .as_deref()
        .and_then(|n| n.parse::<u64>().ok())
        .filter(|n| *n > 0)
        .unwrap_or_else(|| (duration * fps).round().max(0.0) as u64);

    Ok(VideoInfo {
        duration,
        width,
        height,
        fps,
        frame_count,
        codec: video_stream.codec_name.clone().unwrap_or_default(),
        size,
    })
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Parse frame rate string (e.g., "30/1" or "29.97"). Zero rates yield `None`.
pub fn parse_frame_rate(s: &str) -> Option<f64> {
    let rate = if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den <= 0.0 {
            return None;
        }
        num / den
    } else {
        s.parse().ok()?
    };
    (rate.is_finite() && rate > 0.0).then_some(rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frame_rate() {
        assert!((parse_frame_rate("30/1").unwrap() - 30.0).abs() < 0.01);
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert!((parse_frame_rate("29.97").unwrap() - 29.97).abs() < 0.01);
        assert!(parse_frame_rate("0/0").is_none());
        assert!(parse_frame_rate("0/1").is_none());
    }

    #[test]
    fn test_info_from_probe_json() {
        let json = r#"{
            "format": {"duration": "12.500000", "size": "1048576"},
            "streams": [
                {"codec_type": "audio", "codec_name": "aac"},
                {"codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080,
                 "avg_frame_rate": "0/0", "r_frame_rate": "60/1", "nb_frames": "750"}
            ]
        }"#;
        let probe: FfprobeOutput = serde_json::from_str(json).unwrap();
        let info = video_info_from_probe(probe, Path::new("rally.mp4")).unwrap();
        assert_eq!(info.width, 1920);
        assert_eq!(info.fps, 60.0);
        assert_eq!(info.frame_count, 750);
        assert_eq!(info.summary().duration, 12.5);
    }

    #[test]
    fn test_frame_count_estimated_from_duration() {
        let json = r#"{
            "format": {"duration": "2.0"},
            "streams": [{"codec_type": "video", "width": 640, "height": 360, "avg_frame_rate": "25/1"}]
        }"#;
        let probe: FfprobeOutput = serde_json::from_str(json).unwrap();
        let info = video_info_from_probe(probe, Path::new("a.mov")).unwrap();
        assert_eq!(info.frame_count, 50);
    }

    #[test]
    fn test_no_video_stream() {
        let json = r#"{"format": {}, "streams": [{"codec_type": "audio"}]}"#;
        let probe: FfprobeOutput = serde_json::from_str(json).unwrap();
        assert!(matches!(
            video_info_from_probe(probe, Path::new("a.m4a")),
            Err(MediaError::InvalidVideo(_))
        ));
    }
}
