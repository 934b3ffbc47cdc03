//! FFmpeg invocations that write image files.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult, Tool};

/// Diagnostic stderr lines kept for error reports.
const STDERR_TAIL_LINES: usize = 20;

/// An FFmpeg invocation reading one video and writing image output.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    input: PathBuf,
    output: PathBuf,
    filters: Vec<String>,
    max_frames: Option<u32>,
    jpeg_quality: Option<u8>,
    extra: Vec<String>,
}

impl FfmpegCommand {
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            filters: Vec::new(),
            max_frames: None,
            jpeg_quality: None,
            extra: Vec::new(),
        }
    }

    /// Keep frames `0, step, 2*step, ...` and number the output sequentially.
    pub fn every_nth_frame(mut self, step: u32) -> Self {
        self.filters.push(format!("select=not(mod(n\\,{}))", step.max(1)));
        self.extra.extend(["-vsync", "vfr", "-start_number", "1"].map(String::from));
        self
    }

    pub fn first_frame_only(mut self) -> Self {
        self.max_frames = Some(1);
        self
    }

    /// `-q:v` for JPEG output; 2 is near lossless.
    pub fn jpeg_quality(mut self, q: u8) -> Self {
        self.jpeg_quality = Some(q);
        self
    }

    pub fn args(&self) -> Vec<String> {
        let mut args: Vec<String> = ["-hide_banner", "-nostdin", "-y", "-v", "error", "-progress", "pipe:2"]
            .map(String::from)
            .to_vec();
        args.extend(["-i".to_string(), self.input.to_string_lossy().into_owned()]);
        if !self.filters.is_empty() {
            args.extend(["-vf".to_string(), self.filters.join(",")]);
        }
        if let Some(n) = self.max_frames {
            args.extend(["-frames:v".to_string(), n.to_string()]);
        }
        if let Some(q) = self.jpeg_quality {
            args.extend(["-q:v".to_string(), q.to_string()]);
        }
        args.extend(self.extra.iter().cloned());
        args.push(self.output.to_string_lossy().into_owned());
        args
    }
}

/// What FFmpeg reported on its `-progress` channel.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunReport {
    pub frames: u64,
    pub out_time_ms: i64,
    pub finished: bool,
}

impl RunReport {
    /// Fold one `key=value` progress line in. Returns true at the end of
    /// a progress block.
    fn apply(&mut self, line: &str) -> bool {
        let Some((key, value)) = line.trim().split_once('=') else {
            return false;
        };
        match key {
            "frame" => self.frames = value.parse().unwrap_or(self.frames),
            // Both keys are microseconds in current FFmpeg releases
            "out_time_us" | "out_time_ms" => {
                if let Ok(us) = value.parse::<i64>() {
                    self.out_time_ms = us / 1000;
                }
            }
            "progress" => {
                self.finished = value == "end";
                return true;
            }
            _ => {}
        }
        false
    }
}

fn is_progress_line(line: &str) -> bool {
    line.trim()
        .split_once('=')
        .is_some_and(|(key, _)| !key.is_empty() && key.bytes().all(|b| b.is_ascii_lowercase() || b == b'_'))
}

/// Bounded buffer of FFmpeg's diagnostic output.
#[derive(Debug, Default)]
struct StderrTail(VecDeque<String>);

impl StderrTail {
    fn push(&mut self, line: String) {
        if self.0.len() == STDERR_TAIL_LINES {
            self.0.pop_front();
        }
        self.0.push_back(line);
    }

    fn joined(&self) -> Option<String> {
        (!self.0.is_empty()).then(|| self.0.iter().cloned().collect::<Vec<_>>().join("\n"))
    }
}

/// Runs [`FfmpegCommand`]s, optionally bounded by a timeout.
#[derive(Debug, Default)]
pub struct FfmpegRunner {
    timeout: Option<Duration>,
}

impl FfmpegRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Some(Duration::from_secs(secs));
        self
    }

    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<RunReport> {
        let ffmpeg = Tool::Ffmpeg.locate()?;
        let args = cmd.args();
        debug!("Running ffmpeg {}", args.join(" "));

        let mut child = Command::new(ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::internal("FFmpeg stderr not captured"))?;

        let reader = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            let mut report = RunReport::default();
            let mut tail = StderrTail::default();
            while let Ok(Some(line)) = lines.next_line().await {
                if is_progress_line(&line) {
                    if report.apply(&line) && !report.finished {
                        debug!(frame = report.frames, out_time_ms = report.out_time_ms, "FFmpeg progress");
                    }
                } else if !line.trim().is_empty() {
                    tail.push(line);
                }
            }
            (report, tail)
        });

        let status = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => status?,
                Err(_) => {
                    warn!(timeout_secs = limit.as_secs(), "FFmpeg timed out, killing process");
                    let _ = child.kill().await;
                    return Err(MediaError::Timeout(limit.as_secs()));
                }
            },
            None => child.wait().await?,
        };

        let (report, tail) = reader.await.unwrap_or_default();
        if status.success() {
            return Ok(report);
        }
        Err(MediaError::FfmpegFailed {
            message: match status.code() {
                Some(code) => format!("exit status {}", code),
                None => "terminated by signal".to_string(),
            },
            stderr: tail.joined(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sampling_command() {
        let args = FfmpegCommand::new("input.mp4", "frames/%06d.jpg")
            .every_nth_frame(5)
            .jpeg_quality(2)
            .args();

        let vf = args.iter().position(|a| a == "-vf").unwrap();
        assert_eq!(args[vf + 1], "select=not(mod(n\\,5))");
        assert!(args.windows(2).any(|w| w == ["-start_number", "1"]));
        assert!(args.windows(2).any(|w| w == ["-q:v", "2"]));
        assert_eq!(args.last().map(String::as_str), Some("frames/%06d.jpg"));
    }

    #[test]
    fn test_first_frame_command() {
        let args = FfmpegCommand::new("in.mp4", "out.jpg").first_frame_only().args();
        let input = args.iter().position(|a| a == "-i").unwrap();
        assert_eq!(args[input + 1], "in.mp4");
        assert!(args.windows(2).any(|w| w == ["-frames:v", "1"]));
        assert!(!args.contains(&"-vf".to_string()));
    }

    #[test]
    fn test_report_folds_progress_blocks() {
        let mut report = RunReport::default();
        assert!(!report.apply("frame=120"));
        assert!(!report.apply("out_time_us=5000000"));
        assert!(report.apply("progress=continue"));
        assert_eq!(report.frames, 120);
        assert_eq!(report.out_time_ms, 5000);
        assert!(!report.finished);

        assert!(report.apply("progress=end"));
        assert!(report.finished);
    }

    #[test]
    fn test_progress_line_detection() {
        assert!(is_progress_line("out_time_us=123"));
        assert!(!is_progress_line("[mov,mp4] moov atom not found"));
        assert!(!is_progress_line("input.mp4: Invalid data found"));
    }

    #[test]
    fn test_stderr_tail_is_bounded() {
        let mut tail = StderrTail::default();
        for i in 0..30 {
            tail.push(format!("line {}", i));
        }
        let joined = tail.joined().unwrap();
        assert!(joined.starts_with("line 10\n"));
        assert!(joined.ends_with("line 29"));
        assert!(StderrTail::default().joined().is_none());
    }
}
