//! Raw RGB24 frame streams into and out of FFmpeg.
//!
//! `FrameReader` decodes a video to `rawvideo` on stdout; `PreviewWriter`
//! feeds frames to an H.264 encoder on stdin. Both children are killed when
//! dropped, so abandoning an analysis never leaves FFmpeg running.

use image::RgbImage;
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::{MediaError, MediaResult, Tool};

/// Collect a child's stderr in the background.
fn capture_stderr(child: &mut Child) -> Option<JoinHandle<String>> {
    child.stderr.take().map(|mut stderr| {
        tokio::spawn(async move {
            let mut buf = String::new();
            let _ = stderr.read_to_string(&mut buf).await;
            buf
        })
    })
}

async fn finish_child(
    mut child: Child,
    stderr: Option<JoinHandle<String>>,
    what: &str,
) -> MediaResult<()> {
    let status = child.wait().await?;
    let stderr = match stderr {
        Some(handle) => handle.await.unwrap_or_default(),
        None => String::new(),
    };

    if status.success() {
        Ok(())
    } else {
        Err(MediaError::FfmpegFailed {
            message: format!("{} exited with {}", what, status),
            stderr: (!stderr.trim().is_empty()).then(|| stderr.trim().to_string()),
        })
    }
}

/// Sequential RGB24 frames decoded from a video file.
pub struct FrameReader {
    child: Child,
    stdout: BufReader<ChildStdout>,
    stderr: Option<JoinHandle<String>>,
    width: u32,
    height: u32,
    frames_read: u64,
}

impl FrameReader {
    /// Start decoding `video`, scaling every frame to `width` x `height`.
    pub fn open(video: impl AsRef<Path>, width: u32, height: u32) -> MediaResult<Self> {
        let ffmpeg = Tool::Ffmpeg.locate()?;
        if width == 0 || height == 0 {
            return Err(MediaError::InvalidVideo("frame size is zero".to_string()));
        }

        let mut child = Command::new(ffmpeg)
            .args(["-hide_banner", "-loglevel", "error", "-i"])
            .arg(video.as_ref())
            .args([
                "-vf",
                &format!("scale={}:{}", width, height),
                "-pix_fmt",
                "rgb24",
                "-f",
                "rawvideo",
                "-",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| MediaError::ffmpeg(format!("Failed to spawn FFmpeg: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::ffmpeg("Failed to capture FFmpeg stdout"))?;
        let stderr = capture_stderr(&mut child);

        debug!(video = %video.as_ref().display(), width, height, "Frame reader started");

        Ok(Self {
            child,
            stdout: BufReader::new(stdout),
            stderr,
            width,
            height,
            frames_read: 0,
        })
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    /// Next frame, or `None` at the end of the stream. A trailing partial
    /// frame is treated as the end.
    pub async fn next_frame(&mut self) -> MediaResult<Option<RgbImage>> {
        let mut buf = vec![0u8; self.width as usize * self.height as usize * 3];
        match self.stdout.read_exact(&mut buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        self.frames_read += 1;
        RgbImage::from_raw(self.width, self.height, buf)
            .map(Some)
            .ok_or_else(|| MediaError::internal("Failed to create frame buffer"))
    }

    /// Wait for the decoder to exit and surface its error output on failure.
    pub async fn finish(self) -> MediaResult<u64> {
        let frames = self.frames_read;
        drop(self.stdout);
        finish_child(self.child, self.stderr, "FFmpeg decoder").await?;
        Ok(frames)
    }
}

/// H.264 (yuv420p) mp4 encoder fed with RGB24 frames.
pub struct PreviewWriter {
    child: Child,
    stdin: Option<ChildStdin>,
    stderr: Option<JoinHandle<String>>,
    width: u32,
    height: u32,
    frames_written: u64,
}

impl PreviewWriter {
    /// Start an encoder writing `output` at `fps`.
    pub fn create(output: impl AsRef<Path>, width: u32, height: u32, fps: f64) -> MediaResult<Self> {
        let ffmpeg = Tool::Ffmpeg.locate()?;
        let fps = if fps.is_finite() && fps > 0.0 { fps } else { 30.0 };

        let mut child = Command::new(ffmpeg)
            .args(["-y", "-hide_banner", "-loglevel", "error"])
            .args([
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgb24",
                "-s",
                &format!("{}x{}", width, height),
                "-r",
                &format!("{:.3}", fps),
                "-i",
                "-",
                // yuv420p needs even dimensions
                "-vf",
                "scale=trunc(iw/2)*2:trunc(ih/2)*2",
                "-c:v",
                "libx264",
                "-preset",
                "veryfast",
                "-crf",
                "23",
                "-pix_fmt",
                "yuv420p",
                "-movflags",
                "+faststart",
            ])
            .arg(output.as_ref())
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| MediaError::ffmpeg(format!("Failed to spawn FFmpeg: {}", e)))?;

        let stdin = child.stdin.take();
        let stderr = capture_stderr(&mut child);

        Ok(Self {
            child,
            stdin,
            stderr,
            width,
            height,
            frames_written: 0,
        })
    }

    pub async fn write_frame(&mut self, frame: &RgbImage) -> MediaResult<()> {
        if frame.dimensions() != (self.width, self.height) {
            return Err(MediaError::internal(format!(
                "frame is {}x{}, encoder expects {}x{}",
                frame.width(),
                frame.height(),
                self.width,
                self.height
            )));
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| MediaError::internal("encoder input already closed"))?;
        stdin.write_all(frame.as_raw()).await?;
        self.frames_written += 1;
        Ok(())
    }

    /// Close the input and wait for the encoder to finish the file.
    pub async fn finish(mut self) -> MediaResult<u64> {
        if let Some(mut stdin) = self.stdin.take() {
            stdin.shutdown().await?;
        }
        finish_child(self.child, self.stderr, "FFmpeg encoder").await?;
        Ok(self.frames_written)
    }
}
