//! Frame extraction for labeling tasks and calibration.

use std::path::Path;
use tracing::{debug, info};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};

/// Native rate assumed when a stream reports none.
pub const FALLBACK_NATIVE_FPS: f64 = 25.0;

/// Keep every `step`-th frame so that roughly `fps` frames per second remain.
///
/// `step = max(round(native_fps / max(1, fps)), 1)`, rounding halves to even.
pub fn frame_step(native_fps: f64, fps: u32) -> u32 {
    let native = if native_fps.is_finite() && native_fps > 0.0 {
        native_fps
    } else {
        FALLBACK_NATIVE_FPS
    };
    let step = (native / fps.max(1) as f64).round_ties_even();
    (step as u32).max(1)
}

/// Write every `step`-th frame of `video` to `out_dir` as `000001.jpg`,
/// `000002.jpg`, ... and return the number of frames written.
pub async fn extract_frames(
    video: impl AsRef<Path>,
    out_dir: impl AsRef<Path>,
    native_fps: f64,
    fps: u32,
) -> MediaResult<u32> {
    let video = video.as_ref();
    let out_dir = out_dir.as_ref();
    tokio::fs::create_dir_all(out_dir).await?;

    let step = frame_step(native_fps, fps);
    let cmd = FfmpegCommand::new(video, out_dir.join("%06d.jpg"))
        .every_nth_frame(step)
        .jpeg_quality(2);
    let report = FfmpegRunner::new().run(&cmd).await?;
    debug!(decoded = report.frames, "FFmpeg finished sampling");

    let saved = count_jpegs(out_dir).await?;
    info!(
        video = %video.display(),
        step = step,
        saved = saved,
        "Extracted frames"
    );
    Ok(saved)
}

/// Write the first frame of `video` as a JPEG.
pub async fn extract_first_frame(video: impl AsRef<Path>, output: impl AsRef<Path>) -> MediaResult<()> {
    let output = output.as_ref();
    let cmd = FfmpegCommand::new(video.as_ref(), output)
        .first_frame_only()
        .jpeg_quality(2);

    FfmpegRunner::new().with_timeout(60).run(&cmd).await?;

    if !output.exists() {
        return Err(MediaError::InvalidVideo(
            "could not read the first frame".to_string(),
        ));
    }
    Ok(())
}

async fn count_jpegs(dir: &Path) -> MediaResult<u32> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut count = 0;
    while let Some(entry) = entries.next_entry().await? {
        if entry.path().extension().is_some_and(|e| e == "jpg") {
            count += 1;
        }
    }
    Ok(count)
}
