//! One decoding pass over an analysis video.
//!
//! Frames are decoded by FFmpeg, the ball detector runs on a blocking worker,
//! detections are projected onto the table and fed to the streaming bounce
//! detector, and every annotated frame goes straight to the preview encoder.
//! The CSV, heatmap and summary are written once the video is exhausted.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use image::RgbImage;
use tracing::{debug, info};

use ttball_media::{BallDetection, BallDetector, FrameReader, PreviewWriter};
use ttball_models::analysis::files;
use ttball_models::{AnalysisSummary, BounceRecord, Calibration, VideoSummary};

use crate::bounce::{BounceDetector, TrackPoint, FALLBACK_FPS};
use crate::error::{AnalysisError, AnalysisResult};
use crate::geometry::Homography;
use crate::heatmap::Heatmap;
use crate::overlay::Overlay;
use crate::report::{write_bounces_csv, write_summary, TrackStats};

const PROGRESS_EVERY_FRAMES: u64 = 250;

/// Everything one run needs.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisInput<'a> {
    pub video: &'a Path,
    pub output_dir: &'a Path,
    pub calibration: &'a Calibration,
    pub video_info: VideoSummary,
    /// Detector confidence threshold
    pub confidence: f32,
}

/// Paths and statistics produced by a run.
#[derive(Debug, Clone)]
pub struct AnalysisOutputs {
    pub heatmap: PathBuf,
    pub csv: PathBuf,
    pub preview: PathBuf,
    pub summary_path: PathBuf,
    pub summary: AnalysisSummary,
    pub bounces: Vec<BounceRecord>,
}

/// Detector plus the per-frame loop.
#[derive(Clone)]
pub struct AnalysisPipeline {
    detector: Arc<dyn BallDetector>,
}

impl AnalysisPipeline {
    pub fn new(detector: Arc<dyn BallDetector>) -> Self {
        Self { detector }
    }

    pub async fn run(&self, input: AnalysisInput<'_>) -> AnalysisResult<AnalysisOutputs> {
        let started = Instant::now();
        let homography = Homography::from_calibration(input.calibration)?;

        let info = input.video_info;
        let fps = if info.fps.is_finite() && info.fps > 0.0 {
            info.fps
        } else {
            FALLBACK_FPS
        };

        let out = |name: &str| input.output_dir.join(name);
        let preview_path = out(files::PREVIEW);

        let mut reader = FrameReader::open(input.video, info.width, info.height)?;
        let mut writer = PreviewWriter::create(&preview_path, info.width, info.height, fps)?;

        let mut overlay = Overlay::new(input.calibration, fps, info.height);
        let mut bounce_detector = BounceDetector::new(fps);
        let mut stats = TrackStats::default();
        let mut bounces: Vec<BounceRecord> = Vec::new();
        let mut frame_index: u64 = 0;

        while let Some(frame) = reader.next_frame().await? {
            let (mut frame, best) = self.detect_best(frame, input.confidence).await?;

            if let Some(det) = &best {
                let (cx, cy) = det.center();
                let image = (cx as f64, cy as f64);
                let point = TrackPoint {
                    frame: frame_index,
                    image,
                    table: homography.project(image.0, image.1),
                    confidence: det.confidence,
                };
                if let Some(bounce) = bounce_detector.push(point) {
                    debug!(frame = bounce.record.frame, x_m = bounce.record.x_m, y_m = bounce.record.y_m, "Bounce");
                    overlay.add_bounce(bounce.image);
                    bounces.push(bounce.record);
                }
            }
            stats.record_frame(best.as_ref().map(|d| d.confidence));

            overlay.draw(&mut frame, frame_index, best.as_ref());
            writer.write_frame(&frame).await?;

            frame_index += 1;
            if frame_index % PROGRESS_EVERY_FRAMES == 0 {
                debug!(
                    frames = frame_index,
                    total = info.frame_count,
                    detections = stats.frames_with_detection,
                    "Analysis progress"
                );
            }
        }

        reader.finish().await?;
        if frame_index == 0 {
            return Err(AnalysisError::NoFrames);
        }
        writer.finish().await?;

        let heatmap = Heatmap::from_bounces(&bounces);
        let summary = stats.summarize(&bounces, &heatmap, fps);

        let heatmap_path = out(files::HEATMAP);
        let csv_path = out(files::BOUNCES_CSV);
        let summary_path = out(files::SUMMARY);

        let png_path = heatmap_path.clone();
        let png_bounces = bounces.clone();
        tokio::task::spawn_blocking(move || heatmap.save_png(&png_bounces, &png_path))
            .await
            .map_err(|e| AnalysisError::internal(format!("heatmap task failed: {}", e)))??;

        write_bounces_csv(&csv_path, &bounces).await?;
        write_summary(&summary_path, &summary).await?;

        info!(
            frames = summary.frames_processed,
            detections = summary.frames_with_detection,
            bounces = summary.bounce_count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Analysis finished"
        );

        Ok(AnalysisOutputs {
            heatmap: heatmap_path,
            csv: csv_path,
            preview: preview_path,
            summary_path,
            summary,
            bounces,
        })
    }

    /// Run the detector off the async runtime and keep the most confident box.
    async fn detect_best(
        &self,
        frame: RgbImage,
        confidence: f32,
    ) -> AnalysisResult<(RgbImage, Option<BallDetection>)> {
        let detector = Arc::clone(&self.detector);
        let (frame, result) = tokio::task::spawn_blocking(move || {
            let result = detector.detect(&frame, confidence);
            (frame, result)
        })
        .await
        .map_err(|e| AnalysisError::internal(format!("detector task failed: {}", e)))?;

        let best = result?
            .into_iter()
            .filter(|d| d.confidence >= confidence)
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence));
        Ok((frame, best))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use ttball_media::MediaResult;

    /// Returns scripted detections, one entry per call.
    struct ScriptedDetector {
        script: Mutex<Vec<Vec<BallDetection>>>,
    }

    impl BallDetector for ScriptedDetector {
        fn detect(&self, _frame: &RgbImage, _min_confidence: f32) -> MediaResult<Vec<BallDetection>> {
            let mut script = self.script.lock().unwrap();
            Ok(if script.is_empty() { Vec::new() } else { script.remove(0) })
        }
    }

    fn det(cx: f32, cy: f32, confidence: f32) -> BallDetection {
        BallDetection {
            x1: cx - 5.0,
            y1: cy - 5.0,
            x2: cx + 5.0,
            y2: cy + 5.0,
            class_id: 0,
            confidence,
        }
    }

    #[tokio::test]
    async fn test_detect_best_picks_highest_confidence() {
        let detector = ScriptedDetector {
            script: Mutex::new(vec![vec![det(10.0, 10.0, 0.3), det(50.0, 50.0, 0.9), det(70.0, 70.0, 0.5)]]),
        };
        let pipeline = AnalysisPipeline::new(Arc::new(detector));
        let (frame, best) = pipeline.detect_best(RgbImage::new(100, 100), 0.25).await.unwrap();
        assert_eq!(frame.dimensions(), (100, 100));
        assert_eq!(best.unwrap().center(), (50.0, 50.0));
    }

    #[tokio::test]
    async fn test_detect_best_applies_threshold() {
        let detector = ScriptedDetector {
            script: Mutex::new(vec![vec![det(10.0, 10.0, 0.2)]]),
        };
        let pipeline = AnalysisPipeline::new(Arc::new(detector));
        let (_, best) = pipeline.detect_best(RgbImage::new(20, 20), 0.25).await.unwrap();
        assert!(best.is_none());
    }

    #[tokio::test]
    async fn test_malformed_calibration_fails_before_decoding() {
        let detector = ScriptedDetector {
            script: Mutex::new(Vec::new()),
        };
        let pipeline = AnalysisPipeline::new(Arc::new(detector));
        let calibration =
            Calibration::from_points(&[[0.0, 0.0], [10.0, 0.0], [20.0, 0.0], [30.0, 0.0]]).unwrap();
        let dir = tempfile::TempDir::new().unwrap();
        let input = AnalysisInput {
            video: &dir.path().join("missing.mp4"),
            output_dir: dir.path(),
            calibration: &calibration,
            video_info: VideoSummary {
                width: 64,
                height: 48,
                fps: 30.0,
                duration: 1.0,
                frame_count: 30,
            },
            confidence: 0.25,
        };
        assert!(matches!(
            pipeline.run(input).await,
            Err(AnalysisError::MalformedCalibration(_))
        ));
    }

    const CLIP_FRAMES: u32 = 60;

    fn clip_info() -> VideoSummary {
        VideoSummary {
            width: 320,
            height: 240,
            fps: 30.0,
            duration: 2.0,
            frame_count: CLIP_FRAMES as u64,
        }
    }

    /// Table spans x 40..280 and y 40..200 in the image.
    fn rect_calibration() -> Calibration {
        Calibration::from_points(&[[40.0, 40.0], [280.0, 40.0], [280.0, 200.0], [40.0, 200.0]]).unwrap()
    }

    async fn write_clip(path: &Path) {
        let info = clip_info();
        let mut writer = PreviewWriter::create(path, info.width, info.height, info.fps).unwrap();
        for _ in 0..CLIP_FRAMES {
            writer
                .write_frame(&RgbImage::from_pixel(info.width, info.height, image::Rgb([20, 90, 40])))
                .await
                .unwrap();
        }
        writer.finish().await.unwrap();
    }

    async fn run_scripted(script: Vec<Vec<BallDetection>>, dir: &Path) -> AnalysisOutputs {
        let clip = dir.join("clip.mp4");
        write_clip(&clip).await;
        let output_dir = dir.join("out");
        std::fs::create_dir_all(&output_dir).unwrap();

        let pipeline = AnalysisPipeline::new(Arc::new(ScriptedDetector {
            script: Mutex::new(script),
        }));
        let calibration = rect_calibration();
        pipeline
            .run(AnalysisInput {
                video: &clip,
                output_dir: &output_dir,
                calibration: &calibration,
                video_info: clip_info(),
                confidence: 0.25,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    #[ignore = "requires ffmpeg"]
    async fn test_run_without_detections_writes_all_outputs() {
        let dir = tempfile::TempDir::new().unwrap();
        let outputs = run_scripted(Vec::new(), dir.path()).await;

        assert_eq!(
            std::fs::read_to_string(&outputs.csv).unwrap(),
            format!("{}\n", BounceRecord::CSV_HEADER)
        );
        let png = std::fs::read(&outputs.heatmap).unwrap();
        assert!(png.starts_with(b"\x89PNG"));
        assert!(std::fs::metadata(&outputs.preview).unwrap().len() > 0);

        let summary: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&outputs.summary_path).unwrap()).unwrap();
        assert_eq!(summary["bounce_count"], 0);
        assert_eq!(summary["frames_with_detection"], 0);
        assert_eq!(summary["frames_processed"], CLIP_FRAMES);
        assert!(outputs.bounces.is_empty());
    }

    #[tokio::test]
    #[ignore = "requires ffmpeg"]
    async fn test_run_finds_bounces_on_scripted_arc() {
        // Ball is lowest on screen at frames 10 and 40
        let script = (0..CLIP_FRAMES)
            .map(|i| {
                let y = 150.0 - ((i % 30) as f32 - 10.0).abs() * 3.0;
                vec![det(60.0 + 3.0 * i as f32, y, 0.9)]
            })
            .collect();

        let dir = tempfile::TempDir::new().unwrap();
        let outputs = run_scripted(script, dir.path()).await;

        let frames: Vec<u64> = outputs.bounces.iter().map(|b| b.frame).collect();
        assert_eq!(frames, vec![10, 40]);
        let first = outputs.bounces[0];
        assert!((first.x_m - 50.0 / 240.0 * 2.74).abs() < 1e-6);
        assert!((first.y_m - 110.0 / 160.0 * 1.525).abs() < 1e-6);

        let csv = std::fs::read_to_string(&outputs.csv).unwrap();
        let rows: Vec<&str> = csv.lines().collect();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], BounceRecord::CSV_HEADER);
        assert!(rows[1].starts_with("10,0.333,"));

        assert_eq!(outputs.summary.bounce_count, 2);
        assert_eq!(outputs.summary.frames_with_detection, CLIP_FRAMES as u64);
        assert_eq!(outputs.summary.left_half_bounces, 1);
        assert_eq!(outputs.summary.right_half_bounces, 1);
        assert!(std::fs::metadata(&outputs.preview).unwrap().len() > 0);
    }
}
