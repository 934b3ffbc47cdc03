//! Ball detection using a YOLOv8 ONNX export.
//!
//! The model is a single- or multi-class YOLOv8 detector exported to ONNX
//! with output `[1, 4 + classes, candidates]`. Frames are letterboxed into
//! the square model input (aspect kept, grey padding); boxes come back in
//! model input pixels (centre format) and are mapped back to the frame.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use ndarray::Array2;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{Tensor, Value};
use tracing::{debug, info};

use crate::error::{MediaError, MediaResult};

/// Detected ball in frame pixels (corner format).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BallDetection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub class_id: usize,
    pub confidence: f32,
}

impl BallDetection {
    /// Centre point in pixels.
    pub fn center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    /// Intersection over union with another box.
    pub fn iou(&self, other: &BallDetection) -> f32 {
        let inter_w = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let inter_h = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        let intersection = inter_w * inter_h;
        let union = self.area() + other.area() - intersection;
        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }
}

/// Padding colour of the letterbox.
const LETTERBOX_FILL: Rgb<u8> = Rgb([114, 114, 114]);

/// Placement of a frame inside the square model input.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Letterbox {
    scale: f32,
    width: u32,
    height: u32,
    left: u32,
    top: u32,
}

impl Letterbox {
    fn fit(frame_width: u32, frame_height: u32, size: u32) -> Self {
        let scale = (size as f32 / frame_width.max(1) as f32).min(size as f32 / frame_height.max(1) as f32);
        let width = ((frame_width as f32 * scale).round() as u32).clamp(1, size);
        let height = ((frame_height as f32 * scale).round() as u32).clamp(1, size);
        Self {
            scale,
            width,
            height,
            left: (size - width) / 2,
            top: (size - height) / 2,
        }
    }

    /// Square `size` canvas with the scaled frame centred on grey.
    fn render(&self, frame: &RgbImage, size: u32) -> RgbImage {
        let resized = imageops::resize(frame, self.width, self.height, FilterType::Triangle);
        let mut canvas = RgbImage::from_pixel(size, size, LETTERBOX_FILL);
        imageops::replace(&mut canvas, &resized, self.left as i64, self.top as i64);
        canvas
    }

    /// Model input pixels to frame pixels.
    fn to_frame(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.left as f32) / self.scale, (y - self.top as f32) / self.scale)
    }
}

/// Anything that finds balls in an RGB frame.
pub trait BallDetector: Send + Sync {
    /// Detections with confidence >= `min_confidence`, best first.
    fn detect(&self, frame: &RgbImage, min_confidence: f32) -> MediaResult<Vec<BallDetection>>;
}

/// Configuration for the ONNX ball detector.
#[derive(Debug, Clone)]
pub struct BallDetectorConfig {
    /// Path to ONNX model file
    pub model_path: PathBuf,
    /// Square model input size
    pub input_size: u32,
    /// IoU threshold for NMS
    pub nms_threshold: f32,
}

impl Default for BallDetectorConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/ball/best.onnx"),
            input_size: 640,
            nms_threshold: 0.45,
        }
    }
}

/// YOLOv8 ball detector on ONNX Runtime.
pub struct OnnxBallDetector {
    session: Mutex<Session>,
    config: BallDetectorConfig,
}

impl OnnxBallDetector {
    /// Load the model. Fails if the file is missing or cannot be parsed.
    pub fn new(config: BallDetectorConfig) -> MediaResult<Self> {
        if !config.model_path.exists() {
            return Err(MediaError::ModelNotFound(config.model_path.clone()));
        }

        let session = Mutex::new(create_session(&config.model_path)?);
        info!(
            model_path = %config.model_path.display(),
            input_size = config.input_size,
            "Ball detector initialized"
        );

        Ok(Self { session, config })
    }

    /// Letterbox to the model input, normalize to [0, 1] and lay out as NCHW.
    fn preprocess(&self, frame: &RgbImage) -> MediaResult<(Value, Letterbox)> {
        let size = self.config.input_size;
        let letterbox = Letterbox::fit(frame.width(), frame.height(), size);
        let resized = letterbox.render(frame, size);
        let side = size as usize;
        let plane = side * side;

        let mut chw = vec![0f32; 3 * plane];
        for (i, pixel) in resized.pixels().enumerate() {
            chw[i] = pixel[0] as f32 / 255.0;
            chw[plane + i] = pixel[1] as f32 / 255.0;
            chw[2 * plane + i] = pixel[2] as f32 / 255.0;
        }

        let shape = vec![1usize, 3, side, side];
        let tensor = Tensor::from_array((shape, chw.into_boxed_slice()))
            .map(Value::from)
            .map_err(|e| MediaError::detector(format!("Failed to create tensor: {}", e)))?;
        Ok((tensor, letterbox))
    }

    /// Run the session and return `(features, candidates, data)`.
    fn run_inference(&self, input: Value) -> MediaResult<(usize, usize, Vec<f32>)> {
        let mut session = self
            .session
            .lock()
            .map_err(|_| MediaError::internal("Session lock poisoned"))?;

        let outputs = session
            .run(ort::inputs![input])
            .map_err(|e| MediaError::detector(format!("ONNX inference failed: {}", e)))?;

        let output = outputs
            .get("output0")
            .ok_or_else(|| MediaError::detector("Missing output0 tensor"))?;

        let (shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| MediaError::detector(format!("Failed to extract tensor: {}", e)))?;

        let dims: Vec<i64> = shape.iter().copied().collect();
        let (features, candidates) = match dims.as_slice() {
            [1, f, n] | [f, n] => (*f as usize, *n as usize),
            other => {
                return Err(MediaError::detector(format!(
                    "Unexpected output shape {:?}",
                    other
                )))
            }
        };

        Ok((features, candidates, data.to_vec()))
    }
}

impl BallDetector for OnnxBallDetector {
    fn detect(&self, frame: &RgbImage, min_confidence: f32) -> MediaResult<Vec<BallDetection>> {
        let (input, letterbox) = self.preprocess(frame)?;
        let (features, candidates, data) = self.run_inference(input)?;

        let boxes = decode_output(&data, features, candidates, &letterbox, min_confidence)?;
        let kept = non_maximum_suppression(boxes, self.config.nms_threshold);

        debug!(count = kept.len(), "Ball detection completed");
        Ok(kept)
    }
}

/// Decode a `[features, candidates]` YOLOv8 output into frame-pixel boxes.
fn decode_output(
    data: &[f32],
    features: usize,
    candidates: usize,
    letterbox: &Letterbox,
    min_confidence: f32,
) -> MediaResult<Vec<BallDetection>> {
    if features < 5 {
        return Err(MediaError::detector(format!(
            "Output has {} features, need at least 5",
            features
        )));
    }

    // Output is [features, candidates]; transpose to one row per candidate.
    let output = Array2::from_shape_vec((features, candidates), data.to_vec())
        .map_err(|e| MediaError::detector(format!("Failed to reshape output: {}", e)))?;
    let rows = output.t();

    let mut boxes = Vec::new();
    for row in rows.outer_iter() {
        let (class_id, confidence) = row
            .iter()
            .skip(4)
            .copied()
            .enumerate()
            .fold((0, f32::MIN), |best, (c, s)| if s > best.1 { (c, s) } else { best });

        if confidence < min_confidence {
            continue;
        }

        let (cx, cy, w, h) = (row[0], row[1], row[2], row[3]);
        let (x1, y1) = letterbox.to_frame(cx - w / 2.0, cy - h / 2.0);
        let (x2, y2) = letterbox.to_frame(cx + w / 2.0, cy + h / 2.0);
        boxes.push(BallDetection {
            x1,
            y1,
            x2,
            y2,
            class_id,
            confidence,
        });
    }
    Ok(boxes)
}

/// Keep the best box of every overlapping cluster, best first.
fn non_maximum_suppression(mut boxes: Vec<BallDetection>, iou_threshold: f32) -> Vec<BallDetection> {
    boxes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<BallDetection> = Vec::new();
    for candidate in boxes {
        let overlaps = keep
            .iter()
            .any(|k| k.class_id == candidate.class_id && k.iou(&candidate) > iou_threshold);
        if !overlaps {
            keep.push(candidate);
        }
    }
    keep
}

/// Create ONNX Runtime session with automatic execution provider selection.
fn create_session(model_path: &Path) -> MediaResult<Session> {
    let model_bytes = std::fs::read(model_path)
        .map_err(|e| MediaError::internal(format!("Failed to read model file: {}", e)))?;

    let builder = Session::builder()
        .map_err(|e| MediaError::internal(format!("Failed to create session builder: {}", e)))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| MediaError::internal(format!("Failed to set optimization level: {}", e)))?;

    #[cfg(all(target_os = "linux", feature = "cuda"))]
    {
        use ort::execution_providers::CUDAExecutionProvider;
        if let Ok(cuda_builder) = builder
            .clone()
            .with_execution_providers([CUDAExecutionProvider::default().build()])
        {
            if let Ok(session) = cuda_builder.commit_from_memory(&model_bytes) {
                info!("Using CUDA execution provider for ball detection");
                return Ok(session);
            }
        }
        debug!("CUDA execution provider not available, using CPU");
    }

    info!("Using CPU execution provider for ball detection");
    builder
        .commit_from_memory(&model_bytes)
        .map_err(|e| MediaError::internal(format!("Failed to load ONNX model: {}", e)))
}
