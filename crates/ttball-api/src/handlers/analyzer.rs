//! Analyzer handlers: ingest a rally video, calibrate the table, run the
//! bounce analysis and serve its outputs.

use std::path::Path;
use std::time::Instant;

use axum::extract::{Multipart, Request, State};
use axum::response::Response;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use validator::Validate;

use ttball_analysis::AnalysisInput;
use ttball_media::{download_video, extract_first_frame, move_file, probe_video, Tool};
use ttball_models::analysis::files;
use ttball_models::{AnalysisMeta, AnalysisOutcome, Calibration, EntityId, IngestSource, VideoSummary};

use crate::error::{ApiError, ApiResult};
use crate::extract::{EntityPath, FormBody, JsonBody, OptionalForm};
use crate::handlers::files::serve_file;
use crate::metrics;
use crate::security::validate_video_url;
use crate::state::AppState;
use crate::upload::{read_upload, DownloadDir};

/// Video extensions the analyzer accepts.
pub const ANALYZER_EXTENSIONS: &[&str] = &[".mp4", ".mov", ".avi", ".m4v"];

const DEFAULT_CONFIDENCE: f32 = 0.25;

/// Health response with model and tool availability.
#[derive(Serialize)]
pub struct AnalyzerHealth {
    pub status: &'static str,
    pub model_loaded: bool,
    pub model_path: String,
    pub ffmpeg: bool,
    pub ffprobe: bool,
    pub yt_dlp: bool,
}

pub async fn health(State(state): State<AppState>) -> Json<AnalyzerHealth> {
    Json(AnalyzerHealth {
        status: "ok",
        model_loaded: state.model_loaded(),
        model_path: state.config.model_path.display().to_string(),
        ffmpeg: Tool::Ffmpeg.available(),
        ffprobe: Tool::Ffprobe.available(),
        yt_dlp: Tool::YtDlp.available(),
    })
}

#[derive(Serialize)]
pub struct AnalysisCreated {
    pub analysis_id: EntityId,
    pub video_info: VideoSummary,
    pub meta: AnalysisMeta,
}

/// Multipart upload with a single `file` field.
pub async fn upload(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<AnalysisCreated>> {
    let mut form = read_upload(multipart, state.analyses.root(), ANALYZER_EXTENSIONS).await?;
    let upload = form.take_file()?;
    info!(filename = %upload.filename, bytes = upload.bytes, "Analyzer upload received");

    let created = ingest_video(
        &state,
        upload.path(),
        &upload.extension,
        IngestSource::Upload,
        Some(upload.filename.clone()),
        None,
    )
    .await?;
    Ok(Json(created))
}

#[derive(Debug, Deserialize)]
pub struct YoutubeForm {
    pub url: String,
}

pub async fn youtube(
    State(state): State<AppState>,
    FormBody(form): FormBody<YoutubeForm>,
) -> ApiResult<Json<AnalysisCreated>> {
    let url = validate_video_url(&form.url)
        .into_result()
        .map_err(ApiError::BadRequest)?;

    let staging = DownloadDir::create(state.analyses.root()).await?;
    let started = Instant::now();
    let video = download_video(&url, staging.path()).await?;
    metrics::record_download_duration(started.elapsed().as_secs_f64());

    let extension = video
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .unwrap_or_else(|| ".mp4".to_string());

    let created = ingest_video(&state, &video, &extension, IngestSource::Youtube, None, Some(url)).await?;
    Ok(Json(created))
}

/// Probe and size-check the staged video, then create the analysis with
/// `video.<ext>`, `first_frame.jpg` and `meta.json`.
async fn ingest_video(
    state: &AppState,
    staged: &Path,
    extension: &str,
    source: IngestSource,
    filename: Option<String>,
    url: Option<String>,
) -> ApiResult<AnalysisCreated> {
    let info = probe_video(staged).await?;
    let max = state.config.analyzer_max_duration_secs;
    if info.duration > max {
        return Err(ApiError::bad_request(format!(
            "Video too long ({:.0}s). Maximum is {:.0}s",
            info.duration, max
        )));
    }

    let id = state.analyses.create().await?;
    let result = async {
        let video = state.analyses.file_path(&id, &format!("video{}", extension));
        move_file(staged, &video).await?;
        extract_first_frame(&video, state.analyses.file_path(&id, files::FIRST_FRAME)).await?;
        let meta = AnalysisMeta::new(id.clone(), source, filename, url, info.summary());
        state.analyses.write_meta(&meta).await?;
        Ok::<_, ApiError>(meta)
    }
    .await;

    let meta = match result {
        Ok(meta) => meta,
        Err(e) => {
            warn!(analysis_id = %id, error = %e, "Ingest failed, removing analysis");
            if let Err(cleanup) = state.analyses.discard(&id).await {
                warn!(analysis_id = %id, error = %cleanup, "Failed to remove incomplete analysis");
            }
            return Err(e);
        }
    };

    metrics::record_ingest("analyzer", source.as_str(), 0);
    info!(
        analysis_id = %id,
        source = source.as_str(),
        width = info.width,
        height = info.height,
        duration_s = info.duration,
        "Analysis created"
    );

    Ok(AnalysisCreated {
        analysis_id: id,
        video_info: meta.video_info,
        meta,
    })
}

#[derive(Serialize)]
pub struct AnalysisListResponse {
    pub analyses: Vec<AnalysisMeta>,
}

pub async fn list_analyses(State(state): State<AppState>) -> ApiResult<Json<AnalysisListResponse>> {
    let analyses = state.analyses.list().await?;
    Ok(Json(AnalysisListResponse { analyses }))
}

/// First frame for calibration; extracted on demand if it is missing.
pub async fn first_frame(
    State(state): State<AppState>,
    EntityPath(id): EntityPath,
    request: Request,
) -> ApiResult<Response> {
    state.analyses.require(&id).await?;
    let path = state.analyses.file_path(&id, files::FIRST_FRAME);
    if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
        let video = state.analyses.video_path(&id).await?;
        info!(analysis_id = %id, "Extracting first frame on demand");
        extract_first_frame(&video, &path).await?;
    }
    serve_file(&path, "image/jpeg", None, request).await
}

#[derive(Debug, Deserialize)]
pub struct CalibrateRequest {
    pub points: Vec<[f64; 2]>,
}

#[derive(Serialize)]
pub struct CalibrateResponse {
    pub success: bool,
    pub points: [[f64; 2]; 4],
}

/// Store the four table corners (TL, TR, BR, BL) in image pixels.
pub async fn calibrate(
    State(state): State<AppState>,
    EntityPath(id): EntityPath,
    JsonBody(req): JsonBody<CalibrateRequest>,
) -> ApiResult<Json<CalibrateResponse>> {
    let meta = state.analyses.read_meta(&id).await?;
    let calibration = Calibration::from_points(&req.points)?;
    calibration.check_bounds(meta.video_info.width, meta.video_info.height)?;
    state.analyses.save_calibration(&id, &calibration).await?;

    Ok(Json(CalibrateResponse {
        success: true,
        points: *calibration.points(),
    }))
}

#[derive(Debug, Deserialize, Validate)]
pub struct AnalyzeForm {
    #[serde(default = "default_confidence")]
    #[validate(range(exclusive_min = 0.0, max = 1.0, message = "confidence must be in (0, 1]"))]
    pub confidence: f32,
}

fn default_confidence() -> f32 {
    DEFAULT_CONFIDENCE
}

impl Default for AnalyzeForm {
    fn default() -> Self {
        Self {
            confidence: DEFAULT_CONFIDENCE,
        }
    }
}

/// Run detection, bounce tracking and rendering inside the request.
pub async fn analyze(
    State(state): State<AppState>,
    EntityPath(id): EntityPath,
    OptionalForm(form): OptionalForm<AnalyzeForm>,
) -> ApiResult<Json<AnalysisOutcome>> {
    form.validate()?;

    let mut meta = state.analyses.read_meta(&id).await?;
    let video = state.analyses.video_path(&id).await?;
    let calibration = state
        .analyses
        .load_calibration(&id)
        .await?
        .ok_or_else(|| ApiError::bad_request("Table calibration missing"))?;
    let pipeline = state
        .pipeline
        .as_ref()
        .ok_or_else(|| ApiError::internal("Ball detection model not loaded"))?;

    let output_dir = state.analyses.analysis_dir(&id);
    let input = AnalysisInput {
        video: &video,
        output_dir: &output_dir,
        calibration: &calibration,
        video_info: meta.video_info,
        confidence: form.confidence,
    };

    info!(analysis_id = %id, confidence = form.confidence, "Starting analysis");
    let started = Instant::now();
    let timeout = state.config.analysis_timeout;

    let outputs = match tokio::time::timeout(timeout, pipeline.run(input)).await {
        Ok(Ok(outputs)) => outputs,
        Ok(Err(e)) => {
            metrics::record_analysis("failed", started.elapsed().as_secs_f64(), 0);
            return Err(e.into());
        }
        Err(_) => {
            metrics::record_analysis("timeout", started.elapsed().as_secs_f64(), 0);
            return Err(ApiError::Timeout(format!(
                "Analysis exceeded {} seconds",
                timeout.as_secs()
            )));
        }
    };

    let outcome = AnalysisOutcome {
        success: true,
        heatmap: outputs.heatmap.exists(),
        csv: outputs.csv.exists(),
        preview: outputs.preview.exists(),
        confidence: form.confidence,
        summary: outputs.summary,
    };

    meta.analysis_completed = Some(Utc::now());
    meta.analysis_result = Some(outcome.clone());
    state.analyses.write_meta(&meta).await?;

    let elapsed = started.elapsed().as_secs_f64();
    metrics::record_analysis("completed", elapsed, outcome.summary.bounce_count);
    info!(
        analysis_id = %id,
        bounces = outcome.summary.bounce_count,
        frames = outcome.summary.frames_processed,
        elapsed_s = elapsed,
        "Analysis finished"
    );

    Ok(Json(outcome))
}

pub async fn heatmap(
    State(state): State<AppState>,
    EntityPath(id): EntityPath,
    request: Request,
) -> ApiResult<Response> {
    let path = state.analyses.existing_file(&id, files::HEATMAP).await?;
    serve_file(&path, "image/png", None, request).await
}

pub async fn csv(
    State(state): State<AppState>,
    EntityPath(id): EntityPath,
    request: Request,
) -> ApiResult<Response> {
    let path = state.analyses.existing_file(&id, files::BOUNCES_CSV).await?;
    serve_file(&path, "text/csv", Some(files::BOUNCES_CSV), request).await
}

/// Annotated preview; supports `Range` for seeking in the browser player.
pub async fn preview(
    State(state): State<AppState>,
    EntityPath(id): EntityPath,
    request: Request,
) -> ApiResult<Response> {
    let path = state.analyses.existing_file(&id, files::PREVIEW).await?;
    serve_file(&path, "video/mp4", None, request).await
}

pub async fn summary(
    State(state): State<AppState>,
    EntityPath(id): EntityPath,
    request: Request,
) -> ApiResult<Response> {
    let path = state.analyses.existing_file(&id, files::SUMMARY).await?;
    serve_file(&path, "application/json", None, request).await
}
