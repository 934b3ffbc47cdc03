//! Labeler handlers: ingest videos into frame tasks and record ball clicks.

use std::path::Path;

use axum::extract::{Multipart, Request, State};
use axum::response::Response;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use validator::Validate;

use ttball_media::{download_video, extract_frames, move_file, probe_video};
use ttball_models::{EntityId, TaskMeta};
use ttball_storage::{LabelState, TaskFrames, TaskListing};

use crate::error::{ApiError, ApiResult};
use crate::extract::{EntityPath, FileSegment, FormBody, JsonBody};
use crate::handlers::files::serve_file;
use crate::metrics;
use crate::security::validate_video_url;
use crate::state::AppState;
use crate::upload::{read_upload, DownloadDir};

/// Video extensions the labeler accepts.
pub const LABELER_EXTENSIONS: &[&str] = &[".mp4", ".mov", ".m4v", ".avi", ".mkv"];

const DEFAULT_FPS: u32 = 5;

#[derive(Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
}

pub async fn health() -> Json<StatusResponse> {
    Json(StatusResponse { status: "ok" })
}

#[derive(Serialize)]
pub struct TaskListResponse {
    pub tasks: Vec<TaskListing>,
}

pub async fn list_tasks(State(state): State<AppState>) -> ApiResult<Json<TaskListResponse>> {
    let tasks = state.tasks.list().await?;
    Ok(Json(TaskListResponse { tasks }))
}

/// Frame sampling options shared by both ingest paths.
#[derive(Debug, Deserialize, Validate)]
pub struct IngestOptions {
    #[validate(range(min = 1, max = 60, message = "fps must be between 1 and 60"))]
    pub fps: u32,
    pub task_name: Option<String>,
}

#[derive(Serialize)]
pub struct IngestResponse {
    pub task_id: EntityId,
    pub frames: u32,
    pub meta: TaskMeta,
}

/// Multipart upload: `file`, `fps` (default 5), `task_name`.
pub async fn ingest_upload(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<IngestResponse>> {
    let mut form = read_upload(multipart, state.tasks.root(), LABELER_EXTENSIONS).await?;
    let options = IngestOptions {
        fps: match form.field("fps") {
            Some(raw) => raw
                .parse()
                .map_err(|_| ApiError::bad_request(format!("Invalid fps: {}", raw)))?,
            None => DEFAULT_FPS,
        },
        task_name: form.field("task_name").map(str::to_string),
    };
    options.validate()?;

    let upload = form.take_file()?;
    info!(
        filename = %upload.filename,
        bytes = upload.bytes,
        fps = options.fps,
        "Labeler upload received"
    );

    let meta = TaskMeta::from_upload(upload.filename.clone(), options.fps);
    let response = ingest_video(&state, upload.path(), &upload.extension, meta, options.task_name.as_deref()).await?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct YoutubeIngestForm {
    pub url: String,
    #[serde(default)]
    pub fps: Option<u32>,
    #[serde(default)]
    pub task_name: Option<String>,
}

/// Form post: `url`, `fps` (default 5), `task_name`.
pub async fn ingest_youtube(
    State(state): State<AppState>,
    FormBody(form): FormBody<YoutubeIngestForm>,
) -> ApiResult<Json<IngestResponse>> {
    let url = validate_video_url(&form.url)
        .into_result()
        .map_err(ApiError::BadRequest)?;
    let options = IngestOptions {
        fps: form.fps.unwrap_or(DEFAULT_FPS),
        task_name: form.task_name.filter(|n| !n.trim().is_empty()),
    };
    options.validate()?;

    let staging = DownloadDir::create(state.tasks.root()).await?;
    let started = std::time::Instant::now();
    let video = download_video(&url, staging.path()).await?;
    metrics::record_download_duration(started.elapsed().as_secs_f64());

    let extension = video
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .unwrap_or_else(|| ".mp4".to_string());

    let meta = TaskMeta::from_youtube(url, options.fps);
    let response = ingest_video(&state, &video, &extension, meta, options.task_name.as_deref()).await?;
    Ok(Json(response))
}

/// Probe, check the duration cap, create the task, move the video in and
/// extract frames. The task directory is removed again if any step after
/// its creation fails.
async fn ingest_video(
    state: &AppState,
    staged: &Path,
    extension: &str,
    mut meta: TaskMeta,
    task_name: Option<&str>,
) -> ApiResult<IngestResponse> {
    let info = probe_video(staged).await?;
    let max = state.config.labeler_max_duration_secs;
    if info.duration > max {
        return Err(ApiError::bad_request(format!(
            "Video too long ({:.0}s). Maximum is {:.0}s",
            info.duration, max
        )));
    }

    let id = state.tasks.create(task_name).await?;
    let result = async {
        let video = state.tasks.task_dir(&id).join(format!("video{}", extension));
        move_file(staged, &video).await?;
        let frames = extract_frames(&video, state.tasks.frames_dir(&id), info.fps, meta.fps).await?;
        meta.frames = Some(frames);
        state.tasks.write_meta(&id, &meta).await?;
        Ok::<_, ApiError>(frames)
    }
    .await;

    let frames = match result {
        Ok(frames) => frames,
        Err(e) => {
            warn!(task_id = %id, error = %e, "Ingest failed, removing task");
            if let Err(cleanup) = state.tasks.discard(&id).await {
                warn!(task_id = %id, error = %cleanup, "Failed to remove incomplete task");
            }
            return Err(e);
        }
    };

    metrics::record_ingest("labeler", meta.source.as_str(), frames);
    info!(
        task_id = %id,
        source = meta.source.as_str(),
        frames = frames,
        duration_s = info.duration,
        "Task ready for labeling"
    );

    Ok(IngestResponse {
        task_id: id,
        frames,
        meta,
    })
}

pub async fn get_frames(
    State(state): State<AppState>,
    EntityPath(id): EntityPath,
) -> ApiResult<Json<TaskFrames>> {
    Ok(Json(state.tasks.frames(&id).await?))
}

pub async fn get_frame(
    State(state): State<AppState>,
    EntityPath(id): EntityPath,
    axum::extract::Path(file): axum::extract::Path<FileSegment>,
    request: Request,
) -> ApiResult<Response> {
    let path = state.tasks.frame_path(&id, &file.filename).await?;
    serve_file(&path, "image/jpeg", None, request).await
}

#[derive(Serialize)]
pub struct LabelResponse {
    pub filename: String,
    #[serde(flatten)]
    pub state: LabelState,
}

pub async fn get_label(
    State(state): State<AppState>,
    EntityPath(id): EntityPath,
    axum::extract::Path(file): axum::extract::Path<FileSegment>,
) -> ApiResult<Json<LabelResponse>> {
    let label = state.tasks.read_label(&id, &file.filename).await?;
    Ok(Json(LabelResponse {
        filename: file.filename,
        state: label,
    }))
}

/// A click in natural image pixels.
#[derive(Debug, Deserialize, Validate)]
pub struct LabelRequest {
    #[validate(length(min = 1))]
    pub filename: String,
    pub cx: f64,
    pub cy: f64,
    /// Side of the square box in pixels
    #[serde(rename = "box")]
    #[validate(range(min = 0.0, max = 10000.0))]
    pub box_px: f64,
}

#[derive(Serialize)]
pub struct SavedResponse {
    pub ok: bool,
    pub saved: String,
}

pub async fn save_label(
    State(state): State<AppState>,
    EntityPath(id): EntityPath,
    JsonBody(req): JsonBody<LabelRequest>,
) -> ApiResult<Json<SavedResponse>> {
    req.validate()?;
    let saved = state
        .tasks
        .save_label(&id, &req.filename, req.cx, req.cy, req.box_px)
        .await?;
    metrics::record_label_saved("ball");
    Ok(Json(SavedResponse { ok: true, saved }))
}

#[derive(Debug, Deserialize, Validate)]
pub struct SkipRequest {
    #[validate(length(min = 1))]
    pub filename: String,
}

/// Mark a frame as a negative sample (empty label file).
pub async fn skip_frame(
    State(state): State<AppState>,
    EntityPath(id): EntityPath,
    JsonBody(req): JsonBody<SkipRequest>,
) -> ApiResult<Json<SavedResponse>> {
    req.validate()?;
    let saved = state.tasks.skip(&id, &req.filename).await?;
    metrics::record_label_saved("negative");
    Ok(Json(SavedResponse { ok: true, saved }))
}

/// YOLO dataset zip of the task.
pub async fn export_task(
    State(state): State<AppState>,
    EntityPath(id): EntityPath,
    request: Request,
) -> ApiResult<Response> {
    let path = state.tasks.export(&id).await?;
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("dataset.zip")
        .to_string();
    info!(task_id = %id, archive = %name, "Exported YOLO dataset");
    serve_file(&path, "application/zip", Some(&name), request).await
}
