//! Admin panel handlers over both data roots.

use axum::extract::{Path, Query, Request, State};
use axum::response::Response;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use ttball_models::EntityId;
use ttball_storage::{AnalysisFile, AnalysisInfo, StorageStats, TaskInfo};

use crate::error::{ApiError, ApiResult};
use crate::extract::EntityPath;
use crate::handlers::files::serve_file;
use crate::metrics;
use crate::state::AppState;

const DEFAULT_CLEANUP_DAYS: i64 = 30;

#[derive(Serialize)]
pub struct AdminHealth {
    pub status: &'static str,
    pub service: &'static str,
}

pub async fn health() -> Json<AdminHealth> {
    Json(AdminHealth {
        status: "ok",
        service: "admin",
    })
}

pub async fn stats(State(state): State<AppState>) -> ApiResult<Json<StorageStats>> {
    Ok(Json(state.admin.stats().await?))
}

#[derive(Serialize)]
pub struct TaskInfoList {
    pub tasks: Vec<TaskInfo>,
}

pub async fn list_tasks(State(state): State<AppState>) -> ApiResult<Json<TaskInfoList>> {
    Ok(Json(TaskInfoList {
        tasks: state.admin.tasks().await?,
    }))
}

#[derive(Serialize)]
pub struct AnalysisInfoList {
    pub analyses: Vec<AnalysisInfo>,
}

pub async fn list_analyses(State(state): State<AppState>) -> ApiResult<Json<AnalysisInfoList>> {
    Ok(Json(AnalysisInfoList {
        analyses: state.admin.analyses().await?,
    }))
}

#[derive(Serialize)]
pub struct TaskDeleted {
    pub status: &'static str,
    pub task_id: EntityId,
}

pub async fn delete_task(
    State(state): State<AppState>,
    EntityPath(id): EntityPath,
) -> ApiResult<Json<TaskDeleted>> {
    state.admin.delete_task(&id).await?;
    info!(task_id = %id, "Deleted labeling task");
    Ok(Json(TaskDeleted {
        status: "deleted",
        task_id: id,
    }))
}

#[derive(Serialize)]
pub struct AnalysisDeleted {
    pub status: &'static str,
    pub analysis_id: EntityId,
}

pub async fn delete_analysis(
    State(state): State<AppState>,
    EntityPath(id): EntityPath,
) -> ApiResult<Json<AnalysisDeleted>> {
    state.admin.delete_analysis(&id).await?;
    info!(analysis_id = %id, "Deleted analysis");
    Ok(Json(AnalysisDeleted {
        status: "deleted",
        analysis_id: id,
    }))
}

/// Zip of the whole task directory (video, frames, labels, meta).
pub async fn download_task(
    State(state): State<AppState>,
    EntityPath(id): EntityPath,
    request: Request,
) -> ApiResult<Response> {
    let path = state.admin.task_archive(&id).await?;
    let name = format!("labeler-task-{}.zip", id.flat());
    serve_file(&path, "application/zip", Some(&name), request).await
}

#[derive(Deserialize)]
pub struct FileTypeSegment {
    pub file_type: String,
}

/// One analysis output: `heatmap`, `csv` or `preview`.
pub async fn download_analysis_file(
    State(state): State<AppState>,
    EntityPath(id): EntityPath,
    Path(segment): Path<FileTypeSegment>,
    request: Request,
) -> ApiResult<Response> {
    let kind: AnalysisFile = segment.file_type.parse()?;
    let path = state.admin.analysis_file(&id, kind).await?;
    let name = format!("{}-{}", id.flat(), kind.file_name());
    serve_file(&path, kind.content_type(), Some(&name), request).await
}

/// Zip of the whole analysis directory.
pub async fn download_analysis(
    State(state): State<AppState>,
    EntityPath(id): EntityPath,
    request: Request,
) -> ApiResult<Response> {
    let path = state.admin.analysis_archive(&id).await?;
    let name = format!("analyzer-{}.zip", id.flat());
    serve_file(&path, "application/zip", Some(&name), request).await
}

#[derive(Deserialize)]
pub struct CleanupParams {
    pub days: Option<i64>,
}

#[derive(Serialize)]
pub struct CleanupResponse {
    pub deleted_count: usize,
    pub cutoff_days: u32,
}

/// Delete tasks and analyses not modified for `days` days.
pub async fn cleanup(
    State(state): State<AppState>,
    Query(params): Query<CleanupParams>,
) -> ApiResult<Json<CleanupResponse>> {
    let days = params.days.unwrap_or(DEFAULT_CLEANUP_DAYS);
    if days < 1 {
        return Err(ApiError::bad_request("days must be at least 1"));
    }
    let days = u32::try_from(days).map_err(|_| ApiError::bad_request("days is too large"))?;

    let deleted_count = state.admin.cleanup(days).await?;
    metrics::record_cleanup(deleted_count);

    Ok(Json(CleanupResponse {
        deleted_count,
        cutoff_days: days,
    }))
}
