//! Read-mostly views over both data roots for the admin panel.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{Duration, SystemTime};

use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use ttball_models::analysis::files;
use ttball_models::{bytes_to_mb, EntityId};

use crate::archive::zip_dir;
use crate::error::{blocking, StorageError, StorageResult};
use crate::layout::{self, dir_size, entity_dirs, files_with_ext, find_with_stem};
use crate::task_store::{read_meta_value, FRAMES_DIR, LABELS_DIR, META_FILE};

const SECS_PER_DAY: u64 = 24 * 3600;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StorageStats {
    pub total_size_mb: f64,
    pub labeler_size_mb: f64,
    pub analyzer_size_mb: f64,
    pub labeler_tasks: usize,
    pub analyzer_analyses: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskInfo {
    pub task_id: EntityId,
    pub frames_count: usize,
    pub labels_count: usize,
    pub video_size_mb: f64,
    pub total_size_mb: f64,
    /// `created` from `meta.json`, or `"unknown"`
    pub created: String,
    pub has_video: bool,
    pub meta: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisInfo {
    pub analysis_id: EntityId,
    pub has_heatmap: bool,
    pub has_preview: bool,
    pub has_csv: bool,
    pub total_size_mb: f64,
    /// Directory modification time (RFC 3339), or `"unknown"`
    pub created: String,
}

/// Single analysis outputs offered for download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisFile {
    Heatmap,
    Csv,
    Preview,
}

impl AnalysisFile {
    pub fn file_name(&self) -> &'static str {
        match self {
            AnalysisFile::Heatmap => files::HEATMAP,
            AnalysisFile::Csv => files::BOUNCES_CSV,
            AnalysisFile::Preview => files::PREVIEW,
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            AnalysisFile::Heatmap => "image/png",
            AnalysisFile::Csv => "text/csv",
            AnalysisFile::Preview => "video/mp4",
        }
    }
}

impl FromStr for AnalysisFile {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "heatmap" => Ok(AnalysisFile::Heatmap),
            "csv" => Ok(AnalysisFile::Csv),
            "preview" => Ok(AnalysisFile::Preview),
            other => Err(StorageError::invalid_input(format!("Unknown file type: {}", other))),
        }
    }
}

impl fmt::Display for AnalysisFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AnalysisFile::Heatmap => "heatmap",
            AnalysisFile::Csv => "csv",
            AnalysisFile::Preview => "preview",
        };
        f.write_str(s)
    }
}

/// Admin operations across the labeler and analyzer roots.
#[derive(Debug, Clone)]
pub struct AdminStore {
    labeler_root: PathBuf,
    analyzer_root: PathBuf,
}

impl AdminStore {
    pub fn new(labeler_root: impl Into<PathBuf>, analyzer_root: impl Into<PathBuf>) -> Self {
        Self {
            labeler_root: labeler_root.into(),
            analyzer_root: analyzer_root.into(),
        }
    }

    pub async fn stats(&self) -> StorageResult<StorageStats> {
        let labeler = self.labeler_root.clone();
        let analyzer = self.analyzer_root.clone();
        blocking(move || {
            let labeler_bytes = dir_size(&labeler);
            let analyzer_bytes = dir_size(&analyzer);
            Ok(StorageStats {
                total_size_mb: bytes_to_mb(labeler_bytes + analyzer_bytes),
                labeler_size_mb: bytes_to_mb(labeler_bytes),
                analyzer_size_mb: bytes_to_mb(analyzer_bytes),
                labeler_tasks: entity_dirs(&labeler)?.len(),
                analyzer_analyses: entity_dirs(&analyzer)?.len(),
            })
        })
        .await
    }

    pub async fn tasks(&self) -> StorageResult<Vec<TaskInfo>> {
        let root = self.labeler_root.clone();
        blocking(move || {
            let mut infos = Vec::new();
            for (id, dir) in entity_dirs(&root)? {
                let meta = read_meta_value(&dir.join(META_FILE));
                let created = meta
                    .get("created")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_string();
                let video = find_with_stem(&dir, "video");
                let video_bytes = video
                    .as_ref()
                    .and_then(|p| std::fs::metadata(p).ok())
                    .map(|m| m.len())
                    .unwrap_or(0);

                infos.push(TaskInfo {
                    task_id: id,
                    frames_count: files_with_ext(&dir.join(FRAMES_DIR), "jpg")?.len(),
                    labels_count: files_with_ext(&dir.join(LABELS_DIR), "txt")?.len(),
                    video_size_mb: bytes_to_mb(video_bytes),
                    total_size_mb: bytes_to_mb(dir_size(&dir)),
                    created,
                    has_video: video.is_some(),
                    meta,
                });
            }
            Ok(infos)
        })
        .await
    }

    pub async fn analyses(&self) -> StorageResult<Vec<AnalysisInfo>> {
        let root = self.analyzer_root.clone();
        blocking(move || {
            let mut infos = Vec::new();
            for (id, dir) in entity_dirs(&root)? {
                infos.push(AnalysisInfo {
                    analysis_id: id,
                    has_heatmap: dir.join(files::HEATMAP).is_file(),
                    has_preview: find_with_stem(&dir, "preview").is_some(),
                    has_csv: dir.join(files::BOUNCES_CSV).is_file(),
                    total_size_mb: bytes_to_mb(dir_size(&dir)),
                    created: layout::modified_utc(&dir)
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| "unknown".to_string()),
                });
            }
            Ok(infos)
        })
        .await
    }

    pub async fn delete_task(&self, id: &EntityId) -> StorageResult<()> {
        remove_entity(&self.labeler_root, id, "Task").await
    }

    pub async fn delete_analysis(&self, id: &EntityId) -> StorageResult<()> {
        remove_entity(&self.analyzer_root, id, "Analysis").await
    }

    /// Zip a whole task directory to `<labeler_root>/.exports/labeler-task-<day>-<name>.zip`.
    pub async fn task_archive(&self, id: &EntityId) -> StorageResult<PathBuf> {
        let name = format!("labeler-task-{}.zip", id.flat());
        archive_entity(&self.labeler_root, id, "Task", name).await
    }

    /// Zip a whole analysis directory to `<analyzer_root>/.exports/analyzer-<day>-<name>.zip`.
    pub async fn analysis_archive(&self, id: &EntityId) -> StorageResult<PathBuf> {
        let name = format!("analyzer-{}.zip", id.flat());
        archive_entity(&self.analyzer_root, id, "Analysis", name).await
    }

    pub async fn analysis_file(&self, id: &EntityId, kind: AnalysisFile) -> StorageResult<PathBuf> {
        let dir = existing_dir(&self.analyzer_root, id, "Analysis").await?;
        let path = dir.join(kind.file_name());
        if tokio::fs::metadata(&path).await.map(|m| m.is_file()).unwrap_or(false) {
            Ok(path)
        } else {
            Err(StorageError::not_found(format!("{} of analysis {}", kind, id)))
        }
    }

    /// Delete tasks and analyses not modified in the last `days` days.
    pub async fn cleanup(&self, days: u32) -> StorageResult<usize> {
        if days < 1 {
            return Err(StorageError::invalid_input("days must be at least 1"));
        }
        let age = Duration::from_secs(u64::from(days) * SECS_PER_DAY);
        let cutoff = SystemTime::now()
            .checked_sub(age)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        self.cleanup_before(cutoff).await
    }

    /// Delete every task and analysis whose directory mtime is before `cutoff`.
    pub async fn cleanup_before(&self, cutoff: SystemTime) -> StorageResult<usize> {
        let roots = [self.labeler_root.clone(), self.analyzer_root.clone()];
        let deleted = blocking(move || {
            let mut deleted = 0;
            for root in &roots {
                for (id, dir) in entity_dirs(root)? {
                    let stale = layout::modified(&dir).is_some_and(|m| m < cutoff);
                    if !stale {
                        continue;
                    }
                    match std::fs::remove_dir_all(&dir) {
                        Ok(()) => deleted += 1,
                        Err(e) => warn!(id = %id, error = %e, "Failed to remove stale entry"),
                    }
                }
            }
            Ok(deleted)
        })
        .await?;
        info!(deleted, "Cleanup finished");
        Ok(deleted)
    }
}

async fn existing_dir(root: &Path, id: &EntityId, kind: &str) -> StorageResult<PathBuf> {
    let dir = id.dir_in(root);
    if tokio::fs::metadata(&dir).await.map(|m| m.is_dir()).unwrap_or(false) {
        Ok(dir)
    } else {
        Err(StorageError::not_found(format!("{} {}", kind, id)))
    }
}

async fn remove_entity(root: &Path, id: &EntityId, kind: &str) -> StorageResult<()> {
    let dir = existing_dir(root, id, kind).await?;
    tokio::fs::remove_dir_all(&dir).await?;
    info!(id = %id, kind, "Deleted");
    Ok(())
}

async fn archive_entity(root: &Path, id: &EntityId, kind: &str, zip_name: String) -> StorageResult<PathBuf> {
    let dir = existing_dir(root, id, kind).await?;
    let root = root.to_path_buf();
    blocking(move || {
        let dest = layout::export_path(&root, &zip_name)?;
        zip_dir(&dir, &dest)?;
        Ok(dest)
    })
    .await
}
