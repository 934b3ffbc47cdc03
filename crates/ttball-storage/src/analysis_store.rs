//! Analyses under `ANALYZER_DATA_DIR`.

use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{info, warn};

use ttball_models::analysis::files;
use ttball_models::{AnalysisMeta, Calibration, EntityId};

use crate::error::{blocking, StorageError, StorageResult};
use crate::layout::{self, entity_dirs};

const VIDEO_STEM: &str = "video";

#[derive(Debug, Clone)]
pub struct AnalysisStore {
    root: PathBuf,
}

impl AnalysisStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn ensure_root(&self) -> StorageResult<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    pub fn analysis_dir(&self, id: &EntityId) -> PathBuf {
        id.dir_in(&self.root)
    }

    /// Path of a named file inside the analysis directory (may not exist).
    pub fn file_path(&self, id: &EntityId, name: &str) -> PathBuf {
        self.analysis_dir(id).join(name)
    }

    /// Create an empty analysis directory with a fresh id.
    pub async fn create(&self) -> StorageResult<EntityId> {
        let base = EntityId::for_analysis(Utc::now());
        let root = self.root.clone();
        let (id, _) = blocking(move || Ok(layout::create_unique(&root, &base)?)).await?;
        info!(analysis_id = %id, "Created analysis");
        Ok(id)
    }

    pub async fn discard(&self, id: &EntityId) -> StorageResult<()> {
        match tokio::fs::remove_dir_all(self.analysis_dir(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn require(&self, id: &EntityId) -> StorageResult<PathBuf> {
        let dir = self.analysis_dir(id);
        if tokio::fs::metadata(&dir).await.map(|m| m.is_dir()).unwrap_or(false) {
            Ok(dir)
        } else {
            Err(StorageError::not_found(format!("Analysis {}", id)))
        }
    }

    pub async fn write_meta(&self, meta: &AnalysisMeta) -> StorageResult<()> {
        let dir = self.require(&meta.analysis_id).await?;
        tokio::fs::write(dir.join(files::META), serde_json::to_vec_pretty(meta)?).await?;
        Ok(())
    }

    pub async fn read_meta(&self, id: &EntityId) -> StorageResult<AnalysisMeta> {
        let path = self.file_path(id, files::META);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::not_found(format!("Analysis {}", id)))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// The stored source video (`video.<ext>`).
    pub async fn video_path(&self, id: &EntityId) -> StorageResult<PathBuf> {
        let dir = self.require(id).await?;
        let found = blocking(move || Ok(layout::find_with_stem(&dir, VIDEO_STEM))).await?;
        found.ok_or_else(|| StorageError::not_found(format!("Video of analysis {}", id)))
    }

    /// Path of an existing output file, or "not found".
    pub async fn existing_file(&self, id: &EntityId, name: &str) -> StorageResult<PathBuf> {
        let path = self.file_path(id, name);
        match tokio::fs::metadata(&path).await {
            Ok(m) if m.is_file() => Ok(path),
            _ => Err(StorageError::not_found(format!("{} of analysis {}", name, id))),
        }
    }

    pub async fn save_calibration(&self, id: &EntityId, calibration: &Calibration) -> StorageResult<()> {
        let dir = self.require(id).await?;
        tokio::fs::write(
            dir.join(files::CALIBRATION),
            serde_json::to_vec_pretty(calibration)?,
        )
        .await?;
        info!(analysis_id = %id, "Saved table calibration");
        Ok(())
    }

    /// Stored calibration, or `None` when the table has not been calibrated.
    pub async fn load_calibration(&self, id: &EntityId) -> StorageResult<Option<Calibration>> {
        match tokio::fs::read(self.file_path(id, files::CALIBRATION)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// All analyses with readable metadata, newest first.
    pub async fn list(&self) -> StorageResult<Vec<AnalysisMeta>> {
        let root = self.root.clone();
        blocking(move || {
            let mut metas = Vec::new();
            for (id, dir) in entity_dirs(&root)? {
                let path = dir.join(files::META);
                let Ok(bytes) = std::fs::read(&path) else {
                    continue;
                };
                match serde_json::from_slice::<AnalysisMeta>(&bytes) {
                    Ok(meta) => metas.push(meta),
                    Err(e) => warn!(analysis_id = %id, error = %e, "Skipping unreadable analysis metadata"),
                }
            }
            metas.sort_by(|a, b| b.created.cmp(&a.created));
            Ok(metas)
        })
        .await
    }
}
