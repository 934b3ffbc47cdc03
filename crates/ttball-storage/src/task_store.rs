//! Labeling tasks under `LABEL_DATA_DIR`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use ttball_models::id::validate_segment;
use ttball_models::{slugify, EntityId, TaskMeta, YoloLabel};

use crate::archive::{ArchiveBuilder, DATASET_YAML};
use crate::error::{blocking, StorageError, StorageResult};
use crate::layout::{self, entity_dirs, files_with_ext};

pub(crate) const FRAMES_DIR: &str = "frames";
pub(crate) const LABELS_DIR: &str = "labels";
pub(crate) const META_FILE: &str = "meta.json";

/// One row of the task list.
#[derive(Debug, Clone, Serialize)]
pub struct TaskListing {
    pub id: EntityId,
    pub frames: usize,
    /// Raw `meta.json` contents (empty object if missing or unreadable)
    pub meta: Value,
}

/// Frame names of a task and which of them have a label file.
#[derive(Debug, Clone, Serialize)]
pub struct TaskFrames {
    pub task_id: EntityId,
    pub frames: Vec<String>,
    pub labeled: Vec<String>,
}

/// Current label state of a single frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LabelState {
    /// No label file yet
    Unlabeled,
    /// Empty label file (frame skipped, negative sample)
    Negative,
    /// One ball box
    Ball { label: YoloLabel },
}

#[derive(Debug, Clone)]
pub struct TaskStore {
    root: PathBuf,
}

impl TaskStore {
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

    pub fn task_dir(&self, id: &EntityId) -> PathBuf {
        id.dir_in(&self.root)
    }

    pub fn frames_dir(&self, id: &EntityId) -> PathBuf {
        self.task_dir(id).join(FRAMES_DIR)
    }

    pub fn labels_dir(&self, id: &EntityId) -> PathBuf {
        self.task_dir(id).join(LABELS_DIR)
    }

    /// Create a new task directory with empty `frames/` and `labels/`.
    pub async fn create(&self, task_name: Option<&str>) -> StorageResult<EntityId> {
        let base = EntityId::for_task(task_name, Utc::now());
        let root = self.root.clone();
        let (id, dir) = blocking(move || Ok(layout::create_unique(&root, &base)?)).await?;

        tokio::fs::create_dir_all(dir.join(FRAMES_DIR)).await?;
        tokio::fs::create_dir_all(dir.join(LABELS_DIR)).await?;
        info!(task_id = %id, "Created labeling task");
        Ok(id)
    }

    async fn require(&self, id: &EntityId) -> StorageResult<PathBuf> {
        let dir = self.task_dir(id);
        if tokio::fs::metadata(&dir).await.map(|m| m.is_dir()).unwrap_or(false) {
            Ok(dir)
        } else {
            Err(StorageError::not_found(format!("Task {}", id)))
        }
    }

    /// Remove a task directory, used when ingest fails halfway.
    pub async fn discard(&self, id: &EntityId) -> StorageResult<()> {
        match tokio::fs::remove_dir_all(self.task_dir(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn write_meta(&self, id: &EntityId, meta: &TaskMeta) -> StorageResult<()> {
        let dir = self.require(id).await?;
        tokio::fs::write(dir.join(META_FILE), serde_json::to_vec_pretty(meta)?).await?;
        Ok(())
    }

    pub async fn read_meta(&self, id: &EntityId) -> StorageResult<TaskMeta> {
        let path = self.task_dir(id).join(META_FILE);
        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::not_found(format!("Metadata of task {}", id)))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// All tasks with frame counts and metadata, ordered by id.
    pub async fn list(&self) -> StorageResult<Vec<TaskListing>> {
        let root = self.root.clone();
        blocking(move || {
            let mut tasks = Vec::new();
            for (id, dir) in entity_dirs(&root)? {
                let frames = files_with_ext(&dir.join(FRAMES_DIR), "jpg")?.len();
                tasks.push(TaskListing {
                    id,
                    frames,
                    meta: read_meta_value(&dir.join(META_FILE)),
                });
            }
            Ok(tasks)
        })
        .await
    }

    /// Sorted frame file names plus those that already have a label file.
    pub async fn frames(&self, id: &EntityId) -> StorageResult<TaskFrames> {
        let dir = self.require(id).await?;
        let task_id = id.clone();
        blocking(move || {
            let frames = files_with_ext(&dir.join(FRAMES_DIR), "jpg")?;
            let labels = files_with_ext(&dir.join(LABELS_DIR), "txt")?;
            let labeled = labeled_frames(&frames, &labels);
            Ok(TaskFrames {
                task_id,
                frames,
                labeled,
            })
        })
        .await
    }

    /// Path of an existing frame image. Unknown names, non-jpg names and
    /// anything that is not a plain file name resolve to "not found".
    pub async fn frame_path(&self, id: &EntityId, filename: &str) -> StorageResult<PathBuf> {
        let not_found = || StorageError::not_found(format!("Frame {}", filename));
        if validate_segment(filename).is_err() || !has_ext(filename, "jpg") {
            return Err(not_found());
        }
        let path = self.frames_dir(id).join(filename);
        match tokio::fs::metadata(&path).await {
            Ok(m) if m.is_file() => Ok(path),
            _ => Err(not_found()),
        }
    }

    fn label_path(&self, id: &EntityId, frame: &str) -> PathBuf {
        self.labels_dir(id).join(format!("{}.txt", stem(frame)))
    }

    /// Store a click as a YOLO label for `filename`, replacing any previous
    /// label. Returns the label file name.
    pub async fn save_label(
        &self,
        id: &EntityId,
        filename: &str,
        cx: f64,
        cy: f64,
        box_px: f64,
    ) -> StorageResult<String> {
        let frame = self.frame_path(id, filename).await?;
        let (width, height) = blocking(move || Ok(image::image_dimensions(&frame)?)).await?;
        let label = YoloLabel::from_click(cx, cy, box_px, width, height)?;

        let path = self.label_path(id, filename);
        self.write_label_file(&path, &format!("{}\n", label)).await?;
        debug!(task_id = %id, frame = filename, label = %label, "Saved label");
        Ok(file_name(&path))
    }

    /// Mark a frame as containing no ball (empty label file).
    pub async fn skip(&self, id: &EntityId, filename: &str) -> StorageResult<String> {
        self.frame_path(id, filename).await?;
        let path = self.label_path(id, filename);
        self.write_label_file(&path, "").await?;
        debug!(task_id = %id, frame = filename, "Marked frame as negative");
        Ok(file_name(&path))
    }

    async fn write_label_file(&self, path: &Path, contents: &str) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, contents).await?;
        Ok(())
    }

    pub async fn read_label(&self, id: &EntityId, filename: &str) -> StorageResult<LabelState> {
        self.frame_path(id, filename).await?;
        let text = match tokio::fs::read_to_string(self.label_path(id, filename)).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(LabelState::Unlabeled),
            Err(e) => return Err(e.into()),
        };
        match text.lines().find(|l| !l.trim().is_empty()) {
            None => Ok(LabelState::Negative),
            Some(line) => Ok(LabelState::Ball {
                label: line.parse()?,
            }),
        }
    }

    /// Build a YOLO dataset zip (`images/`, `labels/`, `dataset.yaml`) under
    /// `<root>/.exports/`. Fails with [`StorageError::NoFrames`] on an empty task.
    pub async fn export(&self, id: &EntityId) -> StorageResult<PathBuf> {
        let dir = self.require(id).await?;
        let root = self.root.clone();
        let zip_name = format!("{}.zip", slugify(&id.to_string(), "task"));

        let (path, entries) = blocking(move || {
            let frames_dir = dir.join(FRAMES_DIR);
            let labels_dir = dir.join(LABELS_DIR);
            let frames = files_with_ext(&frames_dir, "jpg")?;
            if frames.is_empty() {
                return Err(StorageError::NoFrames);
            }
            let labels = files_with_ext(&labels_dir, "txt")?;

            let dest = layout::export_path(&root, &zip_name)?;
            let mut archive = ArchiveBuilder::create(&dest)?;
            for f in &frames {
                archive.add_file(&frames_dir.join(f), &format!("images/{}", f))?;
            }
            for l in &labels {
                archive.add_file(&labels_dir.join(l), &format!("labels/{}", l))?;
            }
            archive.add_bytes("dataset.yaml", DATASET_YAML.as_bytes())?;
            let entries = archive.finish()?;
            Ok((dest, entries))
        })
        .await?;

        info!(task_id = %id, entries, path = %path.display(), "Exported YOLO dataset");
        Ok(path)
    }
}

/// Tolerant `meta.json` reader for listings.
pub(crate) fn read_meta_value(path: &Path) -> Value {
    std::fs::read(path)
        .ok()
        .and_then(|b| serde_json::from_slice::<Value>(&b).ok())
        .filter(Value::is_object)
        .unwrap_or_else(|| Value::Object(Default::default()))
}

/// Frames whose stem matches a label file's stem, in frame order.
fn labeled_frames(frames: &[String], labels: &[String]) -> Vec<String> {
    let stems: HashSet<&str> = labels.iter().map(|l| stem(l)).collect();
    frames
        .iter()
        .filter(|f| stems.contains(stem(f)))
        .cloned()
        .collect()
}

fn stem(name: &str) -> &str {
    Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(name)
}

fn has_ext(name: &str, ext: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
