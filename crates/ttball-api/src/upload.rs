//! Staging for uploaded and downloaded videos.
//!
//! Uploads are streamed to `<root>/.uploads/` and downloads land in
//! `<root>/.downloads/<uuid>/` before the entity directory exists, so a
//! rejected video never leaves a half-created task or analysis behind.
//! Both guards remove their files on drop.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use axum::extract::Multipart;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::security::{sanitize_filename, video_extension};

const UPLOADS_DIR: &str = ".uploads";
const DOWNLOADS_DIR: &str = ".downloads";

/// A video written to the staging area.
#[derive(Debug)]
pub struct StagedUpload {
    path: PathBuf,
    /// Client-side file name (final component only)
    pub filename: String,
    /// Lower-cased extension with the dot, e.g. `.mp4`
    pub extension: String,
    pub bytes: u64,
}

impl StagedUpload {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagedUpload {
    fn drop(&mut self) {
        // Already moved into place on success
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "Failed to remove staged upload");
            }
        }
    }
}

/// Parsed multipart form: the video plus any text fields.
#[derive(Debug, Default)]
pub struct UploadForm {
    pub file: Option<StagedUpload>,
    pub fields: HashMap<String, String>,
}

impl UploadForm {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }

    pub fn take_file(&mut self) -> ApiResult<StagedUpload> {
        self.file
            .take()
            .ok_or_else(|| ApiError::bad_request("Missing video file"))
    }
}

/// Read a multipart body, streaming the `file` field below `root/.uploads/`.
///
/// The extension is checked against `allowed` before any bytes are written.
pub async fn read_upload(mut multipart: Multipart, root: &Path, allowed: &[&str]) -> ApiResult<UploadForm> {
    let mut form = UploadForm::default();

    while let Some(mut field) = multipart.next_field().await? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        if name != "file" {
            let value = field.text().await?;
            form.fields.insert(name, value);
            continue;
        }

        let filename = field
            .file_name()
            .map(sanitize_filename)
            .filter(|f| !f.is_empty())
            .ok_or_else(|| ApiError::bad_request("Missing file name"))?;
        let extension = video_extension(&filename, allowed).map_err(ApiError::BadRequest)?;

        let staging = root.join(UPLOADS_DIR);
        tokio::fs::create_dir_all(&staging).await?;
        let mut staged = StagedUpload {
            path: staging.join(format!("{}{}", Uuid::new_v4(), extension)),
            filename,
            extension,
            bytes: 0,
        };

        let mut file = tokio::fs::File::create(&staged.path).await?;
        while let Some(chunk) = field.chunk().await? {
            file.write_all(&chunk).await?;
            staged.bytes += chunk.len() as u64;
        }
        file.flush().await?;

        if staged.bytes == 0 {
            return Err(ApiError::bad_request("Uploaded file is empty"));
        }

        debug!(filename = %staged.filename, bytes = staged.bytes, "Staged upload");
        form.file = Some(staged);
    }

    Ok(form)
}

/// Scratch directory for a single yt-dlp download.
#[derive(Debug)]
pub struct DownloadDir {
    path: PathBuf,
}

impl DownloadDir {
    pub async fn create(root: &Path) -> ApiResult<Self> {
        let path = root.join(DOWNLOADS_DIR).join(Uuid::new_v4().to_string());
        tokio::fs::create_dir_all(&path).await?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DownloadDir {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "Failed to remove download directory");
            }
        }
    }
}
