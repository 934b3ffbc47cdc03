//! Moving downloaded and uploaded videos into their task directories.
//!
//! Downloads land in a scratch directory that may sit on another filesystem
//! than the data root, so a plain rename can fail with EXDEV.

use std::path::Path;
use tokio::fs;
use tracing::{debug, warn};

use crate::error::MediaResult;

/// `EXDEV` on Linux and macOS.
const EXDEV: i32 = 18;

/// Move `src` to `dst`, creating the parent of `dst` and falling back to
/// copy plus delete when the two paths are on different filesystems.
pub async fn move_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> MediaResult<()> {
    let src = src.as_ref();
    let dst = dst.as_ref();

    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).await?;
    }

    match fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) if e.raw_os_error() == Some(EXDEV) => {
            debug!(
                src = %src.display(),
                dst = %dst.display(),
                "Cross-device rename, copying instead"
            );
            copy_then_remove(src, dst).await
        }
        Err(e) => Err(e.into()),
    }
}

async fn copy_then_remove(src: &Path, dst: &Path) -> MediaResult<()> {
    // Copy next to the destination first so the final rename stays on one filesystem.
    let partial = dst.with_extension("partial");

    if let Err(e) = fs::copy(src, &partial).await {
        let _ = fs::remove_file(&partial).await;
        return Err(e.into());
    }
    if let Err(e) = fs::rename(&partial, dst).await {
        let _ = fs::remove_file(&partial).await;
        return Err(e.into());
    }

    if let Err(e) = fs::remove_file(src).await {
        warn!(src = %src.display(), error = %e, "Could not remove source after copy");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_move_into_new_task_dir() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("My Rally.mp4");
        let dst = dir.path().join("2024-05-01").join("task-1").join("video.mp4");

        fs::write(&src, b"video bytes").await.unwrap();
        move_file(&src, &dst).await.unwrap();

        assert!(!src.exists());
        assert_eq!(fs::read(&dst).await.unwrap(), b"video bytes");
    }

    #[tokio::test]
    async fn test_move_replaces_existing_video() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("new.mp4");
        let dst = dir.path().join("video.mp4");

        fs::write(&src, b"new").await.unwrap();
        fs::write(&dst, b"old").await.unwrap();
        move_file(&src, &dst).await.unwrap();

        assert_eq!(fs::read(&dst).await.unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_copy_then_remove() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("a.mp4");
        let dst = dir.path().join("b.mp4");

        fs::write(&src, b"abc").await.unwrap();
        copy_then_remove(&src, &dst).await.unwrap();

        assert!(!src.exists());
        assert!(!dir.path().join("b.partial").exists());
        assert_eq!(fs::read(&dst).await.unwrap(), b"abc");
    }

    #[tokio::test]
    async fn test_missing_source_is_error() {
        let dir = TempDir::new().unwrap();
        let result = move_file(dir.path().join("nope.mp4"), dir.path().join("x.mp4")).await;
        tokio_test::assert_err!(result);
    }
}
