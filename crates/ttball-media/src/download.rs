//! Video download using yt-dlp.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::SystemTime;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{MediaError, MediaResult, Tool};

/// Prefer mp4 video with m4a audio, then any mp4, then anything.
pub const FORMAT_SELECTOR: &str = "bv*[ext=mp4]+ba[ext=m4a]/b[ext=mp4]/bv*+ba/b";

/// Output template relative to the download directory.
const OUTPUT_TEMPLATE: &str = "%(title).200s.%(ext)s";

/// Build the yt-dlp argument list for a single-video download into `dir`.
fn build_args(url: &str, dir: &Path) -> Vec<String> {
    vec![
        "--no-playlist".to_string(),
        "--no-progress".to_string(),
        "--no-warnings".to_string(),
        "-f".to_string(),
        FORMAT_SELECTOR.to_string(),
        "-o".to_string(),
        dir.join(OUTPUT_TEMPLATE).to_string_lossy().to_string(),
        "--print".to_string(),
        "after_move:filepath".to_string(),
        url.to_string(),
    ]
}

/// Download a single video from `url` into `dir` and return the file path.
///
/// The path printed by yt-dlp is used when it exists; otherwise the most
/// recently modified file in `dir` is taken.
pub async fn download_video(url: &str, dir: impl AsRef<Path>) -> MediaResult<PathBuf> {
    let dir = dir.as_ref();
    let yt_dlp = Tool::YtDlp.locate()?;
    tokio::fs::create_dir_all(dir).await?;

    info!(url = %url, dir = %dir.display(), "Downloading video");

    let output = Command::new(yt_dlp)
        .args(build_args(url, dir))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!("yt-dlp stderr: {}", stderr);
        let error_msg = stderr
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .unwrap_or("Unknown error");
        return Err(MediaError::download(format!("yt-dlp failed: {}", error_msg)));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let printed = stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(PathBuf::from);

    let path = match printed {
        Some(p) if p.is_file() => p,
        _ => {
            warn!("yt-dlp did not report an existing file, using newest file in download dir");
            newest_file(dir)
                .await?
                .ok_or_else(|| MediaError::download("yt-dlp produced no file"))?
        }
    };

    let file_size = tokio::fs::metadata(&path).await?.len();
    info!(
        output = %path.display(),
        size_mb = file_size as f64 / (1024.0 * 1024.0),
        "Downloaded video successfully"
    );

    Ok(path)
}

/// Most recently modified regular file directly inside `dir`.
async fn newest_file(dir: &Path) -> MediaResult<Option<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut newest: Option<(SystemTime, PathBuf)> = None;

    while let Some(entry) = entries.next_entry().await? {
        let meta = entry.metadata().await?;
        if !meta.is_file() {
            continue;
        }
        let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        if newest.as_ref().map_or(true, |(t, _)| modified > *t) {
            newest = Some((modified, entry.path()));
        }
    }

    Ok(newest.map(|(_, p)| p))
}
