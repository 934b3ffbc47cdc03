//! Directory layout helpers shared by both data roots.
//!
//! Entities live at `<root>/<day>/<name>/`. Anything whose name starts with
//! a dot (for example the `.exports` directory) is not an entity.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use ttball_models::id::validate_segment;
use ttball_models::EntityId;

/// Directory below each root where zip exports are written.
pub const EXPORTS_DIR: &str = ".exports";

const MAX_ID_ATTEMPTS: u32 = 100;

/// All `<day>/<name>` directories under `root`, sorted by day then name.
/// A missing root yields an empty list.
pub fn entity_dirs(root: &Path) -> io::Result<Vec<(EntityId, PathBuf)>> {
    let mut out = Vec::new();
    for day in sorted_subdirs(root)? {
        for name in sorted_subdirs(&root.join(&day))? {
            if let Ok(id) = EntityId::new(day.as_str(), name.as_str()) {
                let dir = id.dir_in(root);
                out.push((id, dir));
            }
        }
    }
    Ok(out)
}

fn sorted_subdirs(dir: &Path) -> io::Result<Vec<String>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if validate_segment(name).is_ok() {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

/// Create the directory for `base`, appending `-1`, `-2`, ... to the name
/// until an unused one is found.
pub fn create_unique(root: &Path, base: &EntityId) -> io::Result<(EntityId, PathBuf)> {
    fs::create_dir_all(root.join(base.day()))?;
    for attempt in 0..MAX_ID_ATTEMPTS {
        let id = if attempt == 0 {
            base.clone()
        } else {
            base.with_suffix(attempt)
        };
        let dir = id.dir_in(root);
        match fs::create_dir(&dir) {
            Ok(()) => return Ok((id, dir)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }
    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free directory name for {}", base),
    ))
}

/// Total size in bytes of all regular files below `path`. Missing paths count as 0.
pub fn dir_size(path: &Path) -> u64 {
    let Ok(entries) = fs::read_dir(path) else {
        return 0;
    };
    entries
        .flatten()
        .map(|entry| match entry.file_type() {
            Ok(t) if t.is_dir() => dir_size(&entry.path()),
            Ok(t) if t.is_file() => entry.metadata().map(|m| m.len()).unwrap_or(0),
            _ => 0,
        })
        .sum()
}

/// Sorted names of files in `dir` with the given extension (case-insensitive).
pub fn files_with_ext(dir: &Path, ext: &str) -> io::Result<Vec<String>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(ext));
        if matches {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

/// First file in `dir` named `<stem>.<anything>`, in name order.
pub fn find_with_stem(dir: &Path, stem: &str) -> Option<PathBuf> {
    let mut found: Vec<PathBuf> = fs::read_dir(dir)
        .ok()?
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.file_stem().and_then(|s| s.to_str()) == Some(stem))
        .collect();
    found.sort();
    found.into_iter().next()
}

pub fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

pub fn modified_utc(path: &Path) -> Option<DateTime<Utc>> {
    modified(path).map(DateTime::<Utc>::from)
}

/// Path of the export file `file_name` below `root`, creating the exports dir.
pub fn export_path(root: &Path, file_name: &str) -> io::Result<PathBuf> {
    let dir = root.join(EXPORTS_DIR);
    fs::create_dir_all(&dir)?;
    Ok(dir.join(file_name))
}
