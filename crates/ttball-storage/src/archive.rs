//! Zip archives for dataset exports and admin downloads.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::StorageResult;

/// `dataset.yaml` placed at the root of every YOLO export.
pub const DATASET_YAML: &str = "path: .\ntrain: images\nval: images\nnc: 1\nnames: ['ball']\n";

fn options() -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(CompressionMethod::Deflated)
}

/// Writes entries into a zip file at a fixed destination.
pub struct ArchiveBuilder {
    writer: ZipWriter<BufWriter<File>>,
    entries: usize,
}

impl ArchiveBuilder {
    /// Create (or truncate) the archive at `dest`.
    pub fn create(dest: &Path) -> StorageResult<Self> {
        let file = File::create(dest)?;
        Ok(Self {
            writer: ZipWriter::new(BufWriter::new(file)),
            entries: 0,
        })
    }

    pub fn add_file(&mut self, source: &Path, name: &str) -> StorageResult<()> {
        self.writer.start_file(name, options())?;
        let mut input = File::open(source)?;
        io::copy(&mut input, &mut self.writer)?;
        self.entries += 1;
        Ok(())
    }

    pub fn add_bytes(&mut self, name: &str, bytes: &[u8]) -> StorageResult<()> {
        self.writer.start_file(name, options())?;
        self.writer.write_all(bytes)?;
        self.entries += 1;
        Ok(())
    }

    /// Add every regular file below `dir`, named by its path relative to `dir`.
    pub fn add_dir(&mut self, dir: &Path) -> StorageResult<()> {
        self.add_dir_rec(dir, dir)
    }

    fn add_dir_rec(&mut self, base: &Path, dir: &Path) -> StorageResult<()> {
        let mut entries: Vec<_> = std::fs::read_dir(dir)?.collect::<Result<_, _>>()?;
        entries.sort_by_key(|e| e.file_name());
        for entry in entries {
            let path = entry.path();
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                self.add_dir_rec(base, &path)?;
            } else if file_type.is_file() {
                let rel = path.strip_prefix(base).unwrap_or(path.as_path());
                let name = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                self.add_file(&path, &name)?;
            }
        }
        Ok(())
    }

    /// Write the central directory and flush to disk.
    pub fn finish(self) -> StorageResult<usize> {
        let mut inner = self.writer.finish()?;
        inner.flush()?;
        Ok(self.entries)
    }
}

/// Zip the whole directory `src` into `dest`.
pub fn zip_dir(src: &Path, dest: &Path) -> StorageResult<usize> {
    let mut archive = ArchiveBuilder::create(dest)?;
    archive.add_dir(src)?;
    archive.finish()
}
