use crate::error::UploadError;
use crate::metadata::AnnotationValue;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// One file discovered under the local root.
///
/// `name` is the on-disk file name; `calculated_name` is the name the file
/// will carry remotely and may be rewritten by metadata extraction or
/// duplicate uniquing.
#[derive(Debug, Clone)]
pub struct LocalFile {
    pub path: PathBuf,
    pub name: String,
    pub calculated_name: String,
    pub size: u64,
    pub annotations: BTreeMap<String, AnnotationValue>,
}

impl LocalFile {
    pub fn new(path: PathBuf, size: u64) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            path,
            calculated_name: name.clone(),
            name,
            size,
            annotations: BTreeMap::new(),
        }
    }
}

/// Walk `root` up to `max_depth` levels and collect regular files.
///
/// Unreadable entries are skipped with a warning. Empty files are skipped
/// because the platform rejects zero-byte uploads. The result is sorted by
/// path so a run over the same tree always sees the same sequence.
pub fn scan_directory(root: &Path, max_depth: usize) -> Result<Vec<LocalFile>, UploadError> {
    let root = root
        .canonicalize()
        .map_err(|_| UploadError::NotFound(root.to_path_buf()))?;
    if !root.is_dir() {
        return Err(UploadError::NotFound(root));
    }

    let mut files = Vec::new();
    for entry_result in WalkDir::new(&root).max_depth(max_depth).follow_links(false) {
        let entry = match entry_result {
            Ok(entry) => entry,
            Err(err) => {
                warn!("Skipping unreadable entry: {err}");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let metadata = match entry.metadata() {
            Ok(meta) => meta,
            Err(err) => {
                warn!(
                    "Failed to read metadata from {}: {err}",
                    entry.path().display()
                );
                continue;
            }
        };
        if metadata.len() == 0 {
            warn!("Skipping empty file: {}", entry.path().display());
            continue;
        }
        files.push(LocalFile::new(entry.path().to_path_buf(), metadata.len()));
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}
