use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Local, SecondsFormat};
use serde::Serialize;
use thiserror::Error;
use walkdir::WalkDir;

/// Stat snapshot of a file about to be previewed or downloaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    pub absolute_path: PathBuf,
    pub size_bytes: u64,
    pub name: String,
}

/// One row of the directory listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub name: String,
    pub size_bytes: u64,
    pub modified: String,
    pub is_dir: bool,
    /// Parent directory relative to the log root, empty at the top level
    pub directory: String,
    /// Path relative to the log root, `/`-separated
    pub full_path: String,
}

#[derive(Error, Debug)]
pub enum ListError {
    #[error("directory does not exist: {}", .0.display())]
    MissingRoot(PathBuf),
    #[error("failed to read directory: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Stats `path`, refusing anything that is not a regular file.
pub fn stat_file(path: &Path) -> io::Result<FileDescriptor> {
    let metadata = std::fs::metadata(path)?;
    if !metadata.is_file() {
        return Err(io::Error::new(io::ErrorKind::NotFound, "not a regular file"));
    }

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    Ok(FileDescriptor {
        absolute_path: path.to_path_buf(),
        size_bytes: metadata.len(),
        name,
    })
}

/// Lists every file below `root`, recursively, in file-name order.
///
/// Directories themselves are not listed. The first unreadable entry aborts
/// the walk.
pub fn list_files(root: &Path) -> Result<Vec<FileEntry>, ListError> {
    if !root.exists() {
        return Err(ListError::MissingRoot(root.to_path_buf()));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_dir() {
            continue;
        }

        let metadata = entry.metadata()?;
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        let directory = relative
            .parent()
            .map(join_components)
            .unwrap_or_default();

        files.push(FileEntry {
            name: entry.file_name().to_string_lossy().into_owned(),
            size_bytes: metadata.len(),
            modified: format_modified(metadata.modified().ok()),
            is_dir: false,
            directory,
            full_path: join_components(relative),
        });
    }
    Ok(files)
}

fn join_components(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn format_modified(modified: Option<SystemTime>) -> String {
    modified
        .map(|time| DateTime::<Local>::from(time).to_rfc3339_opts(SecondsFormat::Secs, false))
        .unwrap_or_default()
}
