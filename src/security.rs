//! Path resolution for client-supplied file paths
//!
//! Every path a client asks for is relative to the log directory. This module
//! turns it into a canonical absolute path and refuses anything that would
//! resolve outside that directory.

use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Security-related errors
#[derive(Error, Debug)]
pub enum SecurityError {
    #[error("Path is empty")]
    EmptyPath,
    #[error("Path contains null byte")]
    NullByte,
    #[error("Path is absolute")]
    AbsolutePath,
    #[error("Path contains directory traversal")]
    PathTraversal,
    #[error("File not found")]
    NotFound,
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
}

/// Resolves `requested` under `root`.
///
/// The returned path is canonical, exists, and lies inside the canonical root.
/// Containment is checked per path component, so a root of `/a/b` never
/// admits `/a/bc`, and symlinks pointing out of the root are refused.
pub fn resolve_within(root: &Path, requested: &Path) -> Result<PathBuf, SecurityError> {
    let path_str = requested.to_string_lossy();

    if path_str.trim().is_empty() {
        return Err(SecurityError::EmptyPath);
    }

    if path_str.contains('\0') {
        return Err(SecurityError::NullByte);
    }

    if requested.has_root()
        || requested
            .components()
            .any(|c| matches!(c, Component::Prefix(_) | Component::RootDir))
    {
        return Err(SecurityError::AbsolutePath);
    }

    if requested
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return Err(SecurityError::PathTraversal);
    }

    let canonical_root = root.canonicalize()?;
    let resolved = canonical_root
        .join(requested)
        .canonicalize()
        .map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => SecurityError::NotFound,
            _ => SecurityError::IoError(err),
        })?;

    if is_contained(&canonical_root, &resolved) {
        Ok(resolved)
    } else {
        Err(SecurityError::PathTraversal)
    }
}

/// Component-wise containment test; both paths should already be canonical.
pub fn is_contained(root: &Path, candidate: &Path) -> bool {
    candidate.starts_with(root)
}
