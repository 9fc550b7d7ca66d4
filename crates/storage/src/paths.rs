use std::path::{Path, PathBuf};

use crate::{Result, StorageError};

/// Lexically normalizes a storage path into `a/b/c` form.
///
/// Backslashes are treated as separators, `.` segments and empty segments are dropped and `..`
/// pops the previous segment. Anything that would leave the storage root (a leading slash, a
/// drive prefix, or a `..` with nothing left to pop) is rejected with
/// [`StorageError::PathTraversal`]. An empty result denotes the root itself.
pub fn normalize_storage_path(raw: &str) -> Result<String> {
    if raw.contains('\0') {
        return Err(StorageError::InvalidPath(format!(
            "path contains a NUL byte: {raw:?}"
        )));
    }

    let unified = raw.replace('\\', "/");
    if unified.starts_with('/') {
        return Err(StorageError::PathTraversal(raw.to_string()));
    }

    let mut segments: Vec<&str> = Vec::new();
    for (idx, segment) in unified.split('/').enumerate() {
        if idx == 0 && looks_like_drive_prefix(segment) {
            return Err(StorageError::PathTraversal(raw.to_string()));
        }
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(StorageError::PathTraversal(raw.to_string()));
                }
            }
            other => segments.push(other),
        }
    }

    Ok(segments.join("/"))
}

/// Like [`normalize_storage_path`], but the path must name an object rather than the root.
pub fn normalize_object_path(raw: &str) -> Result<String> {
    let normalized = normalize_storage_path(raw)?;
    if normalized.is_empty() {
        return Err(StorageError::InvalidPath(format!(
            "path does not name a document: {raw:?}"
        )));
    }
    Ok(normalized)
}

/// Joins an already-normalized relative path onto `root`.
pub(crate) fn join_under_root(root: &Path, normalized: &str) -> PathBuf {
    if normalized.is_empty() {
        return root.to_path_buf();
    }
    normalized
        .split('/')
        .fold(root.to_path_buf(), |acc, segment| acc.join(segment))
}

/// Converts an absolute path below `root` back into a slash-separated relative path.
pub(crate) fn relative_to_root(root: &Path, full: &Path) -> Option<String> {
    let rel = full.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

fn looks_like_drive_prefix(segment: &str) -> bool {
    let bytes = segment.as_bytes();
    bytes.len() == 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}
