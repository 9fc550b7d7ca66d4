use async_trait::async_trait;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::adapter::StorageAdapter;
use crate::paths::{join_under_root, normalize_object_path, normalize_storage_path, relative_to_root};
use crate::{Result, StorageError};

pub const DEFAULT_LOCAL_ROOT: &str = ".data/memory-snapshots";

const TMP_SUFFIX: &str = ".tmp";

/// In-flight writes are `.<name>.<random>.tmp` siblings of their target.
fn is_temp_file(name: &str) -> bool {
    name.starts_with('.') && name.ends_with(TMP_SUFFIX)
}

/// Writes `text` to a uniquely named sibling of `full` and renames it into place, so readers
/// and concurrent writers only ever see complete documents.
fn write_atomic(normalized: &str, full: &Path, text: &str) -> Result<()> {
    let parent = full
        .parent()
        .ok_or_else(|| StorageError::InvalidPath(normalized.to_string()))?;
    std::fs::create_dir_all(parent).map_err(|err| StorageError::io(normalized, err))?;

    let file_name = full
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut tmp = tempfile::Builder::new()
        .prefix(&format!(".{file_name}."))
        .suffix(TMP_SUFFIX)
        .tempfile_in(parent)
        .map_err(|err| StorageError::io(normalized, err))?;
    tmp.write_all(text.as_bytes())
        .map_err(|err| StorageError::io(normalized, err))?;
    tmp.persist(full)
        .map_err(|err| StorageError::io(normalized, err.error))?;
    Ok(())
}

/// Filesystem-backed storage rooted at a single directory.
#[derive(Debug, Clone)]
pub struct LocalFsStorage {
    root: PathBuf,
}

impl LocalFsStorage {
    /// Relative roots are resolved against the current working directory once, at construction.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let root = if root.is_absolute() {
            root.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(|err| StorageError::io(root.display().to_string(), err))?
                .join(root)
        };
        log::debug!("Local snapshot storage rooted at {}", root.display());
        Ok(Self { root })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve_object(&self, path: &str) -> Result<(String, PathBuf)> {
        let normalized = normalize_object_path(path)?;
        let full = join_under_root(&self.root, &normalized);
        Ok((normalized, full))
    }
}

#[async_trait]
impl StorageAdapter for LocalFsStorage {
    async fn put_text(&self, path: &str, text: &str) -> Result<()> {
        let (normalized, full) = self.resolve_object(path)?;
        let text = text.to_string();
        tokio::task::spawn_blocking(move || write_atomic(&normalized, &full, &text))
            .await
            .map_err(|err| StorageError::Other(format!("write task failed: {err}")))?
    }

    async fn get_text(&self, path: &str) -> Result<Option<String>> {
        let (normalized, full) = self.resolve_object(path)?;
        match tokio::fs::read_to_string(&full).await {
            Ok(text) => Ok(Some(text)),
            Err(err) if matches!(err.kind(), ErrorKind::NotFound) => Ok(None),
            // A directory at a document path reads as "no document".
            Err(_) if full.is_dir() => Ok(None),
            Err(err) => Err(StorageError::io(normalized, err)),
        }
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let (normalized, full) = self.resolve_object(path)?;
        match tokio::fs::metadata(&full).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(err) if matches!(err.kind(), ErrorKind::NotFound) => Ok(false),
            Err(err) => Err(StorageError::io(normalized, err)),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let normalized = normalize_storage_path(prefix)?;
        let start = join_under_root(&self.root, &normalized);
        let root = self.root.clone();

        tokio::task::spawn_blocking(move || -> Result<Vec<String>> {
            if !start.exists() {
                return Ok(Vec::new());
            }
            let mut out = Vec::new();
            for entry in WalkDir::new(&start).follow_links(false) {
                let entry = entry.map_err(|err| {
                    let path = err
                        .path()
                        .map_or_else(|| normalized.clone(), |p| p.display().to_string());
                    StorageError::io(path, err.into())
                })?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let name = entry.file_name().to_string_lossy();
                if is_temp_file(&name) {
                    continue;
                }
                if let Some(rel) = relative_to_root(&root, entry.path()) {
                    out.push(rel);
                }
            }
            out.sort();
            Ok(out)
        })
        .await
        .map_err(|err| StorageError::Other(format!("list task failed: {err}")))?
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let (normalized, full) = self.resolve_object(path)?;
        match tokio::fs::remove_file(&full).await {
            Ok(()) => Ok(()),
            Err(err) if matches!(err.kind(), ErrorKind::NotFound) => Ok(()),
            Err(err) => Err(StorageError::io(normalized, err)),
        }
    }

    fn backend_name(&self) -> &'static str {
        "local"
    }
}
