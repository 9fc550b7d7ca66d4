use async_trait::async_trait;

use crate::Result;

pub const MARKDOWN_CONTENT_TYPE: &str = "text/markdown; charset=utf-8";

/// Uniform text-blob storage addressed by slash-separated relative paths.
///
/// Every implementation resolves paths against a fixed root and must reject traversal attempts
/// with [`crate::StorageError::PathTraversal`] before touching the backend.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Writes (creates or overwrites) the document at `path`.
    async fn put_text(&self, path: &str, text: &str) -> Result<()>;

    /// Returns `Ok(None)` when nothing is stored at `path`.
    async fn get_text(&self, path: &str) -> Result<Option<String>>;

    async fn exists(&self, path: &str) -> Result<bool>;

    /// Lists every document below `prefix`, recursively, as root-relative paths.
    ///
    /// Order is unspecified. A missing prefix yields an empty list.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Removes the document at `path`. Deleting a missing document is not an error.
    async fn delete(&self, path: &str) -> Result<()>;

    /// Short backend name used in logs.
    fn backend_name(&self) -> &'static str;
}
