use memory_markdown::{ContentHash, MarkdownError};
use memory_storage::StorageError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SnapshotError>;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Section '{anchor}' not found in {path}")]
    SectionNotFound { path: String, anchor: String },

    #[error("Document not found: {path}")]
    DocumentNotFound { path: String },

    #[error("Invalid {field}: {value:?}")]
    InvalidId { field: &'static str, value: String },

    #[error("Hash mismatch for {path}: expected {expected}, found {actual}")]
    HashMismatch {
        path: String,
        expected: ContentHash,
        actual: ContentHash,
    },

    #[error(transparent)]
    Markdown(MarkdownError),
}

impl SnapshotError {
    pub(crate) fn from_markdown(path: &str, err: MarkdownError) -> Self {
        match err {
            MarkdownError::SectionNotFound { anchor } => Self::SectionNotFound {
                path: path.to_string(),
                anchor,
            },
            other => Self::Markdown(other),
        }
    }
}
