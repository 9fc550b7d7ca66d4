use memory_snapshots::SnapshotError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DigestError>;

#[derive(Error, Debug)]
pub enum DigestError {
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error("Queue file error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid update: {0}")]
    InvalidUpdate(String),

    #[error("Summarizer failed: {0}")]
    Summarizer(String),

    #[error("Update source failed: {0}")]
    Source(String),
}

impl DigestError {
    pub(crate) fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
