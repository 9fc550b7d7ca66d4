use thiserror::Error;

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Path traversal detected: {0}")]
    PathTraversal(String),

    #[error("Invalid storage path: {0}")]
    InvalidPath(String),

    #[error("IO error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Object storage returned {status} for {operation} {path}: {message}")]
    Remote {
        operation: &'static str,
        path: String,
        status: u16,
        message: String,
    },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Storage configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl StorageError {
    pub(crate) fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    #[must_use]
    pub const fn is_path_traversal(&self) -> bool {
        matches!(self, Self::PathTraversal(_))
    }
}
