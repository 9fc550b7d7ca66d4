use memory_storage::StorageError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SearchError>;

/// A rejected search parameter. Raised before any document is read.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid {field}: {message}")]
pub struct SearchValidationError {
    pub field: &'static str,
    pub message: String,
}

impl SearchValidationError {
    pub(crate) fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum SearchError {
    #[error(transparent)]
    Validation(#[from] SearchValidationError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
