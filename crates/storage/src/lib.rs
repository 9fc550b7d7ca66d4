//! # Memory Storage
//!
//! Path-safe text blob storage behind the memory snapshot documents.
//!
//! ## Backends
//!
//! - **Local filesystem** rooted at a configured directory (atomic temp-file + rename writes)
//! - **Object storage** speaking the Supabase Storage REST dialect
//!
//! Both implement [`StorageAdapter`]. Every path is normalized lexically against the backend
//! root first; anything escaping it fails with [`StorageError::PathTraversal`] before I/O.
//!
//! ## Example
//!
//! ```no_run
//! use memory_storage::{open_storage, StorageConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let storage = open_storage(&StorageConfig::Local { root: ".data/memory".into() })?;
//!     storage.put_text("users/u1/overview.md", "# User Overview\n").await?;
//!     assert!(storage.exists("users/u1/overview.md").await?);
//!     Ok(())
//! }
//! ```

mod adapter;
mod config;
mod error;
mod local;
mod paths;
mod remote;

pub use adapter::{StorageAdapter, MARKDOWN_CONTENT_TYPE};
pub use config::{open_storage, StorageConfig};
pub use error::{Result, StorageError};
pub use local::{LocalFsStorage, DEFAULT_LOCAL_ROOT};
pub use paths::{normalize_object_path, normalize_storage_path};
pub use remote::{ObjectStorage, DEFAULT_SNAPSHOTS_BUCKET};
