use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::adapter::StorageAdapter;
use crate::local::{LocalFsStorage, DEFAULT_LOCAL_ROOT};
use crate::remote::{ObjectStorage, DEFAULT_SNAPSHOTS_BUCKET};
use crate::Result;

/// Storage backend selection, resolved once at start-up and passed to [`open_storage`].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StorageConfig {
    Local {
        root: PathBuf,
    },
    Remote {
        endpoint: String,
        #[serde(default = "default_bucket")]
        bucket: String,
        service_key: String,
    },
}

impl fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local { root } => f.debug_struct("Local").field("root", root).finish(),
            Self::Remote {
                endpoint, bucket, ..
            } => f
                .debug_struct("Remote")
                .field("endpoint", endpoint)
                .field("bucket", bucket)
                .field("service_key", &"<redacted>")
                .finish(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Local {
            root: PathBuf::from(DEFAULT_LOCAL_ROOT),
        }
    }
}

impl StorageConfig {
    #[must_use]
    pub const fn backend_name(&self) -> &'static str {
        match self {
            Self::Local { .. } => "local",
            Self::Remote { .. } => "remote",
        }
    }

    /// Human-readable target with the service key elided.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Local { root } => format!("local:{}", root.display()),
            Self::Remote {
                endpoint, bucket, ..
            } => format!("remote:{endpoint}#{bucket}"),
        }
    }
}

fn default_bucket() -> String {
    DEFAULT_SNAPSHOTS_BUCKET.to_string()
}

pub fn open_storage(config: &StorageConfig) -> Result<Arc<dyn StorageAdapter>> {
    log::info!("Opening snapshot storage ({})", config.describe());
    match config {
        StorageConfig::Local { root } => Ok(Arc::new(LocalFsStorage::new(root)?)),
        StorageConfig::Remote {
            endpoint,
            bucket,
            service_key,
        } => Ok(Arc::new(ObjectStorage::new(endpoint, bucket, service_key)?)),
    }
}
