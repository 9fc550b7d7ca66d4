use anyhow::{anyhow, bail, Context as AnyhowContext, Result};
use memory_digest::{DigestSettings, DEFAULT_BATCH_LIMIT, MAX_BATCH_LIMIT};
use memory_storage::{StorageConfig, DEFAULT_LOCAL_ROOT, DEFAULT_SNAPSHOTS_BUCKET};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "memory.toml";
pub const DEFAULT_QUEUE_FILE: &str = ".data/pending-updates.json";

pub const ENV_STORAGE_BACKEND: &str = "MEMORY_STORAGE_BACKEND";
pub const ENV_LOCAL_ROOT: &str = "MEMORY_LOCAL_ROOT";
pub const ENV_REMOTE_URL: &str = "MEMORY_REMOTE_URL";
pub const ENV_REMOTE_SERVICE_KEY: &str = "MEMORY_REMOTE_SERVICE_KEY";
pub const ENV_SNAPSHOTS_BUCKET: &str = "MEMORY_SNAPSHOTS_BUCKET";
pub const ENV_DIGEST_BATCH_LIMIT: &str = "MEMORY_DIGEST_BATCH_LIMIT";
pub const ENV_UPDATE_QUEUE: &str = "MEMORY_UPDATE_QUEUE";

/// `memory.toml` as written by operators. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MemoryConfig {
    pub storage: StorageSection,
    pub digest: DigestSection,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageSection {
    /// `local` or `remote`.
    pub backend: Option<String>,
    pub local_root: Option<PathBuf>,
    pub remote_url: Option<String>,
    pub service_key: Option<String>,
    pub bucket: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DigestSection {
    pub batch_limit: Option<usize>,
    pub queue_path: Option<PathBuf>,
}

/// Settings every command runs with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub storage: StorageConfig,
    pub digest: DigestSettings,
    pub queue_path: PathBuf,
}

fn non_empty(raw: Option<String>) -> Option<String> {
    raw.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_batch_limit(raw: &str) -> Result<usize> {
    raw.trim()
        .parse::<usize>()
        .with_context(|| format!("{ENV_DIGEST_BATCH_LIMIT} must be a positive integer, got {raw:?}"))
}

impl MemoryConfig {
    /// Loads `path` when given, otherwise `memory.toml` in the working directory if present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };
        if !required && !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config = Self::from_toml(&raw)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|err| anyhow!("{err}"))
    }

    /// Overrides file values with `MEMORY_*` variables looked up through `var`.
    pub fn apply_env_with(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(backend) = non_empty(var(ENV_STORAGE_BACKEND)) {
            self.storage.backend = Some(backend);
        }
        if let Some(root) = non_empty(var(ENV_LOCAL_ROOT)) {
            self.storage.local_root = Some(PathBuf::from(root));
        }
        if let Some(url) = non_empty(var(ENV_REMOTE_URL)) {
            self.storage.remote_url = Some(url);
        }
        if let Some(key) = non_empty(var(ENV_REMOTE_SERVICE_KEY)) {
            self.storage.service_key = Some(key);
        }
        if let Some(bucket) = non_empty(var(ENV_SNAPSHOTS_BUCKET)) {
            self.storage.bucket = Some(bucket);
        }
        if let Some(limit) = non_empty(var(ENV_DIGEST_BATCH_LIMIT)) {
            self.digest.batch_limit = Some(parse_batch_limit(&limit)?);
        }
        if let Some(queue) = non_empty(var(ENV_UPDATE_QUEUE)) {
            self.digest.queue_path = Some(PathBuf::from(queue));
        }
        Ok(())
    }

    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    pub fn resolve(self) -> Result<ResolvedConfig> {
        let backend = self
            .storage
            .backend
            .as_deref()
            .map_or_else(|| "local".to_string(), str::to_ascii_lowercase);

        let storage = match backend.as_str() {
            "local" => StorageConfig::Local {
                root: self
                    .storage
                    .local_root
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_LOCAL_ROOT)),
            },
            "remote" => {
                let Some(endpoint) = non_empty(self.storage.remote_url) else {
                    bail!("Remote storage requires {ENV_REMOTE_URL} (storage.remote_url)");
                };
                let Some(service_key) = non_empty(self.storage.service_key) else {
                    bail!(
                        "Remote storage requires {ENV_REMOTE_SERVICE_KEY} (storage.service_key)"
                    );
                };
                StorageConfig::Remote {
                    endpoint,
                    bucket: non_empty(self.storage.bucket)
                        .unwrap_or_else(|| DEFAULT_SNAPSHOTS_BUCKET.to_string()),
                    service_key,
                }
            }
            other => bail!("Unknown storage backend {other:?} (expected local or remote)"),
        };

        let batch_limit = self.digest.batch_limit.unwrap_or(DEFAULT_BATCH_LIMIT);
        if batch_limit > MAX_BATCH_LIMIT || batch_limit == 0 {
            log::warn!("Digest batch limit {batch_limit} clamped to 1..={MAX_BATCH_LIMIT}");
        }

        Ok(ResolvedConfig {
            storage,
            digest: DigestSettings::with_batch_limit(batch_limit),
            queue_path: self
                .digest
                .queue_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_QUEUE_FILE)),
        })
    }
}
