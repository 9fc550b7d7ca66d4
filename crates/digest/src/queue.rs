use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use crate::update::{NewUpdate, PendingUpdate};
use crate::{DigestError, Result};

/// An update the summarizer covered, with its per-item summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedUpdate {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnqueueOutcome {
    pub id: String,
    /// `false` when an update with the same (user, kind, ref id) was already queued.
    pub inserted: bool,
}

/// Where the digest runner reads queued updates from.
#[async_trait]
pub trait PendingUpdateSource: Send + Sync {
    /// Distinct users with at least one unprocessed update, sorted.
    async fn list_users_with_pending(&self) -> Result<Vec<String>>;

    /// Unprocessed updates for `user_id`, oldest first, at most `limit`.
    async fn fetch_pending(&self, user_id: &str, limit: usize) -> Result<Vec<PendingUpdate>>;

    /// Marks updates processed; returns how many were still pending.
    async fn mark_processed(
        &self,
        user_id: &str,
        updates: &[ProcessedUpdate],
        digest: &str,
    ) -> Result<usize>;

    async fn has_pending(&self, user_id: &str) -> Result<bool>;
}

fn update_id(user_id: &str, new: &NewUpdate) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    hasher.update([0]);
    hasher.update(new.event.kind().as_str().as_bytes());
    hasher.update([0]);
    hasher.update(new.event.ref_id().as_bytes());
    let digest = hasher.finalize();
    let hex: String = digest[..8].iter().map(|b| format!("{b:02x}")).collect();
    format!("upd_{hex}")
}

/// Queue contents shared by the in-memory and file-backed queues.
#[derive(Debug, Default, Serialize, Deserialize)]
struct QueueState {
    updates: Vec<PendingUpdate>,
}

impl QueueState {
    fn enqueue(&mut self, new: NewUpdate) -> Result<EnqueueOutcome> {
        let user_id = new.user_id.trim().to_string();
        if user_id.is_empty() {
            return Err(DigestError::InvalidUpdate("user id is required".into()));
        }
        if new.event.ref_id().trim().is_empty() {
            return Err(DigestError::InvalidUpdate(format!(
                "{} update for {user_id} has an empty ref id",
                new.event.kind()
            )));
        }

        let id = update_id(&user_id, &new);
        if self.updates.iter().any(|u| u.id == id) {
            log::debug!("Update {id} already queued for {user_id}");
            return Ok(EnqueueOutcome {
                id,
                inserted: false,
            });
        }
        self.updates.push(PendingUpdate {
            id: id.clone(),
            user_id,
            event: new.event,
            summary: new.summary,
            metadata: new.metadata,
            created_at: Utc::now(),
            processed_at: None,
            processed_digest: None,
            processed_summary: None,
        });
        Ok(EnqueueOutcome { id, inserted: true })
    }

    fn users_with_pending(&self) -> Vec<String> {
        self.updates
            .iter()
            .filter(|u| u.is_pending())
            .map(|u| u.user_id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    fn pending_for(&self, user_id: &str, limit: usize) -> Vec<PendingUpdate> {
        let mut pending: Vec<PendingUpdate> = self
            .updates
            .iter()
            .filter(|u| u.is_pending() && u.user_id == user_id)
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        pending.truncate(limit);
        pending
    }

    fn mark_processed(&mut self, user_id: &str, processed: &[ProcessedUpdate], digest: &str) -> usize {
        let now = Utc::now();
        let mut updated = 0;
        for item in processed {
            let Some(update) = self
                .updates
                .iter_mut()
                .find(|u| u.id == item.id && u.user_id == user_id && u.is_pending())
            else {
                continue;
            };
            update.processed_at = Some(now);
            update.processed_digest = Some(digest.to_string());
            update.processed_summary.clone_from(&item.summary);
            updated += 1;
        }
        updated
    }

    fn has_pending(&self, user_id: &str) -> bool {
        self.updates
            .iter()
            .any(|u| u.is_pending() && u.user_id == user_id)
    }
}

/// Process-local queue.
#[derive(Debug, Default)]
pub struct InMemoryUpdateQueue {
    state: Mutex<QueueState>,
}

impl InMemoryUpdateQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn enqueue(&self, new: NewUpdate) -> Result<EnqueueOutcome> {
        self.state.lock().await.enqueue(new)
    }
}

#[async_trait]
impl PendingUpdateSource for InMemoryUpdateQueue {
    async fn list_users_with_pending(&self) -> Result<Vec<String>> {
        Ok(self.state.lock().await.users_with_pending())
    }

    async fn fetch_pending(&self, user_id: &str, limit: usize) -> Result<Vec<PendingUpdate>> {
        Ok(self.state.lock().await.pending_for(user_id, limit))
    }

    async fn mark_processed(
        &self,
        user_id: &str,
        updates: &[ProcessedUpdate],
        digest: &str,
    ) -> Result<usize> {
        Ok(self
            .state
            .lock()
            .await
            .mark_processed(user_id, updates, digest))
    }

    async fn has_pending(&self, user_id: &str) -> Result<bool> {
        Ok(self.state.lock().await.has_pending(user_id))
    }
}

/// Queue persisted as one JSON document; every operation reloads and, when mutating, rewrites
/// it through a temp file.
#[derive(Debug)]
pub struct JsonFileUpdateQueue {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileUpdateQueue {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn display_path(&self) -> String {
        self.path.display().to_string()
    }

    async fn load(&self) -> Result<QueueState> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) if text.trim().is_empty() => Ok(QueueState::default()),
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(QueueState::default()),
            Err(err) => Err(DigestError::io(self.display_path(), err)),
        }
    }

    async fn save(&self, state: &QueueState) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| DigestError::io(self.display_path(), err))?;
        }
        let json = serde_json::to_string_pretty(state)?;
        let mut tmp = self.path.as_os_str().to_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|err| DigestError::io(tmp.display().to_string(), err))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|err| DigestError::io(self.display_path(), err))
    }

    pub async fn enqueue(&self, new: NewUpdate) -> Result<EnqueueOutcome> {
        let _guard = self.lock.lock().await;
        let mut state = self.load().await?;
        let outcome = state.enqueue(new)?;
        if outcome.inserted {
            self.save(&state).await?;
        }
        Ok(outcome)
    }
}

#[async_trait]
impl PendingUpdateSource for JsonFileUpdateQueue {
    async fn list_users_with_pending(&self) -> Result<Vec<String>> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.users_with_pending())
    }

    async fn fetch_pending(&self, user_id: &str, limit: usize) -> Result<Vec<PendingUpdate>> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.pending_for(user_id, limit))
    }

    async fn mark_processed(
        &self,
        user_id: &str,
        updates: &[ProcessedUpdate],
        digest: &str,
    ) -> Result<usize> {
        let _guard = self.lock.lock().await;
        let mut state = self.load().await?;
        let updated = state.mark_processed(user_id, updates, digest);
        if updated > 0 {
            self.save(&state).await?;
        }
        Ok(updated)
    }

    async fn has_pending(&self, user_id: &str) -> Result<bool> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.has_pending(user_id))
    }
}
