use memory_markdown::grammar::CHANGE_LOG;
use memory_markdown::{Fragment, SectionChange};
use memory_snapshots::SnapshotStore;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::queue::{PendingUpdateSource, ProcessedUpdate};
use crate::summarizer::{UpdateDigest, UpdateSummarizer};
use crate::Result;

pub const DEFAULT_BATCH_LIMIT: usize = 25;
pub const MAX_BATCH_LIMIT: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestSettings {
    /// Pending updates fetched per user per run.
    pub batch_limit: usize,
}

impl Default for DigestSettings {
    fn default() -> Self {
        Self {
            batch_limit: DEFAULT_BATCH_LIMIT,
        }
    }
}

impl DigestSettings {
    #[must_use]
    pub fn with_batch_limit(limit: usize) -> Self {
        Self {
            batch_limit: limit.clamp(1, MAX_BATCH_LIMIT),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    NoUpdates,
    NoDigest,
    NoMatchingUpdates,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateSummarizerResult {
    pub user_id: String,
    pub processed_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    pub item_count: usize,
    pub skipped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<SkipReason>,
}

impl UpdateSummarizerResult {
    fn skipped(user_id: &str, reason: SkipReason, digest: Option<String>) -> Self {
        Self {
            user_id: user_id.to_string(),
            processed_ids: Vec::new(),
            digest,
            item_count: 0,
            skipped: true,
            reason: Some(reason),
        }
    }
}

/// Outcome for one user of a batch run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DigestRunEntry {
    Ok(UpdateSummarizerResult),
    Error { user_id: String, error: String },
}

impl DigestRunEntry {
    #[must_use]
    pub fn user_id(&self) -> &str {
        match self {
            Self::Ok(result) => &result.user_id,
            Self::Error { user_id, .. } => user_id,
        }
    }

    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DigestRunReport {
    pub entries: Vec<DigestRunEntry>,
}

impl DigestRunReport {
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_error()).count()
    }

    #[must_use]
    pub fn processed_count(&self) -> usize {
        self.entries
            .iter()
            .map(|entry| match entry {
                DigestRunEntry::Ok(result) => result.item_count,
                DigestRunEntry::Error { .. } => 0,
            })
            .sum()
    }
}

fn section_has_line(fragment: &Fragment, line: &str) -> bool {
    fragment.body.lines().any(|existing| existing.trim_end() == line)
}

/// Items of `digest` that refer to updates actually pending; anything else is ignored.
fn select_processed(pending_ids: &HashSet<&str>, digest: &UpdateDigest) -> Vec<ProcessedUpdate> {
    digest
        .items
        .iter()
        .filter(|item| pending_ids.contains(item.id.as_str()))
        .map(|item| ProcessedUpdate {
            id: item.id.clone(),
            summary: Some(item.summary.clone()),
        })
        .collect()
}

/// Folds one user's pending updates into their overview.
///
/// Ensures the overview exists, summarizes up to `batch_limit` updates, appends each covered
/// item to its target section, appends the digest to the change log and only then marks the
/// items processed. Any error leaves the updates queued for the next run; lines already present
/// in their section are not appended again.
pub async fn summarize_pending_updates_for_user(
    store: &SnapshotStore,
    source: &dyn PendingUpdateSource,
    summarizer: &dyn UpdateSummarizer,
    user_id: &str,
    settings: &DigestSettings,
) -> Result<UpdateSummarizerResult> {
    let overview = store.ensure_overview_exists(user_id).await?;

    let pending = source
        .fetch_pending(user_id, settings.batch_limit.clamp(1, MAX_BATCH_LIMIT))
        .await?;
    if pending.is_empty() {
        return Ok(UpdateSummarizerResult::skipped(user_id, SkipReason::NoUpdates, None));
    }

    let Some(digest) = summarizer.summarize(user_id, &pending).await? else {
        return Ok(UpdateSummarizerResult::skipped(user_id, SkipReason::NoDigest, None));
    };

    let pending_ids: HashSet<&str> = pending.iter().map(|u| u.id.as_str()).collect();
    let processed = select_processed(&pending_ids, &digest);
    let trimmed = digest.digest.trim().to_string();
    if processed.is_empty() {
        return Ok(UpdateSummarizerResult::skipped(
            user_id,
            SkipReason::NoMatchingUpdates,
            Some(trimmed).filter(|d| !d.is_empty()),
        ));
    }

    // A run that failed after writing but before marking leaves its lines in place; the
    // rerun must not fold them twice.
    let doc = store.read_document(&overview.path).await?;
    let mut appended = 0usize;
    let mut already_folded = 0usize;
    for item in digest
        .items
        .iter()
        .filter(|item| pending_ids.contains(item.id.as_str()))
    {
        let Some(anchor) = item.target_anchor.as_deref() else {
            continue;
        };
        let Some(fragment) = doc.as_ref().and_then(|doc| doc.fragment(anchor)) else {
            log::warn!("Digest item {} targets unknown section '{anchor}' for {user_id}", item.id);
            continue;
        };
        let line = format!("- {}", item.summary.trim());
        if section_has_line(fragment, &line) {
            log::debug!("Digest item {} already in '{anchor}' for {user_id}", item.id);
            already_folded += 1;
            continue;
        }
        store
            .edit_section(&overview.path, anchor, &SectionChange::Append(line))
            .await?;
        appended += 1;
    }

    let entry = format!("digest: {trimmed}");
    let replayed = appended == 0
        && already_folded > 0
        && doc
            .as_ref()
            .and_then(|doc| doc.fragment(CHANGE_LOG))
            .and_then(|log| log.body.lines().rev().find(|l| !l.trim().is_empty()))
            .is_some_and(|last| last.trim_end().ends_with(&entry));
    if !trimmed.is_empty() && !replayed {
        store.append_change_log(&overview.path, &entry).await?;
    }

    let marked = source.mark_processed(user_id, &processed, &trimmed).await?;
    log::info!(
        "Digested {marked} of {} pending updates for {user_id}",
        pending.len()
    );

    Ok(UpdateSummarizerResult {
        user_id: user_id.to_string(),
        processed_ids: processed.into_iter().map(|p| p.id).collect(),
        digest: Some(trimmed).filter(|d| !d.is_empty()),
        item_count: marked,
        skipped: false,
        reason: None,
    })
}

/// Runs the digest for every user with pending updates, one user at a time.
///
/// A failure for one user becomes an error entry; the remaining users still run. Only failing
/// to enumerate users fails the whole run.
pub async fn run_digest(
    store: &SnapshotStore,
    source: &dyn PendingUpdateSource,
    summarizer: &dyn UpdateSummarizer,
    settings: &DigestSettings,
) -> Result<DigestRunReport> {
    let users = source.list_users_with_pending().await?;
    log::info!("Digest run over {} users", users.len());

    let mut report = DigestRunReport::default();
    for user_id in users {
        let outcome =
            summarize_pending_updates_for_user(store, source, summarizer, &user_id, settings).await;
        let entry = match outcome {
            Ok(result) => DigestRunEntry::Ok(result),
            Err(err) => {
                log::warn!("Digest failed for {user_id}: {err}");
                DigestRunEntry::Error {
                    user_id,
                    error: err.to_string(),
                }
            }
        };
        report.entries.push(entry);
    }
    Ok(report)
}
