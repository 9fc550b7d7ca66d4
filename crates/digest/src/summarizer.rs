use async_trait::async_trait;
use memory_markdown::grammar::CURRENT_FOCUS;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::update::{PendingUpdate, UpdateKind};
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FollowUp {
    #[default]
    None,
    CheckIn,
    Investigate,
    Manual,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestItem {
    /// Id of the pending update this item covers.
    pub id: String,
    pub kind: UpdateKind,
    pub summary: String,
    #[serde(default)]
    pub follow_up: FollowUp,
    /// Overview section the summary is folded into; `None` leaves it to the change log.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_anchor: Option<String>,
}

/// Summarizer output for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateDigest {
    pub digest: String,
    #[serde(default)]
    pub items: Vec<DigestItem>,
    /// Updates the summarizer could not cover; they stay queued.
    #[serde(default)]
    pub leftover_ids: Vec<String>,
}

/// Turns a user's pending updates into a digest.
///
/// `Ok(None)` means the summarizer produced nothing usable; the runner skips the user.
#[async_trait]
pub trait UpdateSummarizer: Send + Sync {
    async fn summarize(&self, user_id: &str, pending: &[PendingUpdate]) -> Result<Option<UpdateDigest>>;
}

const MAX_DIGEST_CHARS: usize = 400;
const MAX_ITEM_CHARS: usize = 240;

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max.saturating_sub(3)).collect();
    out.push_str("...");
    out
}

/// Deterministic summarizer built from the updates' own summaries.
///
/// Sessions and check-ins are folded into the current focus; everything else is covered by the
/// digest line only.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractiveSummarizer;

impl ExtractiveSummarizer {
    fn target_for(kind: UpdateKind) -> Option<String> {
        match kind {
            UpdateKind::Session | UpdateKind::CheckIn => Some(CURRENT_FOCUS.to_string()),
            UpdateKind::Onboarding | UpdateKind::InboxAction | UpdateKind::Manual => None,
        }
    }
}

#[async_trait]
impl UpdateSummarizer for ExtractiveSummarizer {
    async fn summarize(&self, _user_id: &str, pending: &[PendingUpdate]) -> Result<Option<UpdateDigest>> {
        if pending.is_empty() {
            return Ok(None);
        }

        let mut counts: BTreeMap<UpdateKind, usize> = BTreeMap::new();
        let items = pending
            .iter()
            .map(|update| {
                *counts.entry(update.kind()).or_default() += 1;
                DigestItem {
                    id: update.id.clone(),
                    kind: update.kind(),
                    summary: truncate_chars(&update.display_summary(), MAX_ITEM_CHARS),
                    follow_up: if update.kind() == UpdateKind::Manual {
                        FollowUp::Manual
                    } else {
                        FollowUp::None
                    },
                    target_anchor: Self::target_for(update.kind()),
                }
            })
            .collect();

        let breakdown = counts
            .iter()
            .map(|(kind, count)| format!("{count} {kind}"))
            .collect::<Vec<_>>()
            .join(", ");
        let noun = if pending.len() == 1 { "update" } else { "updates" };
        let digest = format!("Digested {} {noun} ({breakdown}).", pending.len());

        Ok(Some(UpdateDigest {
            digest: truncate_chars(&digest, MAX_DIGEST_CHARS),
            items,
            leftover_ids: Vec::new(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::update::UpdateEvent;
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn pending(id: &str, event: UpdateEvent) -> PendingUpdate {
        PendingUpdate {
            id: id.into(),
            user_id: "u1".into(),
            event,
            summary: None,
            metadata: serde_json::Value::Null,
            created_at: Utc::now(),
            processed_at: None,
            processed_digest: None,
            processed_summary: None,
        }
    }

    #[tokio::test]
    async fn extractive_digest_covers_every_update() {
        let updates = vec![
            pending(
                "a",
                UpdateEvent::Session {
                    session_id: "s1".into(),
                    summary: Some("Met the Critic".into()),
                },
            ),
            pending(
                "b",
                UpdateEvent::Onboarding {
                    step: "values".into(),
                },
            ),
            pending(
                "c",
                UpdateEvent::Session {
                    session_id: "s2".into(),
                    summary: None,
                },
            ),
        ];
        let digest = ExtractiveSummarizer
            .summarize("u1", &updates)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(digest.digest, "Digested 3 updates (2 session, 1 onboarding).");
        let ids: Vec<&str> = digest.items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(digest.items[0].summary, "Session: Met the Critic");
        assert_eq!(digest.items[0].target_anchor.as_deref(), Some(CURRENT_FOCUS));
        assert_eq!(digest.items[1].target_anchor, None);
    }

    #[tokio::test]
    async fn nothing_to_summarize() {
        assert_eq!(ExtractiveSummarizer.summarize("u1", &[]).await.unwrap(), None);
    }

    #[test]
    fn truncates_by_characters() {
        assert_eq!(truncate_chars("ééééé", 4), "é...");
        assert_eq!(truncate_chars("short", 10), "short");
    }
}
