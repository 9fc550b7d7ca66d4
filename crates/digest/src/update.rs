use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    Session,
    CheckIn,
    Onboarding,
    InboxAction,
    Manual,
}

impl UpdateKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Session => "session",
            Self::CheckIn => "check_in",
            Self::Onboarding => "onboarding",
            Self::InboxAction => "inbox_action",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for UpdateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened, one closed payload per update kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UpdateEvent {
    Session {
        session_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        summary: Option<String>,
    },
    CheckIn {
        check_in_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mood: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        note: Option<String>,
    },
    Onboarding {
        step: String,
    },
    InboxAction {
        item_id: String,
        action: String,
    },
    Manual {
        note_id: String,
        note: String,
    },
}

impl UpdateEvent {
    #[must_use]
    pub const fn kind(&self) -> UpdateKind {
        match self {
            Self::Session { .. } => UpdateKind::Session,
            Self::CheckIn { .. } => UpdateKind::CheckIn,
            Self::Onboarding { .. } => UpdateKind::Onboarding,
            Self::InboxAction { .. } => UpdateKind::InboxAction,
            Self::Manual { .. } => UpdateKind::Manual,
        }
    }

    /// The source record this update refers to; deduplication key together with user and kind.
    #[must_use]
    pub fn ref_id(&self) -> &str {
        match self {
            Self::Session { session_id, .. } => session_id,
            Self::CheckIn { check_in_id, .. } => check_in_id,
            Self::Onboarding { step } => step,
            Self::InboxAction { item_id, .. } => item_id,
            Self::Manual { note_id, .. } => note_id,
        }
    }

    /// One-line human description.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Session {
                summary: Some(summary),
                ..
            } => format!("Session: {}", summary.trim()),
            Self::Session { session_id, .. } => format!("Session {session_id} completed"),
            Self::CheckIn { mood, note, .. } => {
                let mut out = String::from("Check-in");
                if let Some(mood) = mood.as_deref().filter(|m| !m.trim().is_empty()) {
                    out.push_str(&format!(" (mood: {})", mood.trim()));
                }
                if let Some(note) = note.as_deref().filter(|n| !n.trim().is_empty()) {
                    out.push_str(&format!(": {}", note.trim()));
                }
                out
            }
            Self::Onboarding { step } => format!("Onboarding step {step} completed"),
            Self::InboxAction { item_id, action } => format!("Inbox item {item_id}: {action}"),
            Self::Manual { note, .. } => note.trim().to_string(),
        }
    }
}

/// Input to `enqueue`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewUpdate {
    pub user_id: String,
    pub event: UpdateEvent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Opaque caller data, carried through untouched.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl NewUpdate {
    #[must_use]
    pub fn new(user_id: impl Into<String>, event: UpdateEvent) -> Self {
        Self {
            user_id: user_id.into(),
            event,
            summary: None,
            metadata: serde_json::Value::Null,
        }
    }
}

/// A queued update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingUpdate {
    pub id: String,
    pub user_id: String,
    pub event: UpdateEvent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_digest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_summary: Option<String>,
}

impl PendingUpdate {
    #[must_use]
    pub const fn kind(&self) -> UpdateKind {
        self.event.kind()
    }

    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.processed_at.is_none()
    }

    /// Caller summary if present, otherwise a description of the event.
    #[must_use]
    pub fn display_summary(&self) -> String {
        self.summary
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map_or_else(|| self.event.describe(), str::to_string)
    }
}
