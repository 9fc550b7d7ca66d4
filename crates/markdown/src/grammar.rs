use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::anchor::{render_anchor_marker, validate_anchor};
use crate::canonical::canonicalize_text;

pub const IDENTITY: &str = "identity v1";
pub const CURRENT_FOCUS: &str = "current_focus v1";
pub const CONFIRMED_PARTS: &str = "confirmed_parts v1";
pub const CHANGE_LOG: &str = "change_log v1";
pub const ROLE: &str = "role v1";
pub const EVIDENCE: &str = "evidence v1";
pub const DYNAMICS: &str = "dynamics v1";

const PLACEHOLDER: &str = "- TBD";

/// Timestamp format used in change-log lines.
#[must_use]
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[must_use]
pub fn change_log_line(at: DateTime<Utc>, message: &str) -> String {
    format!("- {}: {}", format_timestamp(at), sanitize_value(message))
}

/// Values are interpolated into single bullet lines.
fn sanitize_value(value: &str) -> String {
    value
        .split(&['\r', '\n'][..])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Assembles `# title` plus anchored sections in grammar layout.
#[derive(Debug, Clone)]
pub struct DocumentBuilder {
    out: String,
}

impl DocumentBuilder {
    #[must_use]
    pub fn new(title: &str) -> Self {
        Self {
            out: format!("# {}\n", sanitize_value(title)),
        }
    }

    #[must_use]
    pub fn section<I, S>(mut self, anchor: &str, heading: &str, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        debug_assert!(validate_anchor(anchor).is_ok(), "unrenderable anchor {anchor:?}");
        self.out.push('\n');
        self.out.push_str(&render_anchor_marker(anchor));
        self.out.push_str("\n## ");
        self.out.push_str(heading);
        self.out.push_str("\n\n");
        for line in lines {
            self.out.push_str(line.as_ref());
            self.out.push('\n');
        }
        self
    }

    #[must_use]
    pub fn field(label: &str, value: &str) -> String {
        format!("- {label}: {}", sanitize_value(value))
    }

    #[must_use]
    pub fn build(self) -> String {
        canonicalize_text(&self.out)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartSeed {
    pub user_id: String,
    pub part_id: String,
    pub name: String,
    pub status: String,
    pub category: String,
}

impl PartSeed {
    /// Seed with only ids known; used when a profile is scaffolded on first edit.
    #[must_use]
    pub fn placeholder(user_id: &str, part_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            part_id: part_id.to_string(),
            name: part_id.to_string(),
            status: "emerging".to_string(),
            category: "unknown".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipSeed {
    pub user_id: String,
    pub relationship_id: String,
    pub relationship_type: String,
    pub status: String,
    pub part_ids: Vec<String>,
}

impl RelationshipSeed {
    #[must_use]
    pub fn placeholder(user_id: &str, relationship_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            relationship_id: relationship_id.to_string(),
            relationship_type: "unknown".to_string(),
            status: "active".to_string(),
            part_ids: Vec::new(),
        }
    }
}

#[must_use]
pub fn build_user_overview(user_id: &str, now: DateTime<Utc>) -> String {
    DocumentBuilder::new("User Overview")
        .section(IDENTITY, "Identity", [DocumentBuilder::field("User ID", user_id)])
        .section(CURRENT_FOCUS, "Current Focus", [PLACEHOLDER])
        .section(CONFIRMED_PARTS, "Confirmed Parts", [PLACEHOLDER])
        .section(
            CHANGE_LOG,
            "Change Log",
            [change_log_line(now, "initialized overview")],
        )
        .build()
}

#[must_use]
pub fn build_part_profile(part: &PartSeed, now: DateTime<Utc>) -> String {
    DocumentBuilder::new(&format!("Part: {}", part.name))
        .section(
            IDENTITY,
            "Identity",
            [
                DocumentBuilder::field("Part ID", &part.part_id),
                DocumentBuilder::field("User ID", &part.user_id),
                DocumentBuilder::field("Status", &part.status),
                DocumentBuilder::field("Category", &part.category),
            ],
        )
        .section(ROLE, "Role", [PLACEHOLDER])
        .section(EVIDENCE, "Evidence (curated)", ["- (add up to 7 items)"])
        .section(
            CHANGE_LOG,
            "Change Log",
            [change_log_line(now, "initialized profile")],
        )
        .build()
}

#[must_use]
pub fn build_relationship_profile(rel: &RelationshipSeed, now: DateTime<Utc>) -> String {
    let parts = if rel.part_ids.is_empty() {
        "none".to_string()
    } else {
        rel.part_ids.join(", ")
    };
    DocumentBuilder::new(&format!("Relationship: {}", rel.relationship_type))
        .section(
            IDENTITY,
            "Identity",
            [
                DocumentBuilder::field("Relationship ID", &rel.relationship_id),
                DocumentBuilder::field("User ID", &rel.user_id),
                DocumentBuilder::field("Type", &rel.relationship_type),
                DocumentBuilder::field("Status", &rel.status),
                DocumentBuilder::field("Parts", &parts),
            ],
        )
        .section(DYNAMICS, "Dynamics", [PLACEHOLDER])
        .section(EVIDENCE, "Evidence (curated)", ["- (add up to 7 items)"])
        .section(
            CHANGE_LOG,
            "Change Log",
            [change_log_line(now, "initialized relationship")],
        )
        .build()
}
