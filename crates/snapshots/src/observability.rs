//! Structured JSON log lines for snapshot reads and markdown mutations.
//!
//! Both helpers are best effort: they report success as `bool` and never fail the caller.

use chrono::Utc;
use memory_markdown::ContentHash;
use serde::Serialize;
use std::time::Duration;

use crate::paths::DocumentKind;

pub const MUTATION_LOG_TARGET: &str = "memory::mutation";
pub const USAGE_LOG_TARGET: &str = "memory::snapshot_usage";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    User,
    Part,
    Relationship,
    Note,
}

/// Entity a document path belongs to. Paths outside `users/<id>/` are notes.
#[must_use]
pub fn infer_entity(path: &str) -> (EntityType, Option<String>, Option<String>) {
    let normalized = path.replace('\\', "/");
    let mut segments = normalized.trim_start_matches('/').split('/');
    if segments.next() != Some("users") {
        return (EntityType::Note, None, None);
    }
    let Some(user) = segments.next().filter(|s| !s.is_empty()) else {
        return (EntityType::Note, None, None);
    };
    let user = Some(user.to_string());
    let scope = segments.next();
    let target = segments
        .next()
        .map(|s| s.strip_suffix(".md").unwrap_or(s).to_string())
        .filter(|s| !s.is_empty());
    match (scope, target) {
        (Some("parts"), Some(id)) => (EntityType::Part, Some(id), user),
        (Some("relationships"), Some(id)) => (EntityType::Relationship, Some(id), user),
        _ => (EntityType::User, user.clone(), user),
    }
}

#[derive(Debug, Serialize)]
struct MutationLine<'a> {
    ts: String,
    event: &'static str,
    user_id: Option<String>,
    entity_type: EntityType,
    entity_id: Option<String>,
    op: &'a str,
    section_anchor: &'a str,
    file_path: &'a str,
    before_hash: &'a ContentHash,
    after_hash: &'a ContentHash,
    warnings: &'a [String],
    status: &'static str,
}

/// A committed section edit.
#[derive(Debug, Clone, Copy)]
pub struct MutationRecord<'a> {
    pub path: &'a str,
    pub anchor: &'a str,
    pub op: &'a str,
    pub before_hash: &'a ContentHash,
    pub after_hash: &'a ContentHash,
    pub warnings: &'a [String],
}

pub fn log_markdown_mutation(record: &MutationRecord<'_>) -> bool {
    let (entity_type, entity_id, user_id) = infer_entity(record.path);
    let line = MutationLine {
        ts: Utc::now().to_rfc3339(),
        event: "profile_update",
        user_id,
        entity_type,
        entity_id,
        op: record.op,
        section_anchor: record.anchor,
        file_path: record.path,
        before_hash: record.before_hash,
        after_hash: record.after_hash,
        warnings: record.warnings,
        status: "committed",
    };
    emit(MUTATION_LOG_TARGET, &line)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotStatus {
    Hit,
    Miss,
    Error,
}

#[derive(Debug, Serialize)]
struct UsageLine<'a> {
    ts: String,
    event: &'static str,
    kind: DocumentKind,
    status: SnapshotStatus,
    latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

pub fn record_snapshot_usage(
    kind: DocumentKind,
    status: SnapshotStatus,
    latency: Duration,
    user_id: Option<&str>,
    error: Option<&str>,
) -> bool {
    let line = UsageLine {
        ts: Utc::now().to_rfc3339(),
        event: "snapshot_usage",
        kind,
        status,
        latency_ms: u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
        user_id,
        error,
    };
    emit(USAGE_LOG_TARGET, &line)
}

fn emit<T: Serialize>(target: &str, line: &T) -> bool {
    match serde_json::to_string(line) {
        Ok(json) => {
            log::info!(target: target, "{json}");
            true
        }
        Err(err) => {
            log::warn!("Failed to serialize {target} record: {err}");
            false
        }
    }
}
