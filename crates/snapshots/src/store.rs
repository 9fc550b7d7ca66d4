use chrono::Utc;
use memory_markdown::grammar::{
    build_part_profile, build_relationship_profile, build_user_overview, change_log_line,
    PartSeed, RelationshipSeed, CHANGE_LOG,
};
use memory_markdown::{
    parse_document, patch_section, validate_anchor, ContentHash, Fragment, SectionChange,
};
use memory_storage::{normalize_object_path, StorageAdapter};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

use crate::observability::{
    log_markdown_mutation, record_snapshot_usage, MutationRecord, SnapshotStatus,
};
use crate::paths::{
    part_profile_path, relationship_profile_path, user_overview_path, DocumentKind, DocumentRef,
};
use crate::{Result, SnapshotError};

/// A stored document, parsed.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotDocument {
    pub path: String,
    pub text: String,
    pub hash: ContentHash,
    pub preamble: String,
    pub fragments: Vec<Fragment>,
    pub warnings: Vec<String>,
}

impl SnapshotDocument {
    fn parse(path: String, text: String) -> Self {
        let parsed = parse_document(&text);
        Self {
            hash: ContentHash::of(&text),
            preamble: parsed.preamble,
            fragments: parsed.fragments,
            warnings: parsed.warnings,
            path,
            text,
        }
    }

    #[must_use]
    pub fn fragment(&self, anchor: &str) -> Option<&Fragment> {
        self.fragments.iter().find(|f| f.anchor == anchor)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnsureOutcome {
    pub path: String,
    pub created: bool,
    pub hash: ContentHash,
}

/// Structural warnings found while reassembling an edited document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EditLint {
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EditOutcome {
    pub path: String,
    pub anchor: String,
    pub before_hash: ContentHash,
    pub after_hash: ContentHash,
    pub lint: EditLint,
    pub changed: bool,
}

/// Snapshot documents on top of a [`StorageAdapter`].
///
/// Edits are read-modify-write with no locking; the last writer wins. Callers that need
/// optimistic concurrency compare hashes (see [`SnapshotStore::edit_expecting`]).
#[derive(Clone)]
pub struct SnapshotStore {
    storage: Arc<dyn StorageAdapter>,
}

impl SnapshotStore {
    #[must_use]
    pub fn new(storage: Arc<dyn StorageAdapter>) -> Self {
        Self { storage }
    }

    #[must_use]
    pub fn storage(&self) -> &Arc<dyn StorageAdapter> {
        &self.storage
    }

    /// Reads and parses `path`. Never writes.
    pub async fn read_document(&self, path: &str) -> Result<Option<SnapshotDocument>> {
        let started = Instant::now();
        let doc_ref = normalize_object_path(path)
            .ok()
            .and_then(|p| DocumentRef::from_path(&p));
        let result = self.storage.get_text(path).await;

        if let Some(doc_ref) = &doc_ref {
            let (status, error) = match &result {
                Ok(Some(_)) => (SnapshotStatus::Hit, None),
                Ok(None) => (SnapshotStatus::Miss, None),
                Err(err) => (SnapshotStatus::Error, Some(err.to_string())),
            };
            record_snapshot_usage(
                doc_ref.kind,
                status,
                started.elapsed(),
                Some(&doc_ref.user_id),
                error.as_deref(),
            );
        }

        Ok(result?.map(|text| SnapshotDocument::parse(path.to_string(), text)))
    }

    pub async fn ensure_overview_exists(&self, user_id: &str) -> Result<EnsureOutcome> {
        let path = user_overview_path(user_id)?;
        let user_id = user_id.trim();
        self.ensure_with(path, || build_user_overview(user_id, Utc::now()))
            .await
    }

    pub async fn ensure_part_profile_exists(&self, seed: &PartSeed) -> Result<EnsureOutcome> {
        let path = part_profile_path(&seed.user_id, &seed.part_id)?;
        self.ensure_with(path, || build_part_profile(seed, Utc::now()))
            .await
    }

    pub async fn ensure_relationship_profile_exists(
        &self,
        seed: &RelationshipSeed,
    ) -> Result<EnsureOutcome> {
        let path = relationship_profile_path(&seed.user_id, &seed.relationship_id)?;
        self.ensure_with(path, || build_relationship_profile(seed, Utc::now()))
            .await
    }

    pub(crate) async fn ensure_with(
        &self,
        path: String,
        build: impl FnOnce() -> String + Send,
    ) -> Result<EnsureOutcome> {
        if let Some(existing) = self.storage.get_text(&path).await? {
            return Ok(EnsureOutcome {
                hash: ContentHash::of(&existing),
                path,
                created: false,
            });
        }
        let text = build();
        self.storage.put_text(&path, &text).await?;
        log::info!("Scaffolded snapshot {path}");
        Ok(EnsureOutcome {
            hash: ContentHash::of(&text),
            path,
            created: true,
        })
    }

    /// Appends to or replaces the section `anchor` of the document at `path`.
    ///
    /// A missing canonical document is scaffolded first and reported with an `absent`
    /// before-hash. Missing sections are never created.
    pub async fn edit_section(
        &self,
        path: &str,
        anchor: &str,
        change: &SectionChange,
    ) -> Result<EditOutcome> {
        validate_anchor(anchor).map_err(|err| SnapshotError::from_markdown(path, err))?;
        let (text, scaffolded) = match self.storage.get_text(path).await? {
            Some(text) => (text, false),
            None => (scaffold_for_path(path)?, true),
        };

        let patched =
            patch_section(&text, anchor, change).map_err(|err| SnapshotError::from_markdown(path, err))?;

        if patched.changed || scaffolded {
            self.storage.put_text(path, &patched.text).await?;
        }

        let before_hash = if scaffolded {
            ContentHash::absent()
        } else {
            patched.before_hash
        };
        let outcome = EditOutcome {
            path: path.to_string(),
            anchor: anchor.to_string(),
            before_hash,
            after_hash: patched.after_hash,
            lint: EditLint {
                warnings: patched.warnings,
            },
            changed: patched.changed || scaffolded,
        };

        if outcome.changed {
            log::debug!(
                "{} {anchor} in {path}: {} -> {}",
                change.op_name(),
                outcome.before_hash,
                outcome.after_hash
            );
            log_markdown_mutation(&MutationRecord {
                path,
                anchor,
                op: change.op_name(),
                before_hash: &outcome.before_hash,
                after_hash: &outcome.after_hash,
                warnings: &outcome.lint.warnings,
            });
        }
        for warning in &outcome.lint.warnings {
            log::warn!("{path}: {warning}");
        }
        Ok(outcome)
    }

    /// Like [`Self::edit_section`] but refuses to write unless the stored document still
    /// hashes to `expected_before` (`absent` when it must not exist yet).
    ///
    /// The check and the write are separate storage calls, so a concurrent writer can still
    /// slip in between them.
    pub async fn edit_expecting(
        &self,
        path: &str,
        anchor: &str,
        change: &SectionChange,
        expected_before: &ContentHash,
    ) -> Result<EditOutcome> {
        let actual = match self.storage.get_text(path).await? {
            Some(text) => ContentHash::of(&text),
            None => ContentHash::absent(),
        };
        if &actual != expected_before {
            return Err(SnapshotError::HashMismatch {
                path: path.to_string(),
                expected: expected_before.clone(),
                actual,
            });
        }
        self.edit_section(path, anchor, change).await
    }

    /// Appends a timestamped line to the change log of `path`.
    pub async fn append_change_log(&self, path: &str, line: &str) -> Result<EditOutcome> {
        let entry = change_log_line(Utc::now(), line);
        self.edit_section(path, CHANGE_LOG, &SectionChange::Append(entry))
            .await
    }

    pub async fn on_part_created(&self, seed: &PartSeed) -> Result<EditOutcome> {
        let ensured = self.ensure_part_profile_exists(seed).await?;
        self.append_change_log(
            &ensured.path,
            &format!(
                "created part \"{}\" (status: {}, category: {})",
                seed.name, seed.status, seed.category
            ),
        )
        .await
    }

    pub async fn on_part_updated(
        &self,
        user_id: &str,
        part_id: &str,
        name: &str,
        change: &str,
    ) -> Result<EditOutcome> {
        let seed = PartSeed {
            name: name.to_string(),
            status: "unknown".to_string(),
            ..PartSeed::placeholder(user_id.trim(), part_id.trim())
        };
        let ensured = self.ensure_part_profile_exists(&seed).await?;
        self.append_change_log(&ensured.path, &format!("updated part \"{name}\": {change}"))
            .await
    }
}

fn scaffold_for_path(path: &str) -> Result<String> {
    let not_found = || SnapshotError::DocumentNotFound {
        path: path.to_string(),
    };
    let normalized = normalize_object_path(path)?;
    let doc_ref = DocumentRef::from_path(&normalized).ok_or_else(not_found)?;
    let entity = doc_ref.entity_id.as_deref().unwrap_or_default();
    let now = Utc::now();
    let text = match doc_ref.kind {
        DocumentKind::UserOverview => build_user_overview(&doc_ref.user_id, now),
        DocumentKind::PartProfile => {
            build_part_profile(&PartSeed::placeholder(&doc_ref.user_id, entity), now)
        }
        DocumentKind::RelationshipProfile => build_relationship_profile(
            &RelationshipSeed::placeholder(&doc_ref.user_id, entity),
            now,
        ),
    };
    log::info!("Scaffolding {} for first edit of {normalized}", doc_ref.kind);
    Ok(text)
}
