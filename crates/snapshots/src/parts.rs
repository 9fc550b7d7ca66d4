//! Part profiles as records: frontmatter metadata plus the anchored sections below it.
//!
//! Profiles written before frontmatter existed still read; their summary falls back to the
//! `# Part:` title and the `Status`/`Category` fields of the identity section.

use chrono::{DateTime, Utc};
use memory_markdown::grammar::{build_part_profile, PartSeed, IDENTITY};
use memory_markdown::{
    build_part_markdown_with_frontmatter, parse_part_markdown, update_part_frontmatter,
    ContentHash, Fragment, PartFrontmatter, PartFrontmatterUpdate, SectionChange,
    DEFAULT_PART_CATEGORY, DEFAULT_PART_STATUS,
};
use serde::{Deserialize, Serialize};

use crate::observability::{log_markdown_mutation, MutationRecord};
use crate::paths::{part_profile_path, user_root, DocumentKind, DocumentRef};
use crate::store::{EditOutcome, EnsureOutcome, SnapshotDocument, SnapshotStore};
use crate::{Result, SnapshotError};

const PARTS_DIR: &str = "parts";
const FRONTMATTER_TARGET: &str = "frontmatter";
const FRONTMATTER_OP: &str = "update_frontmatter";

/// Every field narrows the listing; an empty filter lists all parts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ListPartsFilter {
    /// Case-insensitive substring of the part name.
    pub query: Option<String>,
    pub category: Option<String>,
    pub status: Option<String>,
    pub tag: Option<String>,
    pub limit: Option<usize>,
}

impl ListPartsFilter {
    fn admits(&self, part: &PartSummary) -> bool {
        let same = |want: &Option<String>, have: &str| {
            want.as_deref()
                .map_or(true, |want| want.eq_ignore_ascii_case(have))
        };
        same(&self.category, &part.category)
            && same(&self.status, &part.status)
            && self
                .tag
                .as_deref()
                .map_or(true, |tag| part.tags.iter().any(|t| t == tag))
            && self.query.as_deref().map_or(true, |query| {
                part.name.to_lowercase().contains(&query.to_lowercase())
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartSummary {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
    pub category: String,
    pub status: String,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_active: Option<DateTime<Utc>>,
}

/// A part profile read in full.
#[derive(Debug, Clone, Serialize)]
pub struct Part {
    #[serde(flatten)]
    pub summary: PartSummary,
    pub related_parts: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    /// `None` for profiles without a usable frontmatter block.
    pub frontmatter: Option<PartFrontmatter>,
    pub sections: Vec<Fragment>,
    pub path: String,
    pub hash: ContentHash,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrontmatterOutcome {
    pub path: String,
    pub before_hash: ContentHash,
    pub after_hash: ContentHash,
    pub frontmatter: PartFrontmatter,
}

/// `value` of a `- Key: value` line in `identity`.
fn identity_field<'a>(identity: &'a Fragment, key: &str) -> Option<&'a str> {
    identity.body.lines().find_map(|line| {
        let (k, v) = line.trim().strip_prefix('-')?.split_once(':')?;
        let v = v.trim();
        (k.trim().eq_ignore_ascii_case(key) && !v.is_empty()).then_some(v)
    })
}

fn title_name(preamble: &str) -> Option<&str> {
    preamble
        .lines()
        .find_map(|line| line.trim().strip_prefix("# Part:"))
        .map(str::trim)
        .filter(|name| !name.is_empty())
}

/// `None` when the document has neither frontmatter nor an identity section.
fn part_from_document(part_id: &str, doc: SnapshotDocument) -> Option<Part> {
    let parsed = parse_part_markdown(&doc.text);
    let mut warnings = doc.warnings;
    warnings.extend(parsed.warnings);

    let (summary, related_parts, created_at, updated_at) = match &parsed.frontmatter {
        Some(fm) => (
            PartSummary {
                id: fm.id.clone(),
                name: fm.name.clone(),
                emoji: fm.emoji.clone(),
                category: fm.category.clone(),
                status: fm.status.clone(),
                tags: fm.tags.clone(),
                last_active: fm.last_active,
            },
            fm.related_parts.clone(),
            fm.created_at,
            fm.updated_at,
        ),
        None => {
            let identity = doc.fragments.iter().find(|f| f.anchor == IDENTITY)?;
            let field = |key: &str, default: &str| {
                identity_field(identity, key).map_or_else(|| default.to_string(), str::to_lowercase)
            };
            let summary = PartSummary {
                id: part_id.to_string(),
                name: title_name(&doc.preamble).unwrap_or(part_id).to_string(),
                emoji: None,
                category: field("Category", DEFAULT_PART_CATEGORY),
                status: field("Status", DEFAULT_PART_STATUS),
                tags: Vec::new(),
                last_active: None,
            };
            (summary, Vec::new(), None, None)
        }
    };

    Some(Part {
        summary,
        related_parts,
        created_at,
        updated_at,
        frontmatter: parsed.frontmatter,
        sections: doc.fragments,
        path: doc.path,
        hash: doc.hash,
        warnings,
    })
}

/// Query and update API for one user's part profiles.
#[derive(Clone)]
pub struct PartsRepository {
    store: SnapshotStore,
}

impl PartsRepository {
    #[must_use]
    pub fn new(store: SnapshotStore) -> Self {
        Self { store }
    }

    #[must_use]
    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    /// Scaffolds a profile that opens with a frontmatter block built from `seed` and
    /// `details`. An existing profile is left untouched.
    pub async fn create_part(
        &self,
        seed: &PartSeed,
        details: &PartFrontmatterUpdate,
    ) -> Result<EnsureOutcome> {
        let path = part_profile_path(&seed.user_id, &seed.part_id)?;
        let now = Utc::now();
        let mut frontmatter = PartFrontmatter {
            category: seed.category.clone(),
            status: seed.status.clone(),
            created_at: Some(now),
            updated_at: Some(now),
            ..PartFrontmatter::new(seed.part_id.trim(), &seed.name)
        };
        frontmatter.apply(details);
        let text = build_part_markdown_with_frontmatter(&frontmatter, &build_part_profile(seed, now))
            .map_err(|err| SnapshotError::from_markdown(&path, err))?;
        self.store.ensure_with(path, move || text).await
    }

    /// Part summaries sorted by path. Documents that are not part profiles are skipped.
    pub async fn list_parts(
        &self,
        user_id: &str,
        filter: &ListPartsFilter,
    ) -> Result<Vec<PartSummary>> {
        let prefix = format!("{}/{PARTS_DIR}", user_root(user_id)?);
        let mut paths = self.store.storage().list(&prefix).await?;
        paths.sort();

        let limit = filter.limit.unwrap_or(usize::MAX);
        let mut parts = Vec::new();
        for path in paths {
            if parts.len() >= limit {
                break;
            }
            let Some(DocumentRef {
                kind: DocumentKind::PartProfile,
                entity_id: Some(part_id),
                ..
            }) = DocumentRef::from_path(&path)
            else {
                continue;
            };
            let Some(doc) = self.store.read_document(&path).await? else {
                continue;
            };
            let Some(part) = part_from_document(&part_id, doc) else {
                log::debug!("Skipping {path}: no frontmatter or identity section");
                continue;
            };
            if filter.admits(&part.summary) {
                parts.push(part.summary);
            }
        }
        Ok(parts)
    }

    pub async fn read_part(&self, user_id: &str, part_id: &str) -> Result<Option<Part>> {
        let path = part_profile_path(user_id, part_id)?;
        let doc = self.store.read_document(&path).await?;
        Ok(doc.and_then(|doc| part_from_document(part_id.trim(), doc)))
    }

    /// Merges `update` into the frontmatter and stamps `updated_at`. Sections are kept as
    /// they are. Profiles without a frontmatter block are refused.
    pub async fn update_part_frontmatter(
        &self,
        user_id: &str,
        part_id: &str,
        update: &PartFrontmatterUpdate,
    ) -> Result<FrontmatterOutcome> {
        let path = part_profile_path(user_id, part_id)?;
        let Some(text) = self.store.storage().get_text(&path).await? else {
            return Err(SnapshotError::DocumentNotFound { path });
        };

        let stamped = PartFrontmatterUpdate {
            updated_at: Some(Utc::now()),
            ..update.clone()
        };
        let patched = update_part_frontmatter(&text, &stamped)
            .map_err(|err| SnapshotError::from_markdown(&path, err))?;
        self.store.storage().put_text(&path, &patched.text).await?;

        let outcome = FrontmatterOutcome {
            before_hash: ContentHash::of(&text),
            after_hash: ContentHash::of(&patched.text),
            frontmatter: patched.frontmatter,
            path,
        };
        log_markdown_mutation(&MutationRecord {
            path: &outcome.path,
            anchor: FRONTMATTER_TARGET,
            op: FRONTMATTER_OP,
            before_hash: &outcome.before_hash,
            after_hash: &outcome.after_hash,
            warnings: &[],
        });
        Ok(outcome)
    }

    /// Section edit on the part profile; a missing profile is scaffolded first.
    pub async fn update_part_section(
        &self,
        user_id: &str,
        part_id: &str,
        anchor: &str,
        change: &SectionChange,
    ) -> Result<EditOutcome> {
        let path = part_profile_path(user_id, part_id)?;
        self.store.edit_section(&path, anchor, change).await
    }

    pub async fn part_exists(&self, user_id: &str, part_id: &str) -> Result<bool> {
        let path = part_profile_path(user_id, part_id)?;
        Ok(self.store.storage().exists(&path).await?)
    }
}
