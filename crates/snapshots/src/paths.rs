use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Result, SnapshotError};

const USERS_DIR: &str = "users";
const PARTS_DIR: &str = "parts";
const RELATIONSHIPS_DIR: &str = "relationships";
const OVERVIEW_FILE: &str = "overview.md";
const MD_EXT: &str = ".md";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    UserOverview,
    PartProfile,
    RelationshipProfile,
}

impl DocumentKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UserOverview => "overview",
            Self::PartProfile => "part_profile",
            Self::RelationshipProfile => "relationship_profile",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trims `raw` and checks it can be used as one path segment.
pub fn validate_id(field: &'static str, raw: &str) -> Result<String> {
    let id = raw.trim();
    let invalid = id.is_empty()
        || id == "."
        || id == ".."
        || id.contains('/')
        || id.contains('\\')
        || id.chars().any(char::is_control);
    if invalid {
        return Err(SnapshotError::InvalidId {
            field,
            value: raw.to_string(),
        });
    }
    Ok(id.to_string())
}

/// `users/<userId>`, the root every per-user operation is scoped to.
pub fn user_root(user_id: &str) -> Result<String> {
    let user_id = validate_id("user id", user_id)?;
    Ok(format!("{USERS_DIR}/{user_id}"))
}

pub fn user_overview_path(user_id: &str) -> Result<String> {
    Ok(format!("{}/{OVERVIEW_FILE}", user_root(user_id)?))
}

pub fn part_profile_path(user_id: &str, part_id: &str) -> Result<String> {
    let part_id = validate_id("part id", part_id)?;
    Ok(format!("{}/{PARTS_DIR}/{part_id}{MD_EXT}", user_root(user_id)?))
}

pub fn relationship_profile_path(user_id: &str, relationship_id: &str) -> Result<String> {
    let relationship_id = validate_id("relationship id", relationship_id)?;
    Ok(format!(
        "{}/{RELATIONSHIPS_DIR}/{relationship_id}{MD_EXT}",
        user_root(user_id)?
    ))
}

/// Identity of a canonical snapshot document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentRef {
    pub user_id: String,
    pub kind: DocumentKind,
    /// Part or relationship id; `None` for the overview.
    pub entity_id: Option<String>,
}

impl DocumentRef {
    #[must_use]
    pub fn overview(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            kind: DocumentKind::UserOverview,
            entity_id: None,
        }
    }

    /// Recognizes canonical layout paths; anything else is `None`.
    #[must_use]
    pub fn from_path(path: &str) -> Option<Self> {
        let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
        let parsed = match segments.as_slice() {
            [USERS_DIR, user, OVERVIEW_FILE] => Self::overview(*user),
            [USERS_DIR, user, PARTS_DIR, file] => Self {
                user_id: (*user).to_string(),
                kind: DocumentKind::PartProfile,
                entity_id: Some(file.strip_suffix(MD_EXT)?.to_string()),
            },
            [USERS_DIR, user, RELATIONSHIPS_DIR, file] => Self {
                user_id: (*user).to_string(),
                kind: DocumentKind::RelationshipProfile,
                entity_id: Some(file.strip_suffix(MD_EXT)?.to_string()),
            },
            _ => return None,
        };
        // Round-trip through the builders so ids that would not validate are rejected.
        match parsed.path() {
            Ok(canonical) if canonical == path.trim_start_matches('/') => Some(parsed),
            _ => None,
        }
    }

    pub fn path(&self) -> Result<String> {
        let entity = self.entity_id.as_deref().unwrap_or_default();
        match self.kind {
            DocumentKind::UserOverview => user_overview_path(&self.user_id),
            DocumentKind::PartProfile => part_profile_path(&self.user_id, entity),
            DocumentKind::RelationshipProfile => relationship_profile_path(&self.user_id, entity),
        }
    }
}
