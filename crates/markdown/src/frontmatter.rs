//! YAML frontmatter carried by part profiles.
//!
//! The block sits before the `# Part:` title, fenced by `---` lines:
//!
//! ```text
//! ---
//! id: p1
//! name: Critic
//! status: active
//! ---
//!
//! # Part: Critic
//! ```
//!
//! The section parser sees it as preamble, so section edits leave it untouched. Profiles
//! without a block stay valid; a block that does not parse is ignored with a warning.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_yaml::Value as YamlValue;

use crate::{MarkdownError, Result};

const FENCE: &str = "---";

pub const DEFAULT_PART_CATEGORY: &str = "unknown";
pub const DEFAULT_PART_STATUS: &str = "emerging";
pub const MAX_PART_NAME_CHARS: usize = 100;
pub const MAX_EMOJI_CHARS: usize = 8;

fn default_category() -> String {
    DEFAULT_PART_CATEGORY.to_string()
}

fn default_status() -> String {
    DEFAULT_PART_STATUS.to_string()
}

/// Structured metadata at the top of a part profile. Unknown keys make the block invalid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartFrontmatter {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub related_parts: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_active: Option<DateTime<Utc>>,
}

impl PartFrontmatter {
    #[must_use]
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            emoji: None,
            category: default_category(),
            status: default_status(),
            tags: Vec::new(),
            related_parts: Vec::new(),
            created_at: None,
            updated_at: None,
            last_active: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(MarkdownError::InvalidFrontmatter(msg));
        if self.id.trim().is_empty() {
            return invalid("id must not be empty".into());
        }
        let name_chars = self.name.trim().chars().count();
        if name_chars == 0 || name_chars > MAX_PART_NAME_CHARS {
            return invalid(format!("name must be 1..={MAX_PART_NAME_CHARS} characters"));
        }
        if let Some(emoji) = &self.emoji {
            let chars = emoji.chars().count();
            if chars == 0 || chars > MAX_EMOJI_CHARS {
                return invalid(format!("emoji must be 1..={MAX_EMOJI_CHARS} characters"));
            }
        }
        if self.tags.iter().any(|tag| tag.trim().is_empty()) {
            return invalid("tags must not be blank".into());
        }
        if self.related_parts.iter().any(|id| id.trim().is_empty()) {
            return invalid("related_parts must not contain blank ids".into());
        }
        Ok(())
    }

    pub fn apply(&mut self, update: &PartFrontmatterUpdate) {
        if let Some(name) = &update.name {
            self.name.clone_from(name);
        }
        if let Some(emoji) = &update.emoji {
            self.emoji = Some(emoji.clone()).filter(|e| !e.is_empty());
        }
        if let Some(category) = &update.category {
            self.category.clone_from(category);
        }
        if let Some(status) = &update.status {
            self.status.clone_from(status);
        }
        if let Some(tags) = &update.tags {
            self.tags.clone_from(tags);
        }
        if let Some(related) = &update.related_parts {
            self.related_parts.clone_from(related);
        }
        if update.last_active.is_some() {
            self.last_active = update.last_active;
        }
        if update.updated_at.is_some() {
            self.updated_at = update.updated_at;
        }
    }
}

/// Fields to change; `None` leaves a field alone and an empty `emoji` clears it. `id` and
/// `created_at` are fixed once written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PartFrontmatterUpdate {
    pub name: Option<String>,
    pub emoji: Option<String>,
    pub category: Option<String>,
    pub status: Option<String>,
    pub tags: Option<Vec<String>>,
    pub related_parts: Option<Vec<String>>,
    pub last_active: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartMarkdown {
    pub frontmatter: Option<PartFrontmatter>,
    /// Text after the closing fence, or the whole input when there is no block at all.
    pub content: String,
    pub warnings: Vec<String>,
}

impl PartMarkdown {
    fn plain(text: &str) -> Self {
        Self {
            frontmatter: None,
            content: text.to_string(),
            warnings: Vec::new(),
        }
    }
}

/// Splits a leading `---` fenced block off `text`, returning `(yaml, rest)`.
///
/// `None` when the text does not open with a fence or the fence is never closed.
#[must_use]
pub fn split_frontmatter(text: &str) -> Option<(&str, &str)> {
    let mut lines = text.split_inclusive('\n');
    let first = lines.next()?;
    if first.trim_end() != FENCE {
        return None;
    }
    let mut offset = first.len();
    for line in lines {
        if line.trim_end() == FENCE {
            return Some((&text[first.len()..offset], &text[offset + line.len()..]));
        }
        offset += line.len();
    }
    None
}

/// Reads the frontmatter of a part profile. Never fails.
#[must_use]
pub fn parse_part_markdown(text: &str) -> PartMarkdown {
    let Some((yaml, content)) = split_frontmatter(text) else {
        return PartMarkdown::plain(text);
    };

    let value: YamlValue = match serde_yaml::from_str(yaml) {
        Ok(value) => value,
        Err(err) => {
            let mut out = PartMarkdown::plain(text);
            out.warnings.push(format!("Unparseable frontmatter ignored: {err}"));
            return out;
        }
    };
    let empty = match &value {
        YamlValue::Null => true,
        YamlValue::Mapping(map) => map.is_empty(),
        _ => false,
    };
    if empty {
        return PartMarkdown::plain(text);
    }

    let parsed = serde_yaml::from_value::<PartFrontmatter>(value)
        .map_err(|err| MarkdownError::InvalidFrontmatter(err.to_string()))
        .and_then(|fm| fm.validate().map(|()| fm));
    match parsed {
        Ok(frontmatter) => PartMarkdown {
            frontmatter: Some(frontmatter),
            content: content.to_string(),
            warnings: Vec::new(),
        },
        Err(err) => PartMarkdown {
            frontmatter: None,
            content: content.to_string(),
            warnings: vec![format!("{err}; block ignored")],
        },
    }
}

/// The YAML between the fences, without a trailing newline.
pub fn stringify_part_frontmatter(frontmatter: &PartFrontmatter) -> Result<String> {
    let yaml = serde_yaml::to_string(frontmatter)
        .map_err(|err| MarkdownError::InvalidFrontmatter(err.to_string()))?;
    Ok(yaml.trim_end().to_string())
}

pub fn build_part_markdown_with_frontmatter(
    frontmatter: &PartFrontmatter,
    content: &str,
) -> Result<String> {
    frontmatter.validate()?;
    let yaml = stringify_part_frontmatter(frontmatter)?;
    Ok(format!("{FENCE}\n{yaml}\n{FENCE}\n\n{}\n", content.trim()))
}

/// Result of [`update_part_frontmatter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchedFrontmatter {
    pub frontmatter: PartFrontmatter,
    pub text: String,
}

/// Rewrites the frontmatter block of `text`, keeping the content after it.
///
/// Text without a usable block is refused rather than given a partial one.
pub fn update_part_frontmatter(
    text: &str,
    update: &PartFrontmatterUpdate,
) -> Result<PatchedFrontmatter> {
    let parsed = parse_part_markdown(text);
    let Some(mut frontmatter) = parsed.frontmatter else {
        return Err(match parsed.warnings.first() {
            Some(warning) => MarkdownError::InvalidFrontmatter(warning.clone()),
            None => MarkdownError::MissingFrontmatter,
        });
    };
    frontmatter.apply(update);
    let text = build_part_markdown_with_frontmatter(&frontmatter, &parsed.content)?;
    Ok(PatchedFrontmatter { frontmatter, text })
}
