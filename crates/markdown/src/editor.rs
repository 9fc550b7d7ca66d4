use serde::{Deserialize, Serialize};

use crate::anchor::validate_anchor;
use crate::canonical::{canonicalize_text, ContentHash};
use crate::lint::lint_markdown;
use crate::sections::parse_document;
use crate::{MarkdownError, Result};

/// A single-section change. Append and replace are mutually exclusive by construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionChange {
    Append(String),
    Replace(String),
}

impl SectionChange {
    #[must_use]
    pub const fn op_name(&self) -> &'static str {
        match self {
            Self::Append(_) => "append_section",
            Self::Replace(_) => "replace_section",
        }
    }

    fn normalized_text(&self) -> String {
        let raw = match self {
            Self::Append(text) | Self::Replace(text) => text,
        };
        canonicalize_text(raw).trim_matches('\n').to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchedDocument {
    pub text: String,
    pub before_hash: ContentHash,
    pub after_hash: ContentHash,
    pub warnings: Vec<String>,
    pub changed: bool,
}

/// `body` without its leading blank lines and trailing whitespace. Indentation of the first
/// content line is kept.
fn strip_blank_lines(body: &str) -> &str {
    let body = body.trim_end();
    let mut start = 0;
    for line in body.split_inclusive('\n') {
        if !line.trim().is_empty() {
            break;
        }
        start += line.len();
    }
    &body[start..]
}

/// Applies `change` to the first fragment carrying `anchor`.
///
/// The preamble and every other fragment are copied byte for byte. The edited body is laid
/// out as: one blank line after the heading, the content, and one blank line before the next
/// marker (none after the last fragment).
pub fn patch_section(text: &str, anchor: &str, change: &SectionChange) -> Result<PatchedDocument> {
    validate_anchor(anchor)?;
    let mut parsed = parse_document(text);
    let index = parsed
        .position(anchor)
        .ok_or_else(|| MarkdownError::SectionNotFound {
            anchor: anchor.to_string(),
        })?;
    let before_hash = ContentHash::of(text);
    let addition = change.normalized_text();

    if addition.is_empty() && matches!(change, SectionChange::Append(_)) {
        return Ok(PatchedDocument {
            text: text.to_string(),
            after_hash: before_hash.clone(),
            before_hash,
            warnings: lint_markdown(text).warnings,
            changed: false,
        });
    }

    let before_anchors: Vec<String> = parsed.anchors().into_iter().map(str::to_string).collect();
    let duplicates = parsed.occurrences(anchor);
    let is_last = index + 1 == parsed.fragments.len();
    let separator = if is_last { "" } else { "\n" };

    let fragment = &mut parsed.fragments[index];
    if !fragment.head.ends_with('\n') {
        fragment.head.push('\n');
    }
    let content = match change {
        SectionChange::Append(_) => {
            let existing = strip_blank_lines(&fragment.body);
            if existing.is_empty() {
                addition
            } else {
                format!("{existing}\n{addition}")
            }
        }
        SectionChange::Replace(_) => addition,
    };
    fragment.body = if content.is_empty() {
        separator.to_string()
    } else {
        format!("\n{content}\n{separator}")
    };

    let new_text = parsed.render();
    let after_hash = ContentHash::of(&new_text);

    let mut warnings = Vec::new();
    let reparsed = parse_document(&new_text);
    let after_anchors = reparsed.anchors();
    if after_anchors != before_anchors {
        warnings.push(format!(
            "Anchor drift while editing '{anchor}': anchors changed from [{}] to [{}]",
            before_anchors.join(", "),
            after_anchors.join(", ")
        ));
    }
    if duplicates > 1 {
        warnings.push(format!(
            "Anchor '{anchor}' appears {duplicates} times; edited the first occurrence"
        ));
    }
    for warning in lint_markdown(&new_text).warnings {
        if !warnings.contains(&warning) {
            warnings.push(warning);
        }
    }

    Ok(PatchedDocument {
        changed: new_text != text,
        text: new_text,
        before_hash,
        after_hash,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const DOC: &str = "# Doc\n\n[//]: # (anchor: a v1)\n## A\n\n- first\n\n[//]: # (anchor: b v1)\n## B\n\nkeep me\n";

    #[test]
    fn append_adds_line_after_existing_content() {
        let patched = patch_section(DOC, "a v1", &SectionChange::Append("- second".into())).unwrap();
        assert_eq!(
            patched.text,
            "# Doc\n\n[//]: # (anchor: a v1)\n## A\n\n- first\n- second\n\n[//]: # (anchor: b v1)\n## B\n\nkeep me\n"
        );
        assert!(patched.changed);
        assert_eq!(patched.before_hash, ContentHash::of(DOC));
        assert_eq!(patched.after_hash, ContentHash::of(&patched.text));
        assert!(patched.warnings.is_empty(), "{:?}", patched.warnings);
    }

    #[test]
    fn append_keeps_indentation_of_existing_body() {
        let doc = "[//]: # (anchor: a)\n## A\n\n    indented code\n  - nested\n";
        let patched = patch_section(doc, "a", &SectionChange::Append("more".into())).unwrap();
        assert_eq!(
            patched.text,
            "[//]: # (anchor: a)\n## A\n\n    indented code\n  - nested\nmore\n"
        );
    }

    #[test]
    fn append_to_blank_section_drops_only_blank_lines() {
        let doc = "[//]: # (anchor: a)\n## A\n\n  \n\n";
        let patched = patch_section(doc, "a", &SectionChange::Append("- one".into())).unwrap();
        assert_eq!(patched.text, "[//]: # (anchor: a)\n## A\n\n- one\n");
    }

    #[test]
    fn replace_last_section() {
        let patched =
            patch_section(DOC, "b v1", &SectionChange::Replace("new  \r\nbody\n\n".into())).unwrap();
        assert!(patched.text.ends_with("## B\n\nnew\nbody\n"));
        assert!(patched.text.starts_with("# Doc\n\n[//]: # (anchor: a v1)\n## A\n\n- first\n\n"));
    }

    #[test]
    fn replace_then_revert_restores_hash() {
        let original = patch_section(DOC, "a v1", &SectionChange::Replace("- first".into())).unwrap();
        assert_eq!(original.text, DOC);
        assert!(!original.changed);

        let edited = patch_section(DOC, "a v1", &SectionChange::Replace("- other".into())).unwrap();
        let reverted =
            patch_section(&edited.text, "a v1", &SectionChange::Replace("- first".into())).unwrap();
        assert_eq!(reverted.after_hash, ContentHash::of(DOC));
    }

    #[test]
    fn empty_append_is_a_no_op() {
        let patched = patch_section(DOC, "a v1", &SectionChange::Append("  \n".into())).unwrap();
        assert_eq!(patched.text, DOC);
        assert!(!patched.changed);
        assert_eq!(patched.before_hash, patched.after_hash);
    }

    #[test]
    fn unknown_anchor_is_an_error() {
        let err = patch_section(DOC, "missing v1", &SectionChange::Append("x".into())).unwrap_err();
        assert_eq!(
            err,
            MarkdownError::SectionNotFound {
                anchor: "missing v1".into()
            }
        );
    }

    #[test]
    fn unrenderable_anchor_is_rejected() {
        let err = patch_section(DOC, "a v1)", &SectionChange::Append("x".into())).unwrap_err();
        assert_eq!(err, MarkdownError::InvalidAnchor("a v1)".into()));
    }

    #[test]
    fn injected_marker_is_reported_as_drift() {
        let patched = patch_section(
            DOC,
            "a v1",
            &SectionChange::Append("[//]: # (anchor: sneaky)\n## Sneaky".into()),
        )
        .unwrap();
        assert!(patched.warnings.iter().any(|w| w.starts_with("Anchor drift")));
    }

    #[test]
    fn heading_without_trailing_newline_gets_one() {
        let patched = patch_section(
            "[//]: # (anchor: x)\n## X",
            "x",
            &SectionChange::Append("body".into()),
        )
        .unwrap();
        assert_eq!(patched.text, "[//]: # (anchor: x)\n## X\n\nbody\n");
    }

    #[test]
    fn change_serializes_snake_case() {
        let json = serde_json::to_string(&SectionChange::Append("x".into())).unwrap();
        assert_eq!(json, r#"{"append":"x"}"#);
    }
}
