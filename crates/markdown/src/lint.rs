use serde::Serialize;

use crate::sections::parse_document;

/// Bullets allowed in an evidence section before lint complains.
pub const EVIDENCE_SOFT_CAP: usize = 7;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LintReport {
    pub warnings: Vec<String>,
    /// Reserved for hard failures; no current rule blocks a write.
    pub blocked: bool,
}

fn is_bullet(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("- ") || trimmed.starts_with("* ")
}

/// Structural checks over a whole document. Advisory only.
#[must_use]
pub fn lint_markdown(text: &str) -> LintReport {
    let parsed = parse_document(text);
    let mut warnings = parsed.warnings;

    for fragment in &parsed.fragments {
        if !fragment.anchor.contains("evidence") {
            continue;
        }
        let bullets = fragment.body.lines().filter(|l| is_bullet(l)).count();
        if bullets > EVIDENCE_SOFT_CAP {
            warnings.push(format!(
                "Section '{}' has {bullets} evidence items (soft cap {EVIDENCE_SOFT_CAP})",
                fragment.anchor
            ));
        }
    }

    LintReport {
        warnings,
        blocked: false,
    }
}
