use regex::Regex;
use std::sync::OnceLock;

use crate::{MarkdownError, Result};

fn marker_patterns() -> &'static [Regex; 2] {
    static PATTERNS: OnceLock<[Regex; 2]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            Regex::new(r"^\[//\]:\s*#\s*\(anchor:\s*(.+?)\s*\)\s*$").expect("valid marker regex"),
            // Legacy HTML-comment form; still read, never written.
            Regex::new(r"^<!--\s*@anchor:\s*(.+?)\s*-->\s*$").expect("valid marker regex"),
        ]
    })
}

/// Extracts the anchor name from a hidden marker line, if the line is one.
#[must_use]
pub fn parse_anchor_marker(line: &str) -> Option<&str> {
    let line = line.trim_end_matches(&['\r', '\n'][..]);
    marker_patterns().iter().find_map(|rx| {
        rx.captures(line)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    })
}

#[must_use]
pub fn is_anchor_marker(line: &str) -> bool {
    parse_anchor_marker(line).is_some()
}

/// Renders the canonical marker line (without newline).
#[must_use]
pub fn render_anchor_marker(anchor: &str) -> String {
    format!("[//]: # (anchor: {anchor})")
}

/// Anchors must survive a render/parse round trip unchanged.
pub fn validate_anchor(anchor: &str) -> Result<()> {
    let valid = !anchor.is_empty()
        && anchor.trim() == anchor
        && !anchor.contains(')')
        && !anchor.chars().any(char::is_control);
    if valid {
        Ok(())
    } else {
        Err(MarkdownError::InvalidAnchor(anchor.to_string()))
    }
}
