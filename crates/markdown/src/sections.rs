use serde::Serialize;
use std::collections::HashMap;

use crate::anchor::parse_anchor_marker;

/// One anchored section of a document.
///
/// `head` holds the raw marker line, any blank lines after it and the heading line, exactly as
/// they appear in the source; `body` is everything after the heading up to the next marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fragment {
    pub anchor: String,
    pub heading: String,
    pub body: String,
    #[serde(skip)]
    pub(crate) head: String,
    #[serde(skip)]
    pub(crate) has_heading: bool,
}

impl Fragment {
    /// Body with surrounding blank lines removed.
    #[must_use]
    pub fn text(&self) -> &str {
        self.body.trim()
    }

    #[must_use]
    pub const fn has_heading(&self) -> bool {
        self.has_heading
    }

    /// The fragment exactly as it appears in the document.
    #[must_use]
    pub fn raw(&self) -> String {
        let mut out = String::with_capacity(self.head.len() + self.body.len());
        out.push_str(&self.head);
        out.push_str(&self.body);
        out
    }
}

/// A parsed document: unanchored preamble (usually the `#` title) plus fragments in order.
///
/// Rendering a parsed document reproduces its input byte for byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDocument {
    pub preamble: String,
    pub fragments: Vec<Fragment>,
    pub warnings: Vec<String>,
}

impl ParsedDocument {
    /// First fragment carrying `anchor`.
    #[must_use]
    pub fn fragment(&self, anchor: &str) -> Option<&Fragment> {
        self.fragments.iter().find(|f| f.anchor == anchor)
    }

    #[must_use]
    pub fn position(&self, anchor: &str) -> Option<usize> {
        self.fragments.iter().position(|f| f.anchor == anchor)
    }

    #[must_use]
    pub fn anchors(&self) -> Vec<&str> {
        self.fragments.iter().map(|f| f.anchor.as_str()).collect()
    }

    #[must_use]
    pub fn occurrences(&self, anchor: &str) -> usize {
        self.fragments.iter().filter(|f| f.anchor == anchor).count()
    }

    #[must_use]
    pub fn render(&self) -> String {
        let mut out = self.preamble.clone();
        for fragment in &self.fragments {
            out.push_str(&fragment.head);
            out.push_str(&fragment.body);
        }
        out
    }
}

struct OpenFragment {
    anchor: String,
    marker_line: usize,
    head: String,
    heading: Option<String>,
    body: String,
}

impl OpenFragment {
    fn close(self, warnings: &mut Vec<String>) -> Fragment {
        if self.heading.is_none() {
            warnings.push(format!(
                "Anchor '{}' at line {} has no heading",
                self.anchor, self.marker_line
            ));
        }
        Fragment {
            has_heading: self.heading.is_some(),
            heading: self.heading.unwrap_or_default(),
            anchor: self.anchor,
            body: self.body,
            head: self.head,
        }
    }
}

fn heading_text(line: &str) -> String {
    line.trim().trim_start_matches('#').trim().to_string()
}

/// Splits `text` into fragments at anchor markers.
///
/// Never fails: structural problems (marker without heading, duplicate anchors, `##` headings
/// that no marker introduces) are reported in [`ParsedDocument::warnings`].
#[must_use]
pub fn parse_document(text: &str) -> ParsedDocument {
    let mut preamble = String::new();
    let mut fragments: Vec<Fragment> = Vec::new();
    let mut warnings: Vec<String> = Vec::new();
    let mut open: Option<OpenFragment> = None;

    for (idx, raw_line) in text.split_inclusive('\n').enumerate() {
        let line_no = idx + 1;
        let line = raw_line.trim_end_matches(&['\r', '\n'][..]);

        if let Some(anchor) = parse_anchor_marker(line) {
            if let Some(prev) = open.take() {
                fragments.push(prev.close(&mut warnings));
            }
            open = Some(OpenFragment {
                anchor: anchor.to_string(),
                marker_line: line_no,
                head: raw_line.to_string(),
                heading: None,
                body: String::new(),
            });
            continue;
        }

        let Some(current) = open.as_mut() else {
            if line.starts_with("## ") {
                warnings.push(format!(
                    "Heading without anchor marker at line {line_no}: {}",
                    line.trim()
                ));
            }
            preamble.push_str(raw_line);
            continue;
        };

        if current.heading.is_none() {
            current.head.push_str(raw_line);
            if line.trim().is_empty() {
                continue;
            }
            if !line.trim_start().starts_with('#') {
                warnings.push(format!(
                    "Anchor '{}' is followed by non-heading text at line {line_no}",
                    current.anchor
                ));
            }
            current.heading = Some(heading_text(line));
            continue;
        }

        if line.starts_with("## ") {
            warnings.push(format!(
                "Heading without anchor marker at line {line_no}: {}",
                line.trim()
            ));
        }
        current.body.push_str(raw_line);
    }

    if let Some(last) = open.take() {
        fragments.push(last.close(&mut warnings));
    }

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for fragment in &fragments {
        *counts.entry(fragment.anchor.as_str()).or_default() += 1;
    }
    let mut reported: Vec<&str> = Vec::new();
    for fragment in &fragments {
        let anchor = fragment.anchor.as_str();
        let count = counts.get(anchor).copied().unwrap_or(0);
        if count > 1 && !reported.contains(&anchor) {
            reported.push(anchor);
            warnings.push(format!("Duplicate anchor '{anchor}' ({count} occurrences)"));
        }
    }

    ParsedDocument {
        preamble,
        fragments,
        warnings,
    }
}
