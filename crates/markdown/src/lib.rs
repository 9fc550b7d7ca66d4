//! # Memory Markdown
//!
//! The anchored markdown grammar behind memory snapshot documents.
//!
//! A document is a `# Title` preamble followed by sections, each introduced by a hidden
//! marker line and a heading:
//!
//! ```text
//! [//]: # (anchor: current_focus v1)
//! ## Current Focus
//!
//! - TBD
//! ```
//!
//! - [`grammar`] builds fresh documents
//! - [`parse_document`] splits text into [`Fragment`]s without ever failing
//! - [`patch_section`] appends to or replaces one section and reports content hashes
//! - [`lint_markdown`] reports structural warnings
//! - [`parse_part_markdown`] reads the optional YAML frontmatter of part profiles
//!
//! Everything here is pure; persistence lives in `memory-snapshots`.

mod anchor;
mod canonical;
mod editor;
mod error;
mod frontmatter;
pub mod grammar;
mod lint;
mod sections;

pub use anchor::{is_anchor_marker, parse_anchor_marker, render_anchor_marker, validate_anchor};
pub use canonical::{canonicalize_text, content_hash, ContentHash};
pub use editor::{patch_section, PatchedDocument, SectionChange};
pub use error::{MarkdownError, Result};
pub use frontmatter::{
    build_part_markdown_with_frontmatter, parse_part_markdown, split_frontmatter,
    stringify_part_frontmatter, update_part_frontmatter, PartFrontmatter, PartFrontmatterUpdate,
    PartMarkdown, PatchedFrontmatter, DEFAULT_PART_CATEGORY, DEFAULT_PART_STATUS,
};
pub use lint::{lint_markdown, LintReport, EVIDENCE_SOFT_CAP};
pub use sections::{parse_document, Fragment, ParsedDocument};
