//! # Memory Snapshots
//!
//! Per-user markdown memory documents stored through [`memory_storage::StorageAdapter`]:
//!
//! | Document | Path |
//! |---|---|
//! | User overview | `users/<userId>/overview.md` |
//! | Part profile | `users/<userId>/parts/<partId>.md` |
//! | Relationship profile | `users/<userId>/relationships/<relId>.md` |
//!
//! [`SnapshotStore`] scaffolds documents from the grammar, reads them into fragments and edits
//! one section at a time, reporting before/after content hashes. [`PartsRepository`] reads part
//! profiles as records, including their optional YAML frontmatter.

mod error;
pub mod observability;
mod overview;
mod parts;
pub mod paths;
mod store;

pub use error::{Result, SnapshotError};
pub use overview::{
    format_overview_fragments, load_overview_snapshot, OverviewFragment, OverviewSnapshot,
    OVERVIEW_ANCHORS,
};
pub use parts::{FrontmatterOutcome, ListPartsFilter, Part, PartSummary, PartsRepository};
pub use paths::{
    part_profile_path, relationship_profile_path, user_overview_path, user_root, DocumentKind,
    DocumentRef,
};
pub use store::{EditLint, EditOutcome, EnsureOutcome, SnapshotDocument, SnapshotStore};
