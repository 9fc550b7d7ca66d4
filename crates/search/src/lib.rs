//! # Memory Search
//!
//! Guarded full-text search over one user's snapshot documents.
//!
//! Raw parameters go through [`build_guarded_search_config`] first: numeric hints are clamped,
//! bad patterns and flags are rejected with a [`SearchValidationError`] naming the parameter.
//! [`MarkdownSearch`] then scans `users/<userId>/[prefix]` line by line within the match limit
//! and the wall-clock budget, returning partial results when either is hit.

mod error;
pub mod guards;
mod markdown;
mod telemetry;

pub use error::{Result, SearchError, SearchValidationError};
pub use guards::{
    build_guarded_search_config, normalize_context_lines, normalize_match_limit,
    normalize_page_size, normalize_timeout_ms, ContextLines, GuardedSearchConfig, LineMatcher,
    SearchParams,
};
pub use markdown::{
    MarkdownChunk, MarkdownListItem, MarkdownSearch, Scope, SearchMatch, SearchOutcome,
};
pub use telemetry::{
    record_best_effort, LogTelemetry, SearchEvent, SearchTelemetry, TelemetryResult,
    SEARCH_LOG_TARGET,
};
