use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use memory_snapshots::user_root;
use memory_storage::{normalize_storage_path, StorageAdapter};
use serde::Serialize;
use std::sync::Arc;
use tokio::time::{timeout_at, Instant};

use crate::guards::{build_guarded_search_config, normalize_page_size, SearchParams};
use crate::telemetry::{record_best_effort, SearchEvent, SearchTelemetry};
use crate::{Result, SearchValidationError};

const MD_EXT: &str = ".md";

/// Which documents of a user an operation looks at.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    pub user_id: String,
    /// Directory below the user root, e.g. `parts`.
    pub prefix: Option<String>,
    /// Globs matched against user-relative paths; any match admits a file.
    pub globs: Vec<String>,
}

impl Scope {
    #[must_use]
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarkdownListItem {
    pub path: String,
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchMatch {
    /// Relative to the user root.
    pub path: String,
    /// 1-based.
    pub line: usize,
    pub snippet: String,
    pub before: Vec<String>,
    pub after: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchOutcome {
    pub matches: Vec<SearchMatch>,
    /// Results stopped early, either at the match limit or the time budget.
    pub truncated: bool,
    pub timed_out: bool,
    pub runtime_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarkdownChunk {
    pub path: String,
    pub offset: usize,
    pub next_offset: Option<usize>,
    pub data: String,
    pub has_more: bool,
}

struct ResolvedScope {
    /// `users/<id>`
    root: String,
    /// Root-relative listing prefix.
    list_prefix: String,
    prefix: Option<String>,
    globs: Option<GlobSet>,
}

impl ResolvedScope {
    /// User-relative path of a listed document, if it is an in-scope markdown file.
    fn admit(&self, listed: &str) -> Option<String> {
        let relative = listed.strip_prefix(&self.root)?.strip_prefix('/')?;
        if !relative.ends_with(MD_EXT) {
            return None;
        }
        if let Some(globs) = &self.globs {
            if !globs.is_match(relative) {
                return None;
            }
        }
        Some(relative.to_string())
    }
}

fn sanitize_relative(field: &'static str, raw: &str) -> std::result::Result<String, SearchValidationError> {
    let trimmed = raw.trim().trim_start_matches('/');
    normalize_storage_path(trimmed)
        .map_err(|err| SearchValidationError::new(field, err.to_string()))
}

fn compile_globs(globs: &[String]) -> std::result::Result<Option<GlobSet>, SearchValidationError> {
    let globs: Vec<&str> = globs
        .iter()
        .map(|g| g.trim())
        .filter(|g| !g.is_empty())
        .collect();
    if globs.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for glob in globs {
        let compiled = GlobBuilder::new(glob)
            .literal_separator(true)
            .build()
            .map_err(|err| SearchValidationError::new("glob", err.to_string()))?;
        builder.add(compiled);
    }
    builder
        .build()
        .map(Some)
        .map_err(|err| SearchValidationError::new("glob", err.to_string()))
}

fn resolve_scope(scope: &Scope) -> std::result::Result<ResolvedScope, SearchValidationError> {
    let root = user_root(&scope.user_id)
        .map_err(|err| SearchValidationError::new("user_id", err.to_string()))?;
    let prefix = match scope.prefix.as_deref() {
        Some(raw) => Some(sanitize_relative("prefix", raw)?).filter(|p| !p.is_empty()),
        None => None,
    };
    let list_prefix = match &prefix {
        Some(prefix) => format!("{root}/{prefix}"),
        None => root.clone(),
    };
    Ok(ResolvedScope {
        root,
        list_prefix,
        prefix,
        globs: compile_globs(&scope.globs)?,
    })
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Read-only, user-scoped access to snapshot markdown.
#[derive(Clone)]
pub struct MarkdownSearch {
    storage: Arc<dyn StorageAdapter>,
    telemetry: Option<Arc<dyn SearchTelemetry>>,
}

fn clip_line(line: &str, max_chars: usize) -> String {
    line.chars().take(max_chars).collect()
}

impl MarkdownSearch {
    #[must_use]
    pub fn new(storage: Arc<dyn StorageAdapter>) -> Self {
        Self {
            storage,
            telemetry: None,
        }
    }

    #[must_use]
    pub fn with_telemetry(mut self, telemetry: Arc<dyn SearchTelemetry>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Markdown files in scope, sorted by path, with their sizes in bytes.
    pub async fn list_markdown_files(
        &self,
        scope: &Scope,
        limit: Option<usize>,
    ) -> Result<Vec<MarkdownListItem>> {
        let resolved = resolve_scope(scope)?;
        let mut listed = self.storage.list(&resolved.list_prefix).await?;
        listed.sort();

        let limit = limit.unwrap_or(usize::MAX);
        let mut items = Vec::new();
        for path in &listed {
            if items.len() >= limit {
                break;
            }
            let Some(relative) = resolved.admit(path) else {
                continue;
            };
            let size = self
                .storage
                .get_text(path)
                .await?
                .map_or(0, |text| text.len());
            items.push(MarkdownListItem {
                path: relative,
                size,
            });
        }
        Ok(items)
    }

    /// Line-by-line search. Validation errors surface before any storage call; hitting the
    /// match limit or the time budget returns what was found so far with `truncated` set.
    pub async fn search_markdown(&self, scope: &Scope, params: &SearchParams) -> Result<SearchOutcome> {
        let config = build_guarded_search_config(params)?;
        let resolved = resolve_scope(scope)?;

        let started = Instant::now();
        let deadline = started + config.timeout();
        let mut matches: Vec<SearchMatch> = Vec::new();
        let mut truncated = false;
        let mut timed_out = false;

        let mut listed = match timeout_at(deadline, self.storage.list(&resolved.list_prefix)).await {
            Ok(listed) => listed?,
            Err(_) => {
                timed_out = true;
                Vec::new()
            }
        };
        listed.sort();

        'files: for path in &listed {
            if timed_out {
                break;
            }
            let Some(relative) = resolved.admit(path) else {
                continue;
            };
            let content = match timeout_at(deadline, self.storage.get_text(path)).await {
                Ok(content) => content?,
                Err(_) => {
                    timed_out = true;
                    break;
                }
            };
            let Some(content) = content else {
                continue;
            };

            let lines: Vec<&str> = content.lines().collect();
            for (index, line) in lines.iter().enumerate() {
                if Instant::now() >= deadline {
                    timed_out = true;
                    break 'files;
                }
                if !config.matcher.is_match(line) {
                    continue;
                }
                let start = index.saturating_sub(config.context.before);
                let end = (index + 1 + config.context.after).min(lines.len());
                let clip = |l: &str| clip_line(l, config.page_size);
                matches.push(SearchMatch {
                    path: relative.clone(),
                    line: index + 1,
                    snippet: clip(line),
                    before: lines[start..index].iter().map(|l| clip(l)).collect(),
                    after: lines[index + 1..end].iter().map(|l| clip(l)).collect(),
                });
                if matches.len() >= config.match_limit {
                    truncated = true;
                    break 'files;
                }
            }
        }
        let truncated = truncated || timed_out;
        let runtime_ms = elapsed_ms(started);

        if timed_out {
            log::debug!(
                "Markdown search for {} timed out after {runtime_ms}ms with {} matches",
                scope.user_id,
                matches.len()
            );
        }

        let event = SearchEvent {
            tool: "md.search",
            user_id: scope.user_id.trim().to_string(),
            duration_ms: runtime_ms,
            match_count: matches.len(),
            timed_out,
            prefix: resolved.prefix.clone(),
            regex: config.regex,
        };
        record_best_effort(self.telemetry.as_deref(), &event).await;

        Ok(SearchOutcome {
            matches,
            truncated,
            timed_out,
            runtime_ms,
        })
    }

    /// Reads a page of a document. Offsets count characters; the page size is clamped like
    /// `pageSize`. A missing document reads as an empty final page.
    pub async fn read_markdown(
        &self,
        user_id: &str,
        path: &str,
        offset: usize,
        limit: Option<i64>,
    ) -> Result<MarkdownChunk> {
        let root = user_root(user_id)
            .map_err(|err| SearchValidationError::new("user_id", err.to_string()))?;
        let relative = sanitize_relative("path", path)?;
        if relative.is_empty() {
            return Err(SearchValidationError::new("path", "path cannot be empty").into());
        }
        let limit = normalize_page_size(limit);

        let Some(content) = self.storage.get_text(&format!("{root}/{relative}")).await? else {
            return Ok(MarkdownChunk {
                path: relative,
                offset,
                next_offset: None,
                data: String::new(),
                has_more: false,
            });
        };

        let data: String = content.chars().skip(offset).take(limit).collect();
        let consumed = offset + data.chars().count();
        let next_offset = (consumed < content.chars().count()).then_some(consumed);
        Ok(MarkdownChunk {
            path: relative,
            offset,
            has_more: next_offset.is_some(),
            next_offset,
            data,
        })
    }
}
