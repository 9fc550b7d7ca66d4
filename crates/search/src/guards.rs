use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use std::time::Duration;

use crate::SearchValidationError;

pub const DEFAULT_MATCH_LIMIT: usize = 50;
pub const MIN_MATCH_LIMIT: usize = 1;
pub const MAX_MATCH_LIMIT: usize = 50;

pub const DEFAULT_PAGE_SIZE: usize = 8 * 1024;
pub const MIN_PAGE_SIZE: usize = 512;
pub const MAX_PAGE_SIZE: usize = 8 * 1024;

pub const DEFAULT_TIMEOUT_MS: u64 = 500;
pub const MAX_TIMEOUT_MS: u64 = 2_000;

pub const DEFAULT_CONTEXT_BEFORE: usize = 2;
pub const DEFAULT_CONTEXT_AFTER: usize = 5;
pub const MAX_CONTEXT_LINES: usize = 5;

pub const MAX_PATTERN_CHARS: usize = 1024;
/// Upper bound on the compiled regex program, in bytes.
pub const REGEX_SIZE_LIMIT: usize = 1 << 20;

const ALLOWED_FLAGS: &[char] = &['i', 'm', 's', 'u', 'x'];

fn clamp_hint(requested: Option<i64>, default: usize, min: usize, max: usize) -> usize {
    let Some(value) = requested else {
        return default;
    };
    usize::try_from(value).map_or(min, |v| v.clamp(min, max))
}

#[must_use]
pub fn normalize_match_limit(requested: Option<i64>) -> usize {
    clamp_hint(requested, DEFAULT_MATCH_LIMIT, MIN_MATCH_LIMIT, MAX_MATCH_LIMIT)
}

#[must_use]
pub fn normalize_page_size(requested: Option<i64>) -> usize {
    clamp_hint(requested, DEFAULT_PAGE_SIZE, MIN_PAGE_SIZE, MAX_PAGE_SIZE)
}

/// Zero or negative budgets fall back to the default rather than the minimum.
#[must_use]
pub fn normalize_timeout_ms(requested: Option<i64>) -> u64 {
    match requested.and_then(|v| u64::try_from(v).ok()) {
        Some(0) | None => DEFAULT_TIMEOUT_MS,
        Some(value) => value.min(MAX_TIMEOUT_MS),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextLines {
    pub before: usize,
    pub after: usize,
}

#[must_use]
pub fn normalize_context_lines(before: Option<i64>, after: Option<i64>) -> ContextLines {
    let clamp = |value: Option<i64>, fallback: usize| match value {
        Some(v) if v >= 0 => usize::try_from(v).map_or(MAX_CONTEXT_LINES, |v| v.min(MAX_CONTEXT_LINES)),
        _ => fallback,
    };
    ContextLines {
        before: clamp(before, DEFAULT_CONTEXT_BEFORE),
        after: clamp(after, DEFAULT_CONTEXT_AFTER),
    }
}

/// Raw, untrusted search parameters.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SearchParams {
    pub pattern: String,
    pub regex: bool,
    pub flags: Option<String>,
    pub ignore_case: Option<bool>,
    pub max_matches: Option<i64>,
    pub page_size: Option<i64>,
    pub timeout_ms: Option<i64>,
    pub context_before: Option<i64>,
    pub context_after: Option<i64>,
}

/// Compiled line predicate.
#[derive(Debug, Clone)]
pub enum LineMatcher {
    Literal { needle: String, ignore_case: bool },
    Regex(Regex),
}

impl LineMatcher {
    #[must_use]
    pub fn is_match(&self, line: &str) -> bool {
        match self {
            Self::Literal {
                needle,
                ignore_case: true,
            } => line.to_lowercase().contains(needle.as_str()),
            Self::Literal { needle, .. } => line.contains(needle.as_str()),
            Self::Regex(regex) => regex.is_match(line),
        }
    }
}

/// Sanitized, immutable search parameters.
#[derive(Debug, Clone)]
pub struct GuardedSearchConfig {
    pub pattern: String,
    pub regex: bool,
    /// Normalized regex flags, sorted; empty for literal searches.
    pub flags: String,
    pub ignore_case: bool,
    pub match_limit: usize,
    /// Characters kept per reported line.
    pub page_size: usize,
    pub timeout_ms: u64,
    pub context: ContextLines,
    pub matcher: LineMatcher,
}

impl GuardedSearchConfig {
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn normalize_flags(raw: Option<&str>, ignore_case: bool) -> Result<String, SearchValidationError> {
    let mut flags: Vec<char> = Vec::new();
    for ch in raw.unwrap_or_default().chars() {
        if ch == 'g' {
            continue;
        }
        if !ALLOWED_FLAGS.contains(&ch) {
            return Err(SearchValidationError::new(
                "flags",
                format!("unsupported regex flag '{ch}' (allowed: imsux)"),
            ));
        }
        if ch == 'i' && !ignore_case {
            return Err(SearchValidationError::new(
                "flags",
                "flag 'i' conflicts with ignoreCase=false",
            ));
        }
        if !flags.contains(&ch) {
            flags.push(ch);
        }
    }
    if ignore_case && !flags.contains(&'i') {
        flags.push('i');
    }
    flags.sort_unstable();
    Ok(flags.into_iter().collect())
}

fn compile_regex(pattern: &str, flags: &str) -> Result<Regex, SearchValidationError> {
    RegexBuilder::new(pattern)
        .case_insensitive(flags.contains('i'))
        .multi_line(flags.contains('m'))
        .dot_matches_new_line(flags.contains('s'))
        .ignore_whitespace(flags.contains('x'))
        .size_limit(REGEX_SIZE_LIMIT)
        .build()
        .map_err(|err| match err {
            regex::Error::CompiledTooBig(limit) => SearchValidationError::new(
                "pattern",
                format!("regex exceeds the compiled size limit of {limit} bytes"),
            ),
            other => SearchValidationError::new("pattern", format!("invalid regex: {other}")),
        })
}

/// Validates and clamps raw parameters. Pure: reads nothing, compiles the matcher.
///
/// Numeric hints never fail; pattern and flag problems do.
pub fn build_guarded_search_config(
    params: &SearchParams,
) -> Result<GuardedSearchConfig, SearchValidationError> {
    let pattern = params.pattern.as_str();
    if pattern.is_empty() {
        return Err(SearchValidationError::new("pattern", "pattern cannot be empty"));
    }
    let chars = pattern.chars().count();
    if chars > MAX_PATTERN_CHARS {
        return Err(SearchValidationError::new(
            "pattern",
            format!("pattern is {chars} characters (max {MAX_PATTERN_CHARS})"),
        ));
    }

    let ignore_case = params.ignore_case.unwrap_or(true);
    let flags = normalize_flags(params.flags.as_deref(), ignore_case)?;

    let (flags, matcher) = if params.regex {
        let regex = compile_regex(pattern, &flags)?;
        (flags, LineMatcher::Regex(regex))
    } else {
        let needle = if ignore_case {
            pattern.to_lowercase()
        } else {
            pattern.to_string()
        };
        (String::new(), LineMatcher::Literal { needle, ignore_case })
    };

    Ok(GuardedSearchConfig {
        pattern: pattern.to_string(),
        regex: params.regex,
        flags,
        ignore_case,
        match_limit: normalize_match_limit(params.max_matches),
        page_size: normalize_page_size(params.page_size),
        timeout_ms: normalize_timeout_ms(params.timeout_ms),
        context: normalize_context_lines(params.context_before, params.context_after),
        matcher,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn clamps_numeric_hints() {
        assert_eq!(normalize_match_limit(None), 50);
        assert_eq!(normalize_match_limit(Some(0)), 1);
        assert_eq!(normalize_match_limit(Some(-3)), 1);
        assert_eq!(normalize_match_limit(Some(200)), 50);
        assert_eq!(normalize_match_limit(Some(7)), 7);

        assert_eq!(normalize_page_size(None), 8192);
        assert_eq!(normalize_page_size(Some(256)), 512);
        assert_eq!(normalize_page_size(Some(8192)), 8192);
        assert_eq!(normalize_page_size(Some(100_000)), 8192);

        assert_eq!(normalize_timeout_ms(None), 500);
        assert_eq!(normalize_timeout_ms(Some(0)), 500);
        assert_eq!(normalize_timeout_ms(Some(-10)), 500);
        assert_eq!(normalize_timeout_ms(Some(1)), 1);
        assert_eq!(normalize_timeout_ms(Some(10_000)), 2000);

        assert_eq!(
            normalize_context_lines(Some(-1), Some(10)),
            ContextLines { before: 2, after: 5 }
        );
        assert_eq!(
            normalize_context_lines(None, None),
            ContextLines { before: 2, after: 5 }
        );
        assert_eq!(
            normalize_context_lines(Some(0), Some(3)),
            ContextLines { before: 0, after: 3 }
        );
    }

    #[test]
    fn builds_regex_config() {
        let config = build_guarded_search_config(&SearchParams {
            pattern: "protect".into(),
            regex: true,
            flags: Some("msg".into()),
            ignore_case: Some(false),
            max_matches: Some(80),
            page_size: Some(100),
            timeout_ms: Some(1000),
            context_before: Some(1),
            context_after: Some(3),
        })
        .unwrap();
        assert!(config.regex);
        assert_eq!(config.flags, "ms");
        assert_eq!(config.match_limit, 50);
        assert_eq!(config.page_size, 512);
        assert_eq!(config.timeout_ms, 1000);
        assert_eq!(config.context, ContextLines { before: 1, after: 3 });
        assert!(config.matcher.is_match("protective"));
        assert!(!config.matcher.is_match("Protective"));
    }

    #[test]
    fn page_size_is_carried_into_the_config() {
        let build = |page_size| {
            build_guarded_search_config(&SearchParams {
                pattern: "x".into(),
                page_size,
                ..SearchParams::default()
            })
            .unwrap()
            .page_size
        };
        assert_eq!(build(None), 8192);
        assert_eq!(build(Some(-1)), 512);
        assert_eq!(build(Some(100)), 512);
        assert_eq!(build(Some(2048)), 2048);
        assert_eq!(build(Some(100_000)), 8192);

        let parsed: SearchParams = serde_json::from_str(r#"{"pattern":"x","pageSize":1024}"#).unwrap();
        assert_eq!(parsed.page_size, Some(1024));
    }

    #[test]
    fn ignore_case_defaults_on() {
        let config = build_guarded_search_config(&SearchParams {
            pattern: "Self Energy".into(),
            ..SearchParams::default()
        })
        .unwrap();
        assert!(config.ignore_case);
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(config.flags, "");
        assert!(config.matcher.is_match("more self energy today"));

        let regex = build_guarded_search_config(&SearchParams {
            pattern: "self".into(),
            regex: true,
            ..SearchParams::default()
        })
        .unwrap();
        assert_eq!(regex.flags, "i");
        assert!(regex.matcher.is_match("SELF"));
    }

    #[test]
    fn rejects_bad_patterns_and_flags() {
        let cases = [
            (SearchParams { pattern: String::new(), ..SearchParams::default() }, "pattern"),
            (
                SearchParams { pattern: "a".repeat(MAX_PATTERN_CHARS + 1), ..SearchParams::default() },
                "pattern",
            ),
            (
                SearchParams { pattern: "(".into(), regex: true, ..SearchParams::default() },
                "pattern",
            ),
            (
                SearchParams {
                    pattern: "a".into(),
                    regex: true,
                    flags: Some("y".into()),
                    ..SearchParams::default()
                },
                "flags",
            ),
            (
                SearchParams {
                    pattern: "a".into(),
                    regex: true,
                    flags: Some("i".into()),
                    ignore_case: Some(false),
                    ..SearchParams::default()
                },
                "flags",
            ),
        ];
        for (params, field) in cases {
            let err = build_guarded_search_config(&params).unwrap_err();
            assert_eq!(err.field, field, "{err}");
        }
    }

    #[test]
    fn rejects_regex_over_size_limit() {
        let err = build_guarded_search_config(&SearchParams {
            pattern: r"\w{1000}\w{1000}".into(),
            regex: true,
            ..SearchParams::default()
        })
        .unwrap_err();
        assert_eq!(err.field, "pattern");
    }
}
