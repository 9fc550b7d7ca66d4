use async_trait::async_trait;
use memory_search::{
    MarkdownSearch, Scope, SearchError, SearchEvent, SearchParams, SearchTelemetry,
    TelemetryResult,
};
use memory_storage::{LocalFsStorage, StorageAdapter};
use pretty_assertions::assert_eq;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

async fn fixture() -> anyhow::Result<(TempDir, Arc<dyn StorageAdapter>)> {
    let dir = TempDir::new()?;
    let storage: Arc<dyn StorageAdapter> = Arc::new(LocalFsStorage::new(dir.path())?);
    storage
        .put_text(
            "users/user-123/overview.md",
            "# Overview\n\nSelf energy rising in daily check-ins.\nFocus on morning routines.\n",
        )
        .await?;
    storage
        .put_text(
            "users/user-123/parts/part-1.md",
            "# Guardian\n\nProtective stance when under stress.\nPrefers evening reflections.\n",
        )
        .await?;
    storage
        .put_text("users/user-123/sessions/notes.txt", "Self energy in a text file\n")
        .await?;
    storage
        .put_text("users/other/overview.md", "Self energy of someone else\n")
        .await?;
    Ok((dir, storage))
}

fn params(pattern: &str) -> SearchParams {
    SearchParams {
        pattern: pattern.to_string(),
        ..SearchParams::default()
    }
}

#[tokio::test]
async fn lists_markdown_in_user_scope() -> anyhow::Result<()> {
    let (_dir, storage) = fixture().await?;
    let search = MarkdownSearch::new(storage);

    let listed = search
        .list_markdown_files(&Scope::user("user-123"), None)
        .await?;
    let paths: Vec<&str> = listed.iter().map(|i| i.path.as_str()).collect();
    assert_eq!(paths, vec!["overview.md", "parts/part-1.md"]);
    assert!(listed[0].size > 0);

    let globbed = search
        .list_markdown_files(
            &Scope {
                globs: vec!["parts/*.md".into()],
                ..Scope::user("user-123")
            },
            None,
        )
        .await?;
    assert_eq!(globbed.len(), 1);
    assert_eq!(globbed[0].path, "parts/part-1.md");

    let limited = search
        .list_markdown_files(&Scope::user("user-123"), Some(1))
        .await?;
    assert_eq!(limited.len(), 1);
    Ok(())
}

#[tokio::test]
async fn literal_and_regex_search() -> anyhow::Result<()> {
    let (_dir, storage) = fixture().await?;
    let search = MarkdownSearch::new(storage);
    let scope = Scope::user("user-123");

    let literal = search.search_markdown(&scope, &params("self energy")).await?;
    assert_eq!(literal.matches.len(), 1);
    let hit = &literal.matches[0];
    assert_eq!(hit.path, "overview.md");
    assert_eq!(hit.line, 3);
    assert_eq!(hit.before, vec!["# Overview".to_string(), String::new()]);
    assert_eq!(hit.after, vec!["Focus on morning routines.".to_string()]);
    assert!(!literal.truncated);

    let regex = search
        .search_markdown(
            &scope,
            &SearchParams {
                regex: true,
                ..params(r"even(ing)?\s+refl")
            },
        )
        .await?;
    assert_eq!(regex.matches.len(), 1);
    assert_eq!(regex.matches[0].path, "parts/part-1.md");

    let scoped = search
        .search_markdown(
            &Scope {
                prefix: Some("parts".into()),
                ..Scope::user("user-123")
            },
            &params("self energy"),
        )
        .await?;
    assert!(scoped.matches.is_empty());
    Ok(())
}

#[tokio::test]
async fn match_limit_truncates() -> anyhow::Result<()> {
    let (_dir, storage) = fixture().await?;
    let search = MarkdownSearch::new(storage);

    let outcome = search
        .search_markdown(
            &Scope::user("user-123"),
            &SearchParams {
                max_matches: Some(1),
                ..params("e")
            },
        )
        .await?;
    assert_eq!(outcome.matches.len(), 1);
    assert!(outcome.truncated);
    assert!(!outcome.timed_out);
    Ok(())
}

#[tokio::test]
async fn long_lines_are_clipped_to_the_page_size() -> anyhow::Result<()> {
    let (_dir, storage) = fixture().await?;
    let long_line = format!("needle {}", "x".repeat(4000));
    storage
        .put_text("users/user-123/parts/long.md", &format!("# Long\n{long_line}\n"))
        .await?;
    let search = MarkdownSearch::new(storage);

    let outcome = search
        .search_markdown(
            &Scope::user("user-123"),
            &SearchParams {
                page_size: Some(600),
                ..params("needle")
            },
        )
        .await?;
    assert_eq!(outcome.matches.len(), 1);
    assert_eq!(outcome.matches[0].snippet.chars().count(), 600);
    assert!(outcome.matches[0].snippet.starts_with("needle "));

    let default = search
        .search_markdown(&Scope::user("user-123"), &params("needle"))
        .await?;
    assert_eq!(default.matches[0].snippet, long_line);
    Ok(())
}

#[tokio::test]
async fn validation_fails_before_any_read() -> anyhow::Result<()> {
    let (_dir, storage) = fixture().await?;
    let search = MarkdownSearch::new(storage);

    let err = search
        .search_markdown(
            &Scope::user("user-123"),
            &SearchParams {
                regex: true,
                ..params("(")
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SearchError::Validation(ref v) if v.field == "pattern"));

    let err = search
        .search_markdown(
            &Scope {
                prefix: Some("../other".into()),
                ..Scope::user("user-123")
            },
            &params("x"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SearchError::Validation(ref v) if v.field == "prefix"));
    Ok(())
}

#[tokio::test]
async fn reads_pages_by_character_offset() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let storage: Arc<dyn StorageAdapter> = Arc::new(LocalFsStorage::new(dir.path())?);
    let body: String = "é".repeat(600);
    storage.put_text("users/u1/long.md", &body).await?;
    let search = MarkdownSearch::new(storage);

    let first = search.read_markdown("u1", "long.md", 0, Some(10)).await?;
    assert_eq!(first.data.chars().count(), 512);
    assert_eq!(first.next_offset, Some(512));
    assert!(first.has_more);

    let second = search.read_markdown("u1", "/long.md", 512, None).await?;
    assert_eq!(second.data.chars().count(), 88);
    assert_eq!(second.next_offset, None);
    assert!(!second.has_more);

    let missing = search.read_markdown("u1", "nope.md", 0, None).await?;
    assert_eq!(missing.data, "");
    assert!(!missing.has_more);
    Ok(())
}

struct SlowSecondFile {
    inner: Arc<dyn StorageAdapter>,
}

#[async_trait]
impl StorageAdapter for SlowSecondFile {
    async fn put_text(&self, path: &str, text: &str) -> memory_storage::Result<()> {
        self.inner.put_text(path, text).await
    }
    async fn get_text(&self, path: &str) -> memory_storage::Result<Option<String>> {
        if path.ends_with("part-1.md") {
            tokio::time::sleep(Duration::from_secs(10)).await;
        }
        self.inner.get_text(path).await
    }
    async fn exists(&self, path: &str) -> memory_storage::Result<bool> {
        self.inner.exists(path).await
    }
    async fn list(&self, prefix: &str) -> memory_storage::Result<Vec<String>> {
        self.inner.list(prefix).await
    }
    async fn delete(&self, path: &str) -> memory_storage::Result<()> {
        self.inner.delete(path).await
    }
    fn backend_name(&self) -> &'static str {
        "slow"
    }
}

#[derive(Default)]
struct RecordingTelemetry {
    events: Mutex<Vec<SearchEvent>>,
}

#[async_trait]
impl SearchTelemetry for RecordingTelemetry {
    async fn record(&self, event: &SearchEvent) -> TelemetryResult {
        self.events.lock().expect("lock").push(event.clone());
        Ok(())
    }
}

#[tokio::test]
async fn time_budget_returns_partial_results() -> anyhow::Result<()> {
    let (_dir, storage) = fixture().await?;
    let telemetry = Arc::new(RecordingTelemetry::default());
    let search = MarkdownSearch::new(Arc::new(SlowSecondFile { inner: storage }))
        .with_telemetry(telemetry.clone());

    let outcome = search
        .search_markdown(
            &Scope::user("user-123"),
            &SearchParams {
                timeout_ms: Some(100),
                ..params("e")
            },
        )
        .await?;
    assert!(outcome.timed_out);
    assert!(outcome.truncated);
    assert!(!outcome.matches.is_empty());
    assert!(outcome.matches.iter().all(|m| m.path == "overview.md"));

    let events = telemetry.events.lock().expect("lock");
    assert_eq!(events.len(), 1);
    assert!(events[0].timed_out);
    assert_eq!(events[0].match_count, outcome.matches.len());
    Ok(())
}
