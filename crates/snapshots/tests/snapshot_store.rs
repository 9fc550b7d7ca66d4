use async_trait::async_trait;
use memory_markdown::grammar::{PartSeed, CHANGE_LOG, CURRENT_FOCUS, IDENTITY};
use memory_markdown::{ContentHash, MarkdownError, SectionChange};
use memory_snapshots::{
    load_overview_snapshot, part_profile_path, user_overview_path, SnapshotError, SnapshotStore,
};
use memory_storage::{LocalFsStorage, StorageAdapter, StorageError};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use tempfile::TempDir;

fn local_store(dir: &TempDir) -> SnapshotStore {
    let storage = LocalFsStorage::new(dir.path()).expect("storage");
    SnapshotStore::new(Arc::new(storage))
}

#[tokio::test]
async fn scaffold_append_and_read_back() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let store = local_store(&dir);

    let ensured = store.ensure_overview_exists("U").await?;
    assert!(ensured.created);
    assert_eq!(ensured.path, "users/U/overview.md");

    let doc = store.read_document(&ensured.path).await?.expect("overview");
    let identity_before = doc.fragment(IDENTITY).expect("identity").clone();
    assert!(identity_before.heading.contains("Identity"));

    let edit = store
        .edit_section(&ensured.path, CURRENT_FOCUS, &SectionChange::Append("- note A".into()))
        .await?;
    assert_eq!(edit.before_hash, doc.hash);
    assert!(edit.changed);

    let after = store.read_document(&ensured.path).await?.expect("overview");
    assert!(after.fragment(CURRENT_FOCUS).unwrap().text().contains("note A"));
    assert_eq!(after.fragment(IDENTITY).unwrap(), &identity_before);
    assert_eq!(after.hash, edit.after_hash);
    Ok(())
}

#[tokio::test]
async fn scaffold_is_idempotent() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let store = local_store(&dir);

    let first = store.ensure_overview_exists("u1").await?;
    let second = store.ensure_overview_exists("u1").await?;
    assert!(first.created);
    assert!(!second.created);
    assert_eq!(first.hash, second.hash);
    Ok(())
}

#[tokio::test]
async fn first_edit_of_canonical_path_scaffolds() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let store = local_store(&dir);
    let path = part_profile_path("u1", "p1")?;

    let edit = store
        .edit_section(&path, "role v1", &SectionChange::Replace("- Protector".into()))
        .await?;
    assert!(edit.before_hash.is_absent());

    let doc = store.read_document(&path).await?.expect("profile");
    assert_eq!(doc.fragment("role v1").unwrap().text(), "- Protector");
    assert_eq!(doc.hash, edit.after_hash);
    Ok(())
}

#[tokio::test]
async fn missing_targets_fail_without_writing() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let store = local_store(&dir);

    let err = store
        .edit_section("notes/free.md", CURRENT_FOCUS, &SectionChange::Append("x".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, SnapshotError::DocumentNotFound { .. }));

    let path = user_overview_path("u1")?;
    let err = store
        .edit_section(&path, "nope v1", &SectionChange::Append("x".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, SnapshotError::SectionNotFound { ref anchor, .. } if anchor == "nope v1"));
    assert!(store.read_document(&path).await?.is_none());

    let err = store.read_document("../secret").await.unwrap_err();
    assert!(matches!(err, SnapshotError::Storage(StorageError::PathTraversal(_))));
    Ok(())
}

#[tokio::test]
async fn unrenderable_anchor_is_rejected_before_scaffolding() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let store = local_store(&dir);
    let path = user_overview_path("u1")?;

    let err = store
        .edit_section(&path, "focus)", &SectionChange::Append("x".into()))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SnapshotError::Markdown(MarkdownError::InvalidAnchor(ref anchor)) if anchor == "focus)"
    ));
    assert!(store.read_document(&path).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn edit_reports_lint_warnings_under_lint() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let store = local_store(&dir);
    let path = user_overview_path("u1")?;
    store.ensure_overview_exists("u1").await?;

    let edit = store
        .edit_section(&path, CURRENT_FOCUS, &SectionChange::Append("## Stray heading".into()))
        .await?;
    assert!(edit
        .lint
        .warnings
        .iter()
        .any(|w| w.starts_with("Heading without anchor marker")));

    let json = serde_json::to_value(&edit)?;
    assert!(json["lint"]["warnings"].is_array());
    assert!(json.get("warnings").is_none());
    Ok(())
}

#[tokio::test]
async fn edit_expecting_checks_the_current_hash() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let store = local_store(&dir);
    let ensured = store.ensure_overview_exists("u1").await?;

    let stale = ContentHash::of("something else");
    let err = store
        .edit_expecting(&ensured.path, CURRENT_FOCUS, &SectionChange::Append("- a".into()), &stale)
        .await
        .unwrap_err();
    assert!(matches!(err, SnapshotError::HashMismatch { .. }));
    let unchanged = store.read_document(&ensured.path).await?.unwrap();
    assert_eq!(unchanged.hash, ensured.hash);

    let ok = store
        .edit_expecting(
            &ensured.path,
            CURRENT_FOCUS,
            &SectionChange::Append("- a".into()),
            &ensured.hash,
        )
        .await?;
    assert_eq!(ok.before_hash, ensured.hash);
    Ok(())
}

#[tokio::test]
async fn part_lifecycle_hooks_write_change_log() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let store = local_store(&dir);
    let seed = PartSeed {
        user_id: "u1".into(),
        part_id: "p1".into(),
        name: "Critic".into(),
        status: "active".into(),
        category: "manager".into(),
    };

    store.on_part_created(&seed).await?;
    store
        .on_part_updated("u1", "p1", "Critic", "softened after session")
        .await?;

    let doc = store
        .read_document(&part_profile_path("u1", "p1")?)
        .await?
        .unwrap();
    let log = doc.fragment(CHANGE_LOG).unwrap().text();
    let lines: Vec<&str> = log.lines().collect();
    assert_eq!(lines.len(), 3, "{log}");
    assert!(lines[0].ends_with(": initialized profile"));
    assert!(lines[1].ends_with(": created part \"Critic\" (status: active, category: manager)"));
    assert!(lines[2].ends_with(": updated part \"Critic\": softened after session"));
    Ok(())
}

#[tokio::test]
async fn overview_snapshot_scaffolds_on_first_load() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let store = local_store(&dir);

    let first = load_overview_snapshot(&store, " u1 ").await.expect("snapshot");
    assert!(first.created);
    let anchors: Vec<&str> = first.fragments.iter().map(|f| f.anchor.as_str()).collect();
    assert_eq!(anchors, vec![IDENTITY, CURRENT_FOCUS, CHANGE_LOG]);

    let second = load_overview_snapshot(&store, "u1").await.expect("snapshot");
    assert!(!second.created);
    assert_eq!(load_overview_snapshot(&store, "  ").await, None);
    Ok(())
}

struct BrokenStorage;

#[async_trait]
impl StorageAdapter for BrokenStorage {
    async fn put_text(&self, path: &str, _text: &str) -> memory_storage::Result<()> {
        Err(StorageError::Other(format!("write refused: {path}")))
    }
    async fn get_text(&self, path: &str) -> memory_storage::Result<Option<String>> {
        Err(StorageError::Other(format!("read refused: {path}")))
    }
    async fn exists(&self, _path: &str) -> memory_storage::Result<bool> {
        Ok(false)
    }
    async fn list(&self, _prefix: &str) -> memory_storage::Result<Vec<String>> {
        Ok(Vec::new())
    }
    async fn delete(&self, _path: &str) -> memory_storage::Result<()> {
        Ok(())
    }
    fn backend_name(&self) -> &'static str {
        "broken"
    }
}

#[tokio::test]
async fn storage_errors_propagate_and_overview_degrades() {
    let store = SnapshotStore::new(Arc::new(BrokenStorage));
    let err = store.ensure_overview_exists("u1").await.unwrap_err();
    assert!(matches!(err, SnapshotError::Storage(StorageError::Other(_))));
    assert_eq!(load_overview_snapshot(&store, "u1").await, None);
}
