use memory_markdown::grammar::{PartSeed, EVIDENCE, ROLE};
use memory_markdown::{MarkdownError, PartFrontmatterUpdate, SectionChange};
use memory_snapshots::{
    part_profile_path, ListPartsFilter, PartsRepository, SnapshotError, SnapshotStore,
};
use memory_storage::{LocalFsStorage, StorageAdapter};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use tempfile::TempDir;

fn repository(dir: &TempDir) -> PartsRepository {
    let storage = LocalFsStorage::new(dir.path()).expect("storage");
    PartsRepository::new(SnapshotStore::new(Arc::new(storage)))
}

fn seed(part: &str, name: &str, status: &str, category: &str) -> PartSeed {
    PartSeed {
        name: name.into(),
        status: status.into(),
        category: category.into(),
        ..PartSeed::placeholder("u1", part)
    }
}

fn tags(tags: &[&str]) -> PartFrontmatterUpdate {
    PartFrontmatterUpdate {
        tags: Some(tags.iter().map(|t| (*t).to_string()).collect()),
        ..PartFrontmatterUpdate::default()
    }
}

async fn populated(dir: &TempDir) -> anyhow::Result<PartsRepository> {
    let parts = repository(dir);
    parts
        .create_part(&seed("p1", "Inner Critic", "active", "manager"), &tags(&["loud"]))
        .await?;
    parts
        .create_part(&seed("p2", "Firefighter", "active", "firefighter"), &tags(&["loud", "fast"]))
        .await?;
    parts
        .create_part(&seed("p3", "Little One", "emerging", "exile"), &tags(&[]))
        .await?;
    // Scaffolded without frontmatter, as older profiles are.
    parts
        .store()
        .ensure_part_profile_exists(&seed("p4", "Old Guard", "dormant", "manager"))
        .await?;
    Ok(parts)
}

#[tokio::test]
async fn created_parts_read_back_with_frontmatter() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let parts = repository(&dir);

    let created = parts
        .create_part(
            &seed("p1", "Inner Critic", "active", "manager"),
            &PartFrontmatterUpdate {
                emoji: Some("🔍".into()),
                ..tags(&["loud"])
            },
        )
        .await?;
    assert!(created.created);
    assert_eq!(created.path, part_profile_path("u1", "p1")?);

    let text = parts.store().storage().get_text(&created.path).await?.expect("profile");
    assert!(text.starts_with("---\nid: p1\n"));

    let part = parts.read_part("u1", "p1").await?.expect("part");
    assert_eq!(part.summary.name, "Inner Critic");
    assert_eq!(part.summary.emoji.as_deref(), Some("🔍"));
    assert_eq!(part.summary.tags, vec!["loud"]);
    assert!(part.created_at.is_some());
    assert!(part.frontmatter.is_some());
    assert!(part.sections.iter().any(|s| s.anchor == ROLE));
    assert_eq!(part.hash, created.hash);

    let again = parts
        .create_part(&seed("p1", "Renamed", "active", "manager"), &tags(&[]))
        .await?;
    assert!(!again.created);
    assert_eq!(parts.read_part("u1", "p1").await?.expect("part").summary.name, "Inner Critic");
    Ok(())
}

#[tokio::test]
async fn list_filters_by_status_category_tag_and_name() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let parts = populated(&dir).await?;
    let ids = |list: Vec<memory_snapshots::PartSummary>| {
        list.into_iter().map(|p| p.id).collect::<Vec<_>>()
    };

    let all = parts.list_parts("u1", &ListPartsFilter::default()).await?;
    assert_eq!(ids(all.clone()), vec!["p1", "p2", "p3", "p4"]);
    let legacy = &all[3];
    assert_eq!(legacy.name, "Old Guard");
    assert_eq!(legacy.status, "dormant");
    assert_eq!(legacy.category, "manager");

    let active = ListPartsFilter {
        status: Some("active".into()),
        ..ListPartsFilter::default()
    };
    assert_eq!(ids(parts.list_parts("u1", &active).await?), vec!["p1", "p2"]);

    let managers = ListPartsFilter {
        category: Some("manager".into()),
        ..ListPartsFilter::default()
    };
    assert_eq!(ids(parts.list_parts("u1", &managers).await?), vec!["p1", "p4"]);

    let fast = ListPartsFilter {
        tag: Some("fast".into()),
        ..ListPartsFilter::default()
    };
    assert_eq!(ids(parts.list_parts("u1", &fast).await?), vec!["p2"]);

    let named = ListPartsFilter {
        query: Some("ONE".into()),
        ..ListPartsFilter::default()
    };
    assert_eq!(ids(parts.list_parts("u1", &named).await?), vec!["p3"]);

    let limited = ListPartsFilter {
        limit: Some(2),
        ..ListPartsFilter::default()
    };
    assert_eq!(ids(parts.list_parts("u1", &limited).await?), vec!["p1", "p2"]);

    assert!(parts.list_parts("nobody", &ListPartsFilter::default()).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn frontmatter_updates_keep_sections() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let parts = populated(&dir).await?;
    parts
        .update_part_section("u1", "p1", EVIDENCE, &SectionChange::Append("- shows up at work".into()))
        .await?;
    let before = parts.read_part("u1", "p1").await?.expect("part");

    let outcome = parts
        .update_part_frontmatter(
            "u1",
            "p1",
            &PartFrontmatterUpdate {
                status: Some("dormant".into()),
                related_parts: Some(vec!["p2".into()]),
                ..PartFrontmatterUpdate::default()
            },
        )
        .await?;
    assert_eq!(outcome.before_hash, before.hash);
    assert_eq!(outcome.frontmatter.status, "dormant");
    assert!(outcome.frontmatter.updated_at >= before.updated_at);

    let after = parts.read_part("u1", "p1").await?.expect("part");
    assert_eq!(after.hash, outcome.after_hash);
    assert_eq!(after.summary.status, "dormant");
    assert_eq!(after.summary.tags, vec!["loud"]);
    assert_eq!(after.related_parts, vec!["p2"]);
    assert_eq!(after.created_at, before.created_at);
    assert_eq!(after.sections, before.sections);
    Ok(())
}

#[tokio::test]
async fn frontmatter_updates_need_an_existing_block() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let parts = populated(&dir).await?;

    let err = parts
        .update_part_frontmatter("u1", "p4", &PartFrontmatterUpdate::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SnapshotError::Markdown(MarkdownError::MissingFrontmatter)));

    let err = parts
        .update_part_frontmatter("u1", "p9", &PartFrontmatterUpdate::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SnapshotError::DocumentNotFound { .. }));
    assert!(!parts.part_exists("u1", "p9").await?);
    Ok(())
}

#[tokio::test]
async fn section_updates_scaffold_missing_profiles() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let parts = repository(&dir);
    assert!(!parts.part_exists("u1", "p5").await?);

    let edit = parts
        .update_part_section("u1", "p5", ROLE, &SectionChange::Replace("- keeps watch".into()))
        .await?;
    assert!(edit.changed);
    assert!(parts.part_exists("u1", "p5").await?);

    let part = parts.read_part("u1", "p5").await?.expect("part");
    assert_eq!(part.frontmatter, None);
    assert_eq!(part.summary.name, "p5");
    let role = part.sections.iter().find(|s| s.anchor == ROLE).expect("role");
    assert_eq!(role.text(), "- keeps watch");

    assert!(matches!(
        parts.read_part("u1", "../p5").await,
        Err(SnapshotError::InvalidId { .. })
    ));
    Ok(())
}
