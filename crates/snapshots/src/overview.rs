use memory_markdown::grammar::{CHANGE_LOG, CURRENT_FOCUS, IDENTITY};
use memory_markdown::render_anchor_marker;
use serde::Serialize;

use crate::paths::user_overview_path;
use crate::store::{SnapshotDocument, SnapshotStore};
use crate::Result;

/// Overview sections surfaced as prompt context, in display order.
pub const OVERVIEW_ANCHORS: [&str; 3] = [IDENTITY, CURRENT_FOCUS, CHANGE_LOG];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverviewFragment {
    pub anchor: String,
    pub heading: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverviewSnapshot {
    pub created: bool,
    pub fragments: Vec<OverviewFragment>,
}

/// Loads the overview fragments for `user_id`, scaffolding the document when missing.
///
/// Display helper: failures are logged and collapse to `None`.
pub async fn load_overview_snapshot(store: &SnapshotStore, user_id: &str) -> Option<OverviewSnapshot> {
    let user_id = user_id.trim();
    if user_id.is_empty() {
        return None;
    }
    match try_load_overview(store, user_id).await {
        Ok(snapshot) => Some(snapshot),
        Err(err) => {
            log::error!("Failed to load overview snapshot for {user_id}: {err}");
            None
        }
    }
}

async fn try_load_overview(store: &SnapshotStore, user_id: &str) -> Result<OverviewSnapshot> {
    let path = user_overview_path(user_id)?;
    let mut created = false;
    let mut doc = store.read_document(&path).await?;
    if doc.is_none() {
        created = store.ensure_overview_exists(user_id).await?.created;
        doc = store.read_document(&path).await?;
    }
    Ok(OverviewSnapshot {
        created,
        fragments: doc.as_ref().map(extract_fragments).unwrap_or_default(),
    })
}

fn extract_fragments(doc: &SnapshotDocument) -> Vec<OverviewFragment> {
    OVERVIEW_ANCHORS
        .iter()
        .filter_map(|anchor| doc.fragment(anchor))
        .map(|fragment| OverviewFragment {
            anchor: fragment.anchor.clone(),
            heading: fragment.heading.clone(),
            text: fragment.text().to_string(),
        })
        .collect()
}

/// Renders fragments as `###` sections for inclusion in a larger prompt.
#[must_use]
pub fn format_overview_fragments(fragments: &[OverviewFragment]) -> String {
    fragments
        .iter()
        .map(|fragment| {
            let body = fragment.text.trim();
            let body = if body.is_empty() { "Unavailable" } else { body };
            format!(
                "{}\n### {}\n\n{body}",
                render_anchor_marker(&fragment.anchor),
                fragment.heading
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn formats_fragments_with_fallback_body() {
        let fragments = vec![
            OverviewFragment {
                anchor: IDENTITY.into(),
                heading: "Identity".into(),
                text: "- User ID: u1".into(),
            },
            OverviewFragment {
                anchor: CURRENT_FOCUS.into(),
                heading: "Current Focus".into(),
                text: "  ".into(),
            },
        ];
        assert_eq!(
            format_overview_fragments(&fragments),
            "[//]: # (anchor: identity v1)\n### Identity\n\n- User ID: u1\n\n\
             [//]: # (anchor: current_focus v1)\n### Current Focus\n\nUnavailable"
        );
        assert_eq!(format_overview_fragments(&[]), "");
    }
}
