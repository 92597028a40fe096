//! Visibility Cascade
//!
//! Single place where `is_invisible` is derived. A node is invisible iff it
//! is explicitly hidden, its content item is hidden, or its parent is
//! invisible. Hide, unhide, move, restore and materialization all go through
//! the functions here instead of re-deriving the rule at each call site.

use crate::db::{ContentGateway, TreeStore};
use crate::models::{LocationId, LocationNode, MaterializedPath};
use crate::operations::error::TreeError;
use std::collections::HashSet;

/// How a move recomputes `is_invisible` for the rows it rebases
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveVisibility {
    /// Destination is hidden or invisible: the whole subtree becomes invisible
    ForceInvisible,
    /// Source root was invisible only because of its old ancestors: each row
    /// is invisible iff its new path passes through one of these hidden ids
    Recompute(HashSet<LocationId>),
    /// Source root was visible (or is itself hidden): keep stored values
    Preserve,
}

impl MoveVisibility {
    pub fn decide(
        source: &LocationNode,
        destination: &LocationNode,
        hidden_ids: HashSet<LocationId>,
    ) -> Self {
        if destination.hides_children() {
            MoveVisibility::ForceInvisible
        } else if source.is_invisible && !source.is_hidden {
            MoveVisibility::Recompute(hidden_ids)
        } else {
            MoveVisibility::Preserve
        }
    }

    /// New `is_invisible` for a row that now lives at `new_path`
    pub fn apply(&self, was_invisible: bool, new_path: &MaterializedPath) -> bool {
        match self {
            MoveVisibility::ForceInvisible => true,
            MoveVisibility::Recompute(hidden_ids) => {
                VisibilityCascade::is_dominated_by_hidden_ancestor(new_path, hidden_ids)
            }
            MoveVisibility::Preserve => was_invisible,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            MoveVisibility::ForceInvisible => "force_invisible",
            MoveVisibility::Recompute(_) => "recompute",
            MoveVisibility::Preserve => "preserve",
        }
    }
}

/// Result of an unhide request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnhideOutcome {
    /// The hide flag was cleared; `made_visible` rows had `is_invisible` reset
    Unhidden { made_visible: u64 },
    /// An ancestor is still hidden; nothing was changed
    DominatedByAncestor,
}

pub struct VisibilityCascade;

impl VisibilityCascade {
    /// True if any id on `path` is in `hidden_ids`
    pub fn is_dominated_by_hidden_ancestor(
        path: &MaterializedPath,
        hidden_ids: &HashSet<LocationId>,
    ) -> bool {
        path.segments().iter().any(|id| hidden_ids.contains(id))
    }

    /// `is_invisible` of a node about to be created under `parent`
    pub fn invisible_under(parent: &LocationNode, is_hidden: bool, content_hidden: bool) -> bool {
        is_hidden || content_hidden || parent.hides_children()
    }

    /// Hidden ids that can still dominate rows of `source`'s subtree after it
    /// moves: hidden nodes inside the subtree plus hidden placements of the
    /// source's content item
    ///
    /// Must be read before any write of the move.
    pub async fn hidden_ancestor_ids(
        store: &TreeStore<'_>,
        source: &LocationNode,
    ) -> Result<HashSet<LocationId>, TreeError> {
        let mut hidden_ids: HashSet<LocationId> = store
            .hidden_ids_in_subtree(&source.path)
            .await?
            .into_iter()
            .collect();
        hidden_ids.extend(store.hidden_ids_of_content(source.content_id).await?);
        Ok(hidden_ids)
    }

    /// Hide `location`: its whole subtree becomes invisible, only the root is
    /// flagged hidden
    ///
    /// Returns the number of rows in the subtree. Hiding an already hidden
    /// subtree succeeds.
    pub async fn hide(store: &TreeStore<'_>, location: &LocationNode) -> Result<u64, TreeError> {
        let affected = store.set_invisible_by_prefix(&location.path, true).await?;
        store.set_hidden(location.id, true).await?;

        tracing::debug!(
            "Hid subtree {} ({} rows invisible)",
            location.path,
            affected
        );
        Ok(affected)
    }

    /// Re-derive `is_invisible` for the subtree of `location` from the
    /// current hidden state of its ancestors, its rows and their content
    ///
    /// Used when a slot's content changes in place. Returns the number of
    /// rows written.
    pub async fn refresh_subtree(
        store: &TreeStore<'_>,
        location: &LocationNode,
    ) -> Result<u64, TreeError> {
        if !store.hidden_among(location.path.ancestors()).await?.is_empty() {
            return Ok(store.set_invisible_by_prefix(&location.path, true).await?);
        }

        let hidden: HashSet<LocationId> = store
            .hidden_ids_in_subtree(&location.path)
            .await?
            .into_iter()
            .collect();

        let mut invisible = Vec::new();
        let mut visible = Vec::new();
        for row in store.find_subtree(&location.path).await? {
            if Self::is_dominated_by_hidden_ancestor(&row.path, &hidden) {
                invisible.push(row.id);
            } else {
                visible.push(row.id);
            }
        }

        let written = store.set_invisible_by_ids(&invisible, true).await?
            + store.set_invisible_by_ids(&visible, false).await?;

        tracing::debug!(
            "Refreshed visibility of subtree {} ({} rows)",
            location.path,
            written
        );
        Ok(written)
    }

    /// Unhide `location`
    ///
    /// Aborts without changes while any ancestor is hidden (explicitly or via
    /// its content). Otherwise the subtree becomes visible except below
    /// nested hidden nodes, and only the target's hide flag is cleared.
    pub async fn unhide(
        store: &TreeStore<'_>,
        gateway: &dyn ContentGateway,
        location: &LocationNode,
    ) -> Result<UnhideOutcome, TreeError> {
        let hidden_ancestors = store.hidden_among(location.path.ancestors()).await?;
        if !hidden_ancestors.is_empty() {
            tracing::debug!(
                "Unhide of {} skipped: dominated by hidden ancestors {:?}",
                location.id,
                hidden_ancestors
            );
            return Ok(UnhideOutcome::DominatedByAncestor);
        }

        let content_hidden = gateway
            .is_hidden(store.connection(), location.content_id)
            .await?;

        let made_visible = if content_hidden {
            // The content keeps the whole subtree invisible
            0
        } else {
            let nested: HashSet<LocationId> = store
                .hidden_ids_in_subtree(&location.path)
                .await?
                .into_iter()
                .filter(|id| *id != location.id)
                .collect();

            if nested.is_empty() {
                store.set_invisible_by_prefix(&location.path, false).await?
            } else {
                let visible: Vec<LocationId> = store
                    .find_subtree(&location.path)
                    .await?
                    .into_iter()
                    .filter(|row| !Self::is_dominated_by_hidden_ancestor(&row.path, &nested))
                    .map(|row| row.id)
                    .collect();
                store.set_invisible_by_ids(&visible, false).await?
            }
        };

        store.set_hidden(location.id, false).await?;

        tracing::debug!(
            "Unhid subtree {} ({} rows visible)",
            location.path,
            made_visible
        );
        Ok(UnhideOutcome::Unhidden { made_visible })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IdentificationPath, SortField, SortOrder};

    fn node(path: &str, is_hidden: bool, is_invisible: bool) -> LocationNode {
        let path: MaterializedPath = path.parse().unwrap();
        LocationNode {
            id: path.leaf(),
            parent_id: path.parent_id(),
            content_id: 100,
            content_version: 1,
            depth: path.depth(),
            path,
            path_identification: IdentificationPath::root(),
            priority: 0,
            sort_field: SortField::Path,
            sort_order: SortOrder::Ascending,
            remote_id: String::new(),
            is_hidden,
            is_invisible,
            main_location_id: None,
        }
    }

    #[test]
    fn test_dominated_by_hidden_ancestor() {
        let hidden: HashSet<LocationId> = [5].into_iter().collect();
        assert!(VisibilityCascade::is_dominated_by_hidden_ancestor(
            &"/1/5/2/".parse().unwrap(),
            &hidden
        ));
        assert!(!VisibilityCascade::is_dominated_by_hidden_ancestor(
            &"/1/9/2/".parse().unwrap(),
            &hidden
        ));
    }

    #[test]
    fn test_hidden_destination_forces_invisibility() {
        let source = node("/1/5/", false, false);
        let destination = node("/1/9/", true, true);
        let policy = MoveVisibility::decide(&source, &destination, HashSet::new());

        assert_eq!(policy, MoveVisibility::ForceInvisible);
        assert!(policy.apply(false, &"/1/9/5/".parse().unwrap()));
    }

    #[test]
    fn test_invisible_source_recomputes_per_row() {
        let source = node("/1/3/5/", false, true);
        let destination = node("/1/9/", false, false);
        let hidden: HashSet<LocationId> = [7].into_iter().collect();
        let policy = MoveVisibility::decide(&source, &destination, hidden);

        assert_eq!(policy.name(), "recompute");
        assert!(!policy.apply(true, &"/1/9/5/".parse().unwrap()));
        assert!(policy.apply(false, &"/1/9/5/7/8/".parse().unwrap()));
    }

    #[test]
    fn test_visible_or_hidden_source_preserves_state() {
        let destination = node("/1/9/", false, false);

        let visible = node("/1/5/", false, false);
        let policy = MoveVisibility::decide(&visible, &destination, HashSet::new());
        assert_eq!(policy, MoveVisibility::Preserve);
        assert!(policy.apply(true, &"/1/9/5/6/".parse().unwrap()));

        let hidden = node("/1/5/", true, true);
        let policy = MoveVisibility::decide(&hidden, &destination, HashSet::new());
        assert_eq!(policy, MoveVisibility::Preserve);
    }

    #[test]
    fn test_invisible_under() {
        let visible_parent = node("/1/5/", false, false);
        let invisible_parent = node("/1/5/", false, true);

        assert!(!VisibilityCascade::invisible_under(&visible_parent, false, false));
        assert!(VisibilityCascade::invisible_under(&visible_parent, true, false));
        assert!(VisibilityCascade::invisible_under(&visible_parent, false, true));
        assert!(VisibilityCascade::invisible_under(&invisible_parent, false, false));
    }
}

// Store-backed cascade tests in separate module
#[cfg(test)]
#[path = "visibility_test.rs"]
mod visibility_test;
