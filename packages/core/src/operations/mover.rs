//! Subtree Mover
//!
//! Structural edits that rewrite materialized paths: moving a subtree under a
//! new parent, creating a node under a parent, renaming an identification
//! segment, and permanent subtree removal.
//!
//! # Move algorithm
//!
//! 1. Collect the hidden ids that may dominate the moved rows (before any write)
//! 2. Load every row of the source subtree by prefix on the old path
//! 3. Rebase each row's id path and identification path from the old parent
//!    prefix onto the destination prefix
//! 4. Only the subtree root changes `parent_id` (read from its rebased path)
//! 5. Recompute `depth` from the new path
//! 6. Recompute `is_invisible` according to [`MoveVisibility`]
//! 7. Write every row back
//!
//! All of this runs inside the caller's transaction; a failure part-way
//! leaves nothing applied once the caller rolls back.

use crate::db::TreeStore;
use crate::models::{LocationNode, NewLocation};
use crate::operations::error::TreeError;
use crate::operations::main_location::MainLocationCoordinator;
use crate::operations::visibility::{MoveVisibility, VisibilityCascade};

/// Summary of a completed move
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveOutcome {
    pub old_parent_id: Option<i64>,
    pub new_parent_id: i64,
    /// Rows rebased, subtree root included
    pub affected: usize,
}

pub struct SubtreeMover;

impl SubtreeMover {
    /// Move the subtree rooted at `source` under `destination`
    ///
    /// Both nodes must be current snapshots read inside the same transaction.
    pub async fn move_subtree(
        store: &TreeStore<'_>,
        source: &LocationNode,
        destination: &LocationNode,
    ) -> Result<MoveOutcome, TreeError> {
        if source.is_root() {
            return Err(TreeError::invalid_operation("the tree root cannot be moved"));
        }
        if destination.path.contains(source.id) {
            return Err(TreeError::invalid_operation(format!(
                "cannot move location {} into its own subtree (destination {})",
                source.id, destination.id
            )));
        }

        let hidden_ids = VisibilityCascade::hidden_ancestor_ids(store, source).await?;
        let visibility = MoveVisibility::decide(source, destination, hidden_ids);

        let rows = store.find_subtree(&source.path).await?;

        let old_prefix = source.path.ancestors();
        let new_prefix = destination.path.segments();
        let old_identification_prefix = source
            .path_identification
            .segments()
            .split_last()
            .map(|(_, prefix)| prefix)
            .unwrap_or_default();
        let new_identification_prefix = destination.path_identification.segments();

        let affected = rows.len();
        for mut row in rows {
            let path = row.path.rebase(old_prefix, new_prefix).ok_or_else(|| {
                TreeError::invariant_violation(format!(
                    "location {} at {} is not below {}",
                    row.id, row.path, source.path
                ))
            })?;
            let path_identification = row
                .path_identification
                .rebase(old_identification_prefix, new_identification_prefix)
                .ok_or_else(|| {
                    TreeError::invariant_violation(format!(
                        "identification path '{}' of location {} is not below '{}'",
                        row.path_identification, row.id, source.path_identification
                    ))
                })?;

            if row.id == source.id {
                row.parent_id = path.parent_id();
            }
            row.depth = path.depth();
            row.is_invisible = visibility.apply(row.is_invisible, &path);
            row.path = path;
            row.path_identification = path_identification;

            store.write_shape(&row).await?;
        }

        tracing::info!(
            "Moved subtree {} under {} ({} rows, visibility {})",
            source.id,
            destination.id,
            affected,
            visibility.name()
        );

        Ok(MoveOutcome {
            old_parent_id: source.parent_id,
            new_parent_id: destination.id,
            affected,
        })
    }

    /// Create a node under `parent`; derived fields are taken from `new` as is
    pub async fn create_under_parent(
        store: &TreeStore<'_>,
        parent: &LocationNode,
        new: &NewLocation,
    ) -> Result<LocationNode, TreeError> {
        let created = store.insert_location(parent, new).await?;
        tracing::debug!(
            "Created location {} for content {} at {}",
            created.id,
            created.content_id,
            created.path
        );
        Ok(created)
    }

    /// Replace the identification segment of `location` and rebase the
    /// identification path of its whole subtree
    ///
    /// Returns the number of rows rewritten.
    pub async fn rename_path_segment(
        store: &TreeStore<'_>,
        location: &LocationNode,
        segment: &str,
    ) -> Result<usize, TreeError> {
        if location.is_root() {
            return Err(TreeError::invalid_operation(
                "the tree root has no identification segment",
            ));
        }

        let renamed = location.path_identification.with_last_segment(segment);
        let old_prefix = location.path_identification.segments();

        let rows = store.find_subtree(&location.path).await?;
        let affected = rows.len();
        for mut row in rows {
            row.path_identification = row
                .path_identification
                .rebase(old_prefix, renamed.segments())
                .ok_or_else(|| {
                    TreeError::invariant_violation(format!(
                        "identification path '{}' of location {} is not below '{}'",
                        row.path_identification, row.id, location.path_identification
                    ))
                })?;
            store.write_shape(&row).await?;
        }

        tracing::debug!(
            "Renamed segment of location {} to '{}' ({} rows)",
            location.id,
            renamed.last_segment().unwrap_or_default(),
            affected
        );
        Ok(affected)
    }

    /// Permanently delete the subtree rooted at `location`
    ///
    /// Content items that lose their main location get the fallback main, or
    /// no main entry if no placement remains. Returns the removed rows.
    pub async fn remove_subtree(
        store: &TreeStore<'_>,
        location: &LocationNode,
    ) -> Result<Vec<LocationNode>, TreeError> {
        if location.is_root() {
            return Err(TreeError::invalid_operation("the tree root cannot be removed"));
        }

        let removed = store.delete_subtree(&location.path).await?;
        MainLocationCoordinator::repair_main_locations(store, &removed).await?;

        tracing::info!(
            "Removed subtree {} ({} locations)",
            location.id,
            removed.len()
        );
        Ok(removed)
    }
}

// Store-backed move tests in separate module
#[cfg(test)]
#[path = "mover_test.rs"]
mod mover_test;
