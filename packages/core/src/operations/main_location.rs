//! Main Location Coordinator
//!
//! Every content item with at least one placement has exactly one main
//! location, stored once in the `main_locations` side table. This module owns
//! every change to that table after creation: swapping two slots, explicit
//! reassignment, and fallback selection when the main placement disappears.

use crate::db::TreeStore;
use crate::models::{ContentId, LocationId, LocationNode};
use crate::operations::error::TreeError;
use crate::operations::visibility::VisibilityCascade;
use std::collections::HashSet;

pub struct MainLocationCoordinator;

impl MainLocationCoordinator {
    /// Exchange the content shown by two location slots
    ///
    /// Ids and tree shape stay fixed. A content item that was main at its old
    /// slot becomes main at its new slot; otherwise its main pointer is left
    /// alone. Applying the same swap twice restores the original state.
    pub async fn swap(
        store: &TreeStore<'_>,
        first_id: LocationId,
        second_id: LocationId,
    ) -> Result<(), TreeError> {
        let first = Self::swap_slot(store, first_id).await?;
        let second = Self::swap_slot(store, second_id).await?;

        if first.id == second.id {
            return Ok(());
        }

        store
            .set_content(first.id, second.content_id, second.content_version)
            .await?;
        store
            .set_content(second.id, first.content_id, first.content_version)
            .await?;

        // Hidden content now shows at the other slot
        VisibilityCascade::refresh_subtree(store, &first).await?;
        VisibilityCascade::refresh_subtree(store, &second).await?;

        // Same content in both slots: only the versions moved
        if first.content_id != second.content_id {
            if first.is_main() {
                store.set_main_location(first.content_id, second.id).await?;
            }
            if second.is_main() {
                store.set_main_location(second.content_id, first.id).await?;
            }
        }

        tracing::info!(
            "Swapped content {} (location {}) with content {} (location {})",
            first.content_id,
            first.id,
            second.content_id,
            second.id
        );
        Ok(())
    }

    async fn swap_slot(store: &TreeStore<'_>, id: LocationId) -> Result<LocationNode, TreeError> {
        store.get_location(id).await?.ok_or_else(|| {
            TreeError::invariant_violation(format!("swap could not locate location {}", id))
        })
    }

    /// Make `main_location_id` the main location of `content_id`, and flag as
    /// main the assignments of `content_version` that target
    /// `parent_location_id`
    pub async fn change_main_location(
        store: &TreeStore<'_>,
        content_id: ContentId,
        main_location_id: LocationId,
        content_version: i64,
        parent_location_id: LocationId,
    ) -> Result<(), TreeError> {
        let location = store
            .get_location(main_location_id)
            .await?
            .ok_or_else(|| TreeError::location_not_found(main_location_id))?;

        if location.content_id != content_id {
            return Err(TreeError::invariant_violation(format!(
                "location {} shows content {}, not content {}",
                main_location_id, location.content_id, content_id
            )));
        }

        store.set_main_location(content_id, main_location_id).await?;
        let flagged = store
            .set_assignment_main_flags(content_id, content_version, parent_location_id)
            .await?;

        tracing::info!(
            "Main location of content {} is now {} ({} assignments updated)",
            content_id,
            main_location_id,
            flagged
        );
        Ok(())
    }

    /// Lowest-id remaining placement of `content_id`, skipping `excluding`
    pub async fn fallback_main_node(
        store: &TreeStore<'_>,
        content_id: ContentId,
        excluding: LocationId,
    ) -> Result<Option<LocationId>, TreeError> {
        Ok(store.lowest_location_id(content_id, excluding).await?)
    }

    /// Restore a valid main location for every content item whose main
    /// placement is among the (already deleted) `removed` rows
    pub async fn repair_main_locations(
        store: &TreeStore<'_>,
        removed: &[LocationNode],
    ) -> Result<(), TreeError> {
        let removed_ids: HashSet<LocationId> = removed.iter().map(|l| l.id).collect();
        let mut seen = HashSet::new();

        for location in removed {
            if !seen.insert(location.content_id) {
                continue;
            }

            let current = store.main_location_id(location.content_id).await?;
            if matches!(current, Some(id) if !removed_ids.contains(&id)) {
                continue;
            }

            match Self::fallback_main_node(store, location.content_id, location.id).await? {
                Some(fallback) => {
                    store
                        .set_main_location(location.content_id, fallback)
                        .await?;
                    tracing::debug!(
                        "Content {} fell back to main location {}",
                        location.content_id,
                        fallback
                    );
                }
                None => {
                    store.clear_main_location(location.content_id).await?;
                    tracing::debug!(
                        "Content {} has no placement left; main location cleared",
                        location.content_id
                    );
                }
            }
        }
        Ok(())
    }
}

// Store-backed coordinator tests in separate module
#[cfg(test)]
#[path = "main_location_test.rs"]
mod main_location_test;
