//! Trash Archive
//!
//! Soft delete and restore of single locations. Trashing snapshots a live
//! node into the `trash` table and removes it from the tree; children are not
//! cascaded. Restoring creates a brand-new node (new id) from the snapshot
//! under the original or a chosen parent.

use crate::db::{
    ContentGateway, SqlFragment, TrashCriterion, TrashQuery, TrashQueryConverter, TrashResult,
    TreeStore,
};
use crate::models::{
    ContentStatus, LocationId, LocationNode, MainLocation, NewLocation, TrashEntry,
};
use crate::operations::error::TreeError;
use crate::operations::main_location::MainLocationCoordinator;
use crate::operations::mover::SubtreeMover;
use crate::operations::visibility::VisibilityCascade;
use chrono::Utc;

pub struct TrashArchive;

impl TrashArchive {
    /// Move `location` into the trash and mark its content trashed
    pub async fn trash(
        store: &TreeStore<'_>,
        gateway: &dyn ContentGateway,
        location: &LocationNode,
    ) -> Result<TrashEntry, TreeError> {
        if location.is_root() {
            return Err(TreeError::invalid_operation("the tree root cannot be trashed"));
        }

        let entry = TrashEntry::from_location(location, Utc::now());
        store.insert_trash(&entry).await?;
        store.delete_location(location.id).await?;
        gateway
            .set_status(store.connection(), location.content_id, ContentStatus::Trashed)
            .await?;
        MainLocationCoordinator::repair_main_locations(store, std::slice::from_ref(location))
            .await?;

        tracing::info!(
            "Trashed location {} (content {})",
            location.id,
            location.content_id
        );
        Ok(entry)
    }

    /// Restore a trash entry as a new main location
    ///
    /// The node is created under `new_parent_id`, or the entry's original
    /// parent when `None`. Its identification segment, ordering and hide flag
    /// come from the snapshot; invisibility is derived from the new parent.
    pub async fn untrash(
        store: &TreeStore<'_>,
        gateway: &dyn ContentGateway,
        trash_id: LocationId,
        new_parent_id: Option<LocationId>,
    ) -> Result<LocationNode, TreeError> {
        let entry = store
            .get_trash(trash_id)
            .await?
            .ok_or_else(|| TreeError::trash_entry_not_found(trash_id))?;

        let parent_id = new_parent_id.or(entry.parent_id).ok_or_else(|| {
            TreeError::invalid_operation(format!(
                "trash entry {} has no parent to restore to",
                trash_id
            ))
        })?;
        let parent = store
            .get_location(parent_id)
            .await?
            .ok_or_else(|| TreeError::location_not_found(parent_id))?;

        let conn = store.connection();
        let content_hidden = gateway.is_hidden(conn, entry.content_id).await?;

        // A live location may have taken the remote id since the trash
        let remote_id = match store.get_location_by_remote_id(&entry.remote_id).await? {
            Some(taken) => {
                tracing::debug!(
                    "Remote id {} of trash entry {} is taken by location {}, generating one",
                    entry.remote_id,
                    trash_id,
                    taken.id
                );
                None
            }
            None => Some(entry.remote_id.clone()),
        };

        let new = NewLocation {
            content_id: entry.content_id,
            content_version: entry.content_version,
            identification_segment: entry
                .path_identification
                .last_segment()
                .unwrap_or_default()
                .to_string(),
            priority: entry.priority,
            sort_field: entry.sort_field,
            sort_order: entry.sort_order,
            remote_id,
            is_hidden: entry.is_hidden,
            is_invisible: VisibilityCascade::invisible_under(
                &parent,
                entry.is_hidden,
                content_hidden,
            ),
            main_location: MainLocation::ThisLocation,
        };
        let restored = SubtreeMover::create_under_parent(store, &parent, &new).await?;

        store.delete_trash(trash_id).await?;
        gateway
            .set_status(conn, entry.content_id, ContentStatus::Published)
            .await?;

        tracing::info!(
            "Restored trash entry {} as location {} under {}",
            trash_id,
            restored.id,
            parent.id
        );
        Ok(restored)
    }

    /// Purge one trash entry; content status is not touched
    pub async fn remove_entry(
        store: &TreeStore<'_>,
        trash_id: LocationId,
    ) -> Result<(), TreeError> {
        if store.delete_trash(trash_id).await? == 0 {
            return Err(TreeError::trash_entry_not_found(trash_id));
        }
        Ok(())
    }

    /// Purge every trash entry; returns how many were removed
    pub async fn cleanup(store: &TreeStore<'_>) -> Result<u64, TreeError> {
        let purged = store.delete_all_trash().await?;
        tracing::info!("Purged {} trash entries", purged);
        Ok(purged)
    }

    pub async fn find_trash_items(
        store: &TreeStore<'_>,
        converter: &dyn TrashQueryConverter,
        query: &TrashQuery,
    ) -> Result<TrashResult, TreeError> {
        let filter = Self::filter(converter, query.criterion.as_ref())?;
        let order_by = converter.convert_sort_clauses(&query.sort_clauses);

        let total_count = store.count_trash(&filter).await?;
        let items = store
            .find_trash(&filter, &order_by, query.offset, query.limit)
            .await?;

        Ok(TrashResult {
            items,
            total_count: total_count as usize,
        })
    }

    pub async fn count_trashed(
        store: &TreeStore<'_>,
        converter: &dyn TrashQueryConverter,
        criterion: Option<&TrashCriterion>,
    ) -> Result<usize, TreeError> {
        let filter = Self::filter(converter, criterion)?;
        Ok(store.count_trash(&filter).await? as usize)
    }

    fn filter(
        converter: &dyn TrashQueryConverter,
        criterion: Option<&TrashCriterion>,
    ) -> Result<SqlFragment, TreeError> {
        let mut filter = SqlFragment::new();
        if let Some(criterion) = criterion {
            converter.convert_criterion(criterion, &mut filter)?;
        }
        Ok(filter)
    }
}

// Store-backed trash tests in separate module
#[cfg(test)]
#[path = "trash_test.rs"]
mod trash_test;
